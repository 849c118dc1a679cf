//! Patch growth for spatial transition spread.
//!
//! A patch starts at a seed cell that fired during the raster pass and
//! grows by repeatedly claiming the highest-weight frontier cell. Frontier
//! weights come from the driver; this module only keeps the bookkeeping.
//!
//! Three record families shape the pass around the patches:
//!
//! - [`TransitionPatchPrioritization`] orders seeds by the size of the
//!   connected patch of eligible cells they sit in, optionally restricting
//!   seeds to patch edges.
//! - [`TransitionSizePrioritization`] draws a group's patch sizes against
//!   its target up front and hands them out largest or smallest first.
//! - [`TransitionSpreadDistribution`] lets a cell that transitioned carry
//!   the transition to a cell a sampled distance away.

use crate::error::ConfigError;
use crate::id::*;
use crate::keymap::{CompositeKey, KeyMap, KeySegment};
use crate::rng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// One size class of a group's patch size distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSizeDistribution {
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    /// Upper bound of the class, in area units.
    pub max_area: f64,
    pub relative_amount: f64,
}

impl TransitionSizeDistribution {
    pub fn new(group: TransitionGroupId, max_area: f64, relative_amount: f64) -> Self {
        Self {
            group,
            stratum: None,
            iteration: None,
            timestep: None,
            max_area,
            relative_amount,
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<2> {
        CompositeKey::new(
            [KeySegment::Is(self.group.0), KeySegment::of(self.stratum)],
            self.iteration,
            self.timestep,
        )
    }

    pub(crate) fn validate(&self, table: &str) -> Result<(), ConfigError> {
        if !(self.max_area > 0.0) || !(self.relative_amount >= 0.0) {
            return Err(ConfigError::Invalid {
                table: table.to_string(),
                detail: format!(
                    "size class needs a positive maximum area and a non-negative relative amount, got {} / {}",
                    self.max_area, self.relative_amount
                ),
            });
        }
        Ok(())
    }
}

/// The size classes sharing one key, ascending by maximum area. Spread
/// distributions reuse the same shape with distances for areas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeClasses {
    classes: Vec<(f64, f64)>,
}

impl SizeClasses {
    pub(crate) fn push(&mut self, max_area: f64, relative_amount: f64) {
        let pos = self.classes.partition_point(|(m, _)| *m < max_area);
        self.classes.insert(pos, (max_area, relative_amount));
    }

    /// Draw a class by relative amount, then a size uniformly between the
    /// previous class's maximum and this class's maximum.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        let total: f64 = self.classes.iter().map(|(_, r)| r).sum();
        if !(total > 0.0) {
            return self.classes.last().map_or(0.0, |(m, _)| *m);
        }
        let target = rng.next_f64() * total;
        let mut cumulative = 0.0;
        let mut lower = 0.0;
        for &(max_area, relative) in &self.classes {
            cumulative += relative;
            if target < cumulative {
                return lower + rng.next_f64() * (max_area - lower);
            }
            lower = max_area;
        }
        lower
    }
}

/// An in-progress patch.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPatch {
    pub seed: usize,
    pub transition_type: TransitionTypeId,
    pub max_area: f64,
    area: f64,
    cells: Vec<usize>,
    /// Candidate edge cells with their best weight.
    frontier: BTreeMap<usize, f64>,
}

impl TransitionPatch {
    /// A patch holding only its seed.
    pub fn new(seed: usize, transition_type: TransitionTypeId, max_area: f64, seed_area: f64) -> Self {
        Self {
            seed,
            transition_type,
            max_area,
            area: seed_area,
            cells: vec![seed],
            frontier: BTreeMap::new(),
        }
    }

    /// Offer an edge cell. Non-positive weights are ignored; repeated
    /// offers keep the highest weight.
    pub fn offer(&mut self, cell: usize, weight: f64) {
        if !(weight > 0.0) || self.cells.contains(&cell) {
            return;
        }
        let entry = self.frontier.entry(cell).or_insert(weight);
        if weight > *entry {
            *entry = weight;
        }
    }

    /// Remove and return the highest-weight edge cell, lowest index on
    /// ties.
    pub fn take_best(&mut self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (&cell, &w) in &self.frontier {
            if best.is_none_or(|(_, bw)| w > bw) {
                best = Some((cell, w));
            }
        }
        let (cell, _) = best?;
        self.frontier.remove(&cell);
        Some(cell)
    }

    pub fn add(&mut self, cell: usize, area: f64) {
        self.frontier.remove(&cell);
        self.cells.push(cell);
        self.area += area;
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn is_full(&self) -> bool {
        self.area >= self.max_area
    }

    pub fn frontier_is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    pub fn cells(&self) -> &[usize] {
        &self.cells
    }
}

/// Size classes keyed by group and stratum.
pub type SizeDistributionMap = KeyMap<SizeClasses, 2>;

// ---------------------------------------------------------------------------
// Patch prioritization
// ---------------------------------------------------------------------------

/// Which patches of eligible cells seed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchPrioritizationKind {
    Smallest,
    SmallestEdgesOnly,
    Largest,
    LargestEdgesOnly,
}

impl PatchPrioritizationKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Smallest" => Some(Self::Smallest),
            "Smallest Edges Only" | "SmallestEdgesOnly" => Some(Self::SmallestEdgesOnly),
            "Largest" => Some(Self::Largest),
            "Largest Edges Only" | "LargestEdgesOnly" => Some(Self::LargestEdgesOnly),
            _ => None,
        }
    }

    pub fn largest_first(self) -> bool {
        matches!(self, Self::Largest | Self::LargestEdgesOnly)
    }

    /// Only cells on a patch edge may seed.
    pub fn edges_only(self) -> bool {
        matches!(self, Self::SmallestEdgesOnly | Self::LargestEdgesOnly)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPatchPrioritization {
    pub group: TransitionGroupId,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub kind: PatchPrioritizationKind,
}

impl TransitionPatchPrioritization {
    pub fn new(group: TransitionGroupId, kind: PatchPrioritizationKind) -> Self {
        Self {
            group,
            iteration: None,
            timestep: None,
            kind,
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<1> {
        CompositeKey::new([KeySegment::Is(self.group.0)], self.iteration, self.timestep)
    }
}

/// A connected patch of cells eligible to seed a group, by collection
/// index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligiblePatch {
    pub cells: Vec<usize>,
    /// Cells with at least one neighbour position outside the patch.
    pub edges: Vec<usize>,
}

/// Seed order under a patch prioritization: patches by size (ties by their
/// lowest cell index), cells shuffled within each patch.
pub fn prioritized_seeds(mut patches: Vec<EligiblePatch>, kind: PatchPrioritizationKind, rng: &mut SimRng) -> Vec<usize> {
    for p in &mut patches {
        p.cells.sort_unstable();
    }
    patches.sort_by(|a, b| {
        let by_size = if kind.largest_first() {
            b.cells.len().cmp(&a.cells.len())
        } else {
            a.cells.len().cmp(&b.cells.len())
        };
        by_size.then_with(|| a.cells.first().cmp(&b.cells.first()))
    });
    let mut order = Vec::new();
    for p in patches {
        let mut seeds = if kind.edges_only() { p.edges } else { p.cells };
        seeds.sort_unstable();
        rng.shuffle(&mut seeds);
        order.extend(seeds);
    }
    order
}

// ---------------------------------------------------------------------------
// Size prioritization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizePriority {
    Smallest,
    #[default]
    Largest,
}

/// How a group's patch sizes are drawn against its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSizePrioritization {
    /// `None` applies to every group.
    pub group: Option<TransitionGroupId>,
    pub stratum: Option<StratumId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub priority: SizePriority,
    /// A patch that stops short of its size forfeits the shortfall instead
    /// of passing it to the next size.
    pub maximize_fidelity_to_distribution: bool,
    /// Trim the last drawn size so the sizes sum to the target exactly.
    pub maximize_fidelity_to_total_area: bool,
}

impl TransitionSizePrioritization {
    pub fn new(priority: SizePriority) -> Self {
        Self {
            group: None,
            stratum: None,
            iteration: None,
            timestep: None,
            priority,
            maximize_fidelity_to_distribution: true,
            maximize_fidelity_to_total_area: false,
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<2> {
        CompositeKey::new(
            [KeySegment::of(self.group), KeySegment::of(self.stratum)],
            self.iteration,
            self.timestep,
        )
    }
}

/// Patch sizes drawn for one target in one group pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeQueue {
    sizes: VecDeque<f64>,
    carry: f64,
    carry_shortfall: bool,
}

/// Upper bound on draws for one queue.
const MAX_SIZE_DRAWS: usize = 100_000;

impl SizeQueue {
    /// Draw sizes from `classes` until they cover `budget`, then order them
    /// by the rule's priority.
    pub fn draw(classes: &SizeClasses, budget: f64, rule: &TransitionSizePrioritization, rng: &mut SimRng) -> Self {
        let mut sizes = Vec::new();
        let mut total = 0.0;
        while total < budget && sizes.len() < MAX_SIZE_DRAWS {
            let size = classes.sample(rng);
            if !(size > 0.0) {
                break;
            }
            sizes.push(size);
            total += size;
        }
        if rule.maximize_fidelity_to_total_area
            && total > budget
            && let Some(last) = sizes.last_mut()
        {
            *last -= total - budget;
        }
        match rule.priority {
            SizePriority::Largest => sizes.sort_by(|a, b| b.total_cmp(a)),
            SizePriority::Smallest => sizes.sort_by(|a, b| a.total_cmp(b)),
        }
        Self {
            sizes: sizes.into(),
            carry: 0.0,
            carry_shortfall: !rule.maximize_fidelity_to_distribution,
        }
    }

    /// The next patch size, including any shortfall carried forward.
    pub fn next_size(&mut self) -> Option<f64> {
        let size = self.sizes.pop_front()? + self.carry;
        self.carry = 0.0;
        Some(size)
    }

    /// Report how much of a requested size a patch reached.
    pub fn settle(&mut self, requested: f64, achieved: f64) {
        if self.carry_shortfall {
            self.carry = (requested - achieved).max(0.0);
        }
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Spread distributions
// ---------------------------------------------------------------------------

/// One distance class for a group spreading out of a state class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpreadDistribution {
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub state_class: StateClassId,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    /// Upper bound of the class, in map units.
    pub max_distance: f64,
    pub relative_amount: f64,
}

impl TransitionSpreadDistribution {
    pub fn new(group: TransitionGroupId, state_class: StateClassId, max_distance: f64, relative_amount: f64) -> Self {
        Self {
            group,
            stratum: None,
            state_class,
            iteration: None,
            timestep: None,
            max_distance,
            relative_amount,
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<3> {
        CompositeKey::new(
            [
                KeySegment::Is(self.group.0),
                KeySegment::of(self.stratum),
                KeySegment::Is(self.state_class.0),
            ],
            self.iteration,
            self.timestep,
        )
    }

    pub(crate) fn validate(&self, table: &str) -> Result<(), ConfigError> {
        if !(self.max_distance > 0.0) || !(self.relative_amount >= 0.0) {
            return Err(ConfigError::Invalid {
                table: table.to_string(),
                detail: format!(
                    "distance class needs a positive maximum distance and a non-negative relative amount, got {} / {}",
                    self.max_distance, self.relative_amount
                ),
            });
        }
        Ok(())
    }
}

/// Distance classes keyed by group, stratum and source state class.
pub type SpreadDistributionMap = KeyMap<SizeClasses, 3>;
