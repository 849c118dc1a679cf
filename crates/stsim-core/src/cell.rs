//! Landscape cells and the per-stratum cell index.

use crate::error::InvariantError;
use crate::id::*;
use crate::sim::StateHash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Time since transition for one transition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tst {
    pub group: TransitionGroupId,
    pub value: i32,
}

/// One simulated cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub stratum: StratumId,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: StateClassId,
    pub age: i32,
    pub tst: Vec<Tst>,
    /// Indices of the probabilistic transitions applicable this timestep,
    /// in shuffled order. Rebuilt every timestep and after every firing.
    #[serde(skip)]
    pub(crate) candidates: Vec<usize>,
}

impl Cell {
    pub fn new(id: CellId, stratum: StratumId, state_class: StateClassId, age: i32) -> Self {
        Self {
            id,
            stratum,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class,
            age,
            tst: Vec::new(),
            candidates: Vec::new(),
        }
    }

    pub fn tst_value(&self, group: TransitionGroupId) -> Option<i32> {
        self.tst.iter().find(|t| t.group == group).map(|t| t.value)
    }

    pub(crate) fn tst_mut(&mut self, group: TransitionGroupId) -> Option<&mut Tst> {
        self.tst.iter_mut().find(|t| t.group == group)
    }

    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }
}

/// Initial state of a cell as delivered by an initial-conditions source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellInit {
    pub id: CellId,
    pub stratum: StratumId,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: StateClassId,
    /// `None` draws an age from the initial-condition age ranges.
    pub age: Option<i32>,
}

/// Maps each stratum to the collection indices of its cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StratumIndex {
    members: BTreeMap<StratumId, BTreeSet<usize>>,
}

impl StratumIndex {
    fn insert(&mut self, stratum: StratumId, index: usize) {
        self.members.entry(stratum).or_default().insert(index);
    }

    fn remove(&mut self, stratum: StratumId, index: usize) -> bool {
        match self.members.get_mut(&stratum) {
            Some(set) => set.remove(&index),
            None => false,
        }
    }

    pub fn cells(&self, stratum: StratumId) -> impl Iterator<Item = usize> + '_ {
        self.members.get(&stratum).into_iter().flatten().copied()
    }

    pub fn count(&self, stratum: StratumId) -> usize {
        self.members.get(&stratum).map_or(0, BTreeSet::len)
    }
}

/// The cells of one iteration. Rebuilt at the start of every iteration.
#[derive(Debug, Clone, Default)]
pub struct CellCollection {
    cells: Vec<Cell>,
    index_by_id: HashMap<CellId, usize>,
    strata: StratumIndex,
}

impl CellCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Cells with a zero stratum or state class never enter
    /// the collection.
    pub fn push(&mut self, cell: Cell) -> Result<usize, InvariantError> {
        if cell.stratum == StratumId::NONE || cell.state_class == StateClassId::NONE {
            return Err(InvariantError::ZeroStratumOrStateClass { cell: cell.id });
        }
        let index = self.cells.len();
        self.index_by_id.insert(cell.id, index);
        self.strata.insert(cell.stratum, index);
        self.cells.push(cell);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    pub fn index_of(&self, id: CellId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    pub fn strata(&self) -> &StratumIndex {
        &self.strata
    }

    /// Move a cell to another stratum, keeping the index in step.
    /// No-op when the stratum is unchanged.
    pub(crate) fn set_stratum(&mut self, index: usize, stratum: StratumId) -> Result<(), InvariantError> {
        let cell = self
            .cells
            .get_mut(index)
            .ok_or(InvariantError::UnknownStratum(stratum))?;
        if cell.stratum == stratum {
            return Ok(());
        }
        if !self.strata.remove(cell.stratum, index) {
            return Err(InvariantError::CellNotInStratum {
                cell: cell.id,
                stratum: cell.stratum,
            });
        }
        cell.stratum = stratum;
        self.strata.insert(stratum, index);
        Ok(())
    }

    /// Check the collection-wide invariants.
    pub fn validate(&self) -> Result<(), InvariantError> {
        for (index, cell) in self.cells.iter().enumerate() {
            if cell.stratum == StratumId::NONE || cell.state_class == StateClassId::NONE {
                return Err(InvariantError::ZeroStratumOrStateClass { cell: cell.id });
            }
            if cell.age < 0 {
                return Err(InvariantError::NegativeAge {
                    cell: cell.id,
                    age: cell.age,
                });
            }
            if !self.strata.cells(cell.stratum).any(|i| i == index) {
                return Err(InvariantError::CellNotInStratum {
                    cell: cell.id,
                    stratum: cell.stratum,
                });
            }
        }
        Ok(())
    }

    /// Hash of every cell's persistent state.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        for cell in &self.cells {
            h.write_i32(cell.id.0);
            h.write_i32(cell.stratum.0);
            h.write_opt_i32(cell.secondary_stratum.map(|s| s.0));
            h.write_opt_i32(cell.tertiary_stratum.map(|s| s.0));
            h.write_i32(cell.state_class.0);
            h.write_i32(cell.age);
            for t in &cell.tst {
                h.write_i32(t.group.0);
                h.write_i32(t.value);
            }
        }
        h.finish()
    }
}
