//! Transition targets, prioritizations, and the per-timestep budget tracker.
//!
//! A target gives a transition group (or an attribute type) an amount to
//! meet within a scope each timestep. The [`TargetTracker`] holds the
//! remaining amount for every target record. A record's remaining amount is
//! drawn from its current sample the first time the timestep touches it and
//! only decreases afterwards; it is drawn again at the next timestep.

use crate::distribution::DistributionValue;
use crate::error::ConfigError;
use crate::id::*;
use crate::keymap::{CompositeKey, KeySegment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Configuration records
// ---------------------------------------------------------------------------

/// An area target for a transition group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTarget {
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    /// Neither value nor distribution disables the target.
    pub amount: DistributionValue,
}

impl TransitionTarget {
    pub fn new(group: TransitionGroupId, amount: f64) -> Self {
        Self {
            group,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            iteration: None,
            timestep: None,
            amount: DistributionValue::fixed(amount),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.amount.is_disabled()
    }

    pub(crate) fn key(&self) -> CompositeKey<4> {
        CompositeKey::new(
            [
                KeySegment::Is(self.group.0),
                KeySegment::of(self.stratum),
                KeySegment::of(self.secondary_stratum),
                KeySegment::of(self.tertiary_stratum),
            ],
            self.iteration,
            self.timestep,
        )
    }
}

/// Overrides or scales the probability of a group's transitions within a
/// scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTargetPrioritization {
    pub group: TransitionGroupId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    /// Ranked rows are funded in ascending rank order from the target.
    pub priority: Option<u32>,
    /// 0.0 suppresses, 1.0 forces.
    pub probability_override: Option<f64>,
    pub probability_multiplier: f64,
}

impl TransitionTargetPrioritization {
    pub fn new(group: TransitionGroupId) -> Self {
        Self {
            group,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class: None,
            iteration: None,
            timestep: None,
            priority: None,
            probability_override: None,
            probability_multiplier: 1.0,
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<4> {
        CompositeKey::new(
            [
                KeySegment::of(self.stratum),
                KeySegment::of(self.secondary_stratum),
                KeySegment::of(self.tertiary_stratum),
                KeySegment::of(self.state_class),
            ],
            self.iteration,
            self.timestep,
        )
    }

    pub(crate) fn validate(&self, table: &str) -> Result<(), ConfigError> {
        validate_override(table, self.probability_override, self.probability_multiplier)
    }

    /// The fixed effect of an unranked row.
    pub fn effect(&self) -> Prioritized {
        match self.probability_override {
            Some(o) if o >= 1.0 => Prioritized::Force,
            Some(_) => Prioritized::Suppress,
            None => Prioritized::Scale(self.probability_multiplier),
        }
    }
}

/// An amount target for a transition attribute type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAttributeTarget {
    pub attribute_type: AttributeTypeId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub amount: DistributionValue,
}

impl TransitionAttributeTarget {
    pub fn new(attribute_type: AttributeTypeId, amount: f64) -> Self {
        Self {
            attribute_type,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            iteration: None,
            timestep: None,
            amount: DistributionValue::fixed(amount),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.amount.is_disabled()
    }

    pub(crate) fn key(&self) -> CompositeKey<4> {
        CompositeKey::new(
            [
                KeySegment::Is(self.attribute_type.0),
                KeySegment::of(self.stratum),
                KeySegment::of(self.secondary_stratum),
                KeySegment::of(self.tertiary_stratum),
            ],
            self.iteration,
            self.timestep,
        )
    }
}

/// Prioritization for an attribute target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAttributeTargetPrioritization {
    pub attribute_type: AttributeTypeId,
    pub stratum: Option<StratumId>,
    pub secondary_stratum: Option<StratumId>,
    pub tertiary_stratum: Option<StratumId>,
    pub state_class: Option<StateClassId>,
    pub iteration: Option<i32>,
    pub timestep: Option<i32>,
    pub probability_override: Option<f64>,
    pub probability_multiplier: f64,
}

impl TransitionAttributeTargetPrioritization {
    pub fn new(attribute_type: AttributeTypeId) -> Self {
        Self {
            attribute_type,
            stratum: None,
            secondary_stratum: None,
            tertiary_stratum: None,
            state_class: None,
            iteration: None,
            timestep: None,
            probability_override: None,
            probability_multiplier: 1.0,
        }
    }

    pub(crate) fn key(&self) -> CompositeKey<5> {
        CompositeKey::new(
            [
                KeySegment::Is(self.attribute_type.0),
                KeySegment::of(self.stratum),
                KeySegment::of(self.secondary_stratum),
                KeySegment::of(self.tertiary_stratum),
                KeySegment::of(self.state_class),
            ],
            self.iteration,
            self.timestep,
        )
    }

    pub(crate) fn validate(&self, table: &str) -> Result<(), ConfigError> {
        validate_override(table, self.probability_override, self.probability_multiplier)
    }

    pub fn effect(&self) -> Prioritized {
        match self.probability_override {
            Some(o) if o >= 1.0 => Prioritized::Force,
            Some(_) => Prioritized::Suppress,
            None => Prioritized::Scale(self.probability_multiplier),
        }
    }
}

fn validate_override(table: &str, probability_override: Option<f64>, multiplier: f64) -> Result<(), ConfigError> {
    if let Some(o) = probability_override {
        if o != 0.0 && o != 1.0 {
            return Err(ConfigError::Invalid {
                table: table.to_string(),
                detail: format!("probability override must be 0 or 1, got {o}"),
            });
        }
    }
    if !(multiplier >= 0.0) {
        return Err(ConfigError::Invalid {
            table: table.to_string(),
            detail: format!("probability multiplier must be non-negative, got {multiplier}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Resolved effects
// ---------------------------------------------------------------------------

/// What a prioritization does to a cell's transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prioritized {
    /// Probability override 1.0: selection is forced.
    Force,
    /// Probability override 0.0: multiplier 0.
    Suppress,
    /// Applied in place of the plain target multiplier.
    Scale(f64),
}

/// Ranked prioritizations for one target, funded in ascending rank.
///
/// `ranks` holds `(rank, forced_amount, expected_amount)`: the amount that
/// forcing every cell of the rank would consume, and the probability
/// weighted amount the rank would consume unforced. Ranks that fit in the
/// remaining budget are forced, the rank that straddles the budget is
/// scaled to the unfunded remainder, and later ranks are suppressed.
pub fn rank_decisions(budget: f64, ranks: &[(u32, f64, f64)]) -> Vec<(u32, Prioritized)> {
    let mut sorted: Vec<_> = ranks.to_vec();
    sorted.sort_by_key(|r| r.0);
    let mut funded = 0.0;
    let mut straddled = false;
    sorted
        .into_iter()
        .map(|(rank, forced, expected)| {
            let effect = if straddled || funded >= budget {
                Prioritized::Suppress
            } else if funded + forced <= budget {
                funded += forced;
                Prioritized::Force
            } else {
                straddled = true;
                let left = budget - funded;
                funded = budget;
                if expected > 0.0 {
                    Prioritized::Scale(left / expected)
                } else {
                    Prioritized::Suppress
                }
            };
            (rank, effect)
        })
        .collect()
}

/// Target multiplier from a remaining budget and the expected amount.
pub fn target_multiplier(remaining: f64, expected: f64) -> f64 {
    if remaining <= 0.0 || expected <= 0.0 {
        0.0
    } else {
        remaining / expected
    }
}

/// Attribute multiplier: shrinks as a transition's attribute amount
/// approaches the remaining attribute target.
pub fn attribute_multiplier(remaining: f64, amount: f64) -> f64 {
    if remaining <= 0.0 {
        0.0
    } else if amount <= 0.0 {
        1.0
    } else {
        (remaining / amount).min(1.0)
    }
}

// ---------------------------------------------------------------------------
// Runtime tracker
// ---------------------------------------------------------------------------

/// Remaining budgets and computed multipliers for the current timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetTracker {
    remaining: Vec<Option<f64>>,
    multipliers: Vec<f64>,
    ranked: HashMap<(usize, usize), Prioritized>,
    attribute_remaining: Vec<Option<f64>>,
}

impl TargetTracker {
    pub fn new(targets: usize, attribute_targets: usize) -> Self {
        Self {
            remaining: vec![None; targets],
            multipliers: vec![1.0; targets],
            ranked: HashMap::new(),
            attribute_remaining: vec![None; attribute_targets],
        }
    }

    /// Forget every remaining amount; the next touch redraws it.
    pub fn reset_timestep(&mut self) {
        self.remaining.iter_mut().for_each(|r| *r = None);
        self.multipliers.iter_mut().for_each(|m| *m = 1.0);
        self.ranked.clear();
    }

    /// Forget attribute remainders only.
    pub fn reset_attribute_targets(&mut self) {
        self.attribute_remaining.iter_mut().for_each(|r| *r = None);
    }

    pub fn remaining(&self, target: usize) -> Option<f64> {
        self.remaining.get(target).copied().flatten()
    }

    pub fn attribute_remaining(&self, target: usize) -> Option<f64> {
        self.attribute_remaining.get(target).copied().flatten()
    }

    /// Remaining amount of a target, drawing `amount` on first touch.
    pub(crate) fn touch(&mut self, target: usize, amount: f64) -> f64 {
        *self.remaining[target].get_or_insert(amount)
    }

    pub(crate) fn set_multiplier(&mut self, target: usize, multiplier: f64) {
        self.multipliers[target] = multiplier;
    }

    /// Current multiplier; 0 once the budget is spent.
    pub fn multiplier(&self, target: usize) -> f64 {
        match self.remaining(target) {
            Some(r) if r <= 0.0 => 0.0,
            _ => self.multipliers[target],
        }
    }

    pub(crate) fn set_ranked(&mut self, target: usize, prioritization: usize, effect: Prioritized) {
        self.ranked.insert((target, prioritization), effect);
    }

    pub fn ranked(&self, target: usize, prioritization: usize) -> Option<Prioritized> {
        self.ranked.get(&(target, prioritization)).copied()
    }

    /// Subtract a fired amount. Never increases the remaining budget.
    pub(crate) fn consume(&mut self, target: usize, amount: f64, initial: f64) {
        let r = self.remaining[target].get_or_insert(initial);
        *r -= amount.max(0.0);
    }

    pub(crate) fn consume_attribute(&mut self, target: usize, amount: f64, initial: f64) {
        let r = self.attribute_remaining[target].get_or_insert(initial);
        *r -= amount.max(0.0);
    }
}
