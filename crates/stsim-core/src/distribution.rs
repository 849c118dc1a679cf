//! Stochastic values: fixed numbers or distributions re-sampled at
//! iteration and timestep boundaries.
//!
//! Configuration records (targets, multipliers, attribute values) carry a
//! [`DistributionValue`]. The scenario builder validates each one and gives
//! it a [`ValueSlot`]; a running simulation keeps the current samples in a
//! [`SampledValues`] table indexed by slot, so the scenario itself stays
//! immutable and can be shared between iterations.

use crate::error::ConfigError;
use crate::id::DistributionId;
use crate::rng::SimRng;
use rand::Rng;
use rand_distr::{Beta, Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

/// Supported distribution families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionType {
    /// Mean is the record value; standard deviation required.
    Normal,
    /// Mean is the record value, scaled onto `[min, max]`.
    Beta,
    Uniform,
    UniformInteger,
    /// A user-defined discrete distribution.
    User(DistributionId),
}

/// When a distribution is re-sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Frequency {
    #[default]
    Iteration,
    Timestep,
    IterationAndTimestep,
}

impl Frequency {
    fn fires_on(self, event: ResampleEvent) -> bool {
        matches!(
            (self, event),
            (Frequency::IterationAndTimestep, _)
                | (Frequency::Iteration, ResampleEvent::Iteration)
                | (Frequency::Timestep, ResampleEvent::Timestep)
        )
    }
}

/// The boundary at which a re-sample is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleEvent {
    Iteration,
    Timestep,
}

/// Distribution parameters attached to a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub kind: DistributionType,
    pub sd: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub frequency: Frequency,
}

impl DistributionSpec {
    pub fn new(kind: DistributionType) -> Self {
        Self {
            kind,
            sd: None,
            min: None,
            max: None,
            frequency: Frequency::Iteration,
        }
    }
}

/// A configured amount: a fixed value, a distribution, or both (the value
/// then acts as the distribution mean).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionValue {
    pub value: Option<f64>,
    pub distribution: Option<DistributionSpec>,
}

impl DistributionValue {
    pub fn fixed(value: f64) -> Self {
        Self {
            value: Some(value),
            distribution: None,
        }
    }

    pub fn distributed(mean: Option<f64>, spec: DistributionSpec) -> Self {
        Self {
            value: mean,
            distribution: Some(spec),
        }
    }

    /// Neither a value nor a distribution is configured.
    pub fn is_disabled(&self) -> bool {
        self.value.is_none() && self.distribution.is_none()
    }

    /// Value used before the first sample is drawn.
    fn initial(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Validates and samples distributions. Holds the user-defined discrete
/// distributions as `(value, relative frequency)` rows.
#[derive(Debug, Clone, Default)]
pub struct DistributionProvider {
    user: HashMap<DistributionId, Vec<(f64, f64)>>,
}

impl DistributionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one row to a user-defined distribution.
    pub fn add_user_value(
        &mut self,
        id: DistributionId,
        value: f64,
        relative_frequency: f64,
    ) -> Result<(), ConfigError> {
        if !(relative_frequency >= 0.0) {
            return Err(ConfigError::InvalidDistribution {
                table: "Distributions".into(),
                detail: format!("negative relative frequency {relative_frequency} in distribution {id}"),
            });
        }
        self.user.entry(id).or_default().push((value, relative_frequency));
        Ok(())
    }

    /// Check that a value can be sampled. Errors name `table`.
    pub fn validate(&self, table: &str, value: &DistributionValue) -> Result<(), ConfigError> {
        let invalid = |detail: String| ConfigError::InvalidDistribution {
            table: table.to_string(),
            detail,
        };

        let Some(spec) = value.distribution else {
            if value.value.is_none() {
                return Err(ConfigError::NoValue {
                    table: table.to_string(),
                });
            }
            return Ok(());
        };

        if let (Some(min), Some(max)) = (spec.min, spec.max) {
            if min > max {
                return Err(invalid(format!("minimum {min} exceeds maximum {max}")));
            }
        }
        if let Some(sd) = spec.sd {
            if !(sd >= 0.0) {
                return Err(invalid(format!("negative standard deviation {sd}")));
            }
        }

        match spec.kind {
            DistributionType::Normal => {
                if value.value.is_none() {
                    return Err(invalid("normal distribution requires a mean".into()));
                }
            }
            DistributionType::Beta => {
                let (Some(mean), Some(sd)) = (value.value, spec.sd) else {
                    return Err(invalid("beta distribution requires a mean and a standard deviation".into()));
                };
                beta_parameters(mean, sd, spec.min.unwrap_or(0.0), spec.max.unwrap_or(1.0))
                    .ok_or_else(|| invalid(format!("mean {mean} and sd {sd} cannot form a beta distribution")))?;
            }
            DistributionType::Uniform | DistributionType::UniformInteger => {
                if spec.min.is_none() || spec.max.is_none() {
                    return Err(invalid("uniform distribution requires a minimum and a maximum".into()));
                }
            }
            DistributionType::User(id) => {
                let rows = self
                    .user
                    .get(&id)
                    .ok_or_else(|| invalid(format!("user distribution {id} has no values")))?;
                let total: f64 = rows.iter().map(|(_, w)| w).sum();
                if total <= 0.0 {
                    return Err(invalid(format!("user distribution {id} has zero total frequency")));
                }
            }
        }
        Ok(())
    }

    /// Draw a sample. Values without a distribution return their fixed
    /// value. Results are truncated to the configured `[min, max]`.
    pub fn sample(&self, value: &DistributionValue, rng: &mut SimRng) -> f64 {
        let Some(spec) = value.distribution else {
            return value.initial();
        };
        let mean = value.value.unwrap_or(0.0);
        let min = spec.min.unwrap_or(f64::NEG_INFINITY);
        let max = spec.max.unwrap_or(f64::INFINITY);

        let raw = match spec.kind {
            DistributionType::Normal => match Normal::new(mean, spec.sd.unwrap_or(0.0)) {
                Ok(n) => n.sample(rng),
                Err(_) => mean,
            },
            DistributionType::Beta => {
                let lo = spec.min.unwrap_or(0.0);
                let hi = spec.max.unwrap_or(1.0);
                match beta_parameters(mean, spec.sd.unwrap_or(0.0), lo, hi)
                    .and_then(|(a, b)| Beta::new(a, b).ok())
                {
                    Some(beta) => lo + beta.sample(rng) * (hi - lo),
                    None => mean,
                }
            }
            DistributionType::Uniform => {
                let lo = spec.min.unwrap_or(0.0);
                let hi = spec.max.unwrap_or(1.0);
                lo + rng.next_f64() * (hi - lo)
            }
            DistributionType::UniformInteger => {
                let lo = spec.min.unwrap_or(0.0).round() as i64;
                let hi = spec.max.unwrap_or(0.0).round() as i64;
                if hi <= lo { lo as f64 } else { rng.gen_range(lo..=hi) as f64 }
            }
            DistributionType::User(id) => self.sample_user(id, rng).unwrap_or(mean),
        };
        raw.clamp(min, max)
    }

    fn sample_user(&self, id: DistributionId, rng: &mut SimRng) -> Option<f64> {
        let rows = self.user.get(&id)?;
        let total: f64 = rows.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let target = rng.next_f64() * total;
        let mut cumulative = 0.0;
        for (v, w) in rows {
            cumulative += w;
            if target < cumulative {
                return Some(*v);
            }
        }
        rows.last().map(|(v, _)| *v)
    }
}

/// Method-of-moments beta parameters for a distribution on `[lo, hi]`.
fn beta_parameters(mean: f64, sd: f64, lo: f64, hi: f64) -> Option<(f64, f64)> {
    if !(hi > lo) || !(sd > 0.0) {
        return None;
    }
    let m = (mean - lo) / (hi - lo);
    let var = (sd / (hi - lo)).powi(2);
    if !(m > 0.0 && m < 1.0) || var >= m * (1.0 - m) {
        return None;
    }
    let common = m * (1.0 - m) / var - 1.0;
    Some((m * common, (1.0 - m) * common))
}

// ---------------------------------------------------------------------------
// Runtime samples
// ---------------------------------------------------------------------------

/// Index of a validated value in the scenario's value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueSlot(pub u32);

/// Current samples for every configured value, one entry per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledValues {
    current: Vec<f64>,
}

impl SampledValues {
    pub fn new(values: &[DistributionValue]) -> Self {
        Self {
            current: values.iter().map(DistributionValue::initial).collect(),
        }
    }

    pub fn get(&self, slot: ValueSlot) -> f64 {
        self.current.get(slot.0 as usize).copied().unwrap_or(0.0)
    }

    /// Re-sample every distribution whose frequency fires on `event`.
    pub fn resample(
        &mut self,
        values: &[DistributionValue],
        provider: &DistributionProvider,
        rng: &mut SimRng,
        event: ResampleEvent,
    ) {
        for (slot, value) in values.iter().enumerate() {
            if let Some(spec) = value.distribution {
                if spec.frequency.fires_on(event) {
                    self.current[slot] = provider.sample(value, rng);
                }
            }
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.current
    }
}
