//! Per-cell, per-group transition selection.
//!
//! One uniform draw `u` is taken per cell and group. Candidates are scanned
//! in their shuffled order, accumulating weight, and the first candidate at
//! which the running total exceeds `u` fires. If any candidate carries a
//! force-fire override, selection instead redraws over the reselection
//! weights. Either way at most one candidate fires.

use crate::multiplier::Weight;
use crate::rng::SimRng;

/// States of the selection machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Scanning,
    ForcedSelection,
    Fired(usize),
    NoFire,
}

impl SelectionState {
    pub fn fired(self) -> Option<usize> {
        match self {
            SelectionState::Fired(i) => Some(i),
            _ => None,
        }
    }
}

/// Weights of a cell's candidates for one group, in scan order.
pub trait CandidateWeights {
    fn len(&self) -> usize;

    fn weight(&self, index: usize) -> Weight;

    /// Weight on the forced path, excluding the override itself.
    fn reselection_weight(&self, index: usize) -> f64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Precomputed weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    pub weights: Vec<Weight>,
    pub reselection: Vec<f64>,
}

impl WeightTable {
    pub fn clear(&mut self) {
        self.weights.clear();
        self.reselection.clear();
    }

    pub fn push(&mut self, weight: Weight, reselection: f64) {
        self.weights.push(weight);
        self.reselection.push(reselection);
    }
}

impl CandidateWeights for WeightTable {
    fn len(&self) -> usize {
        self.weights.len()
    }

    fn weight(&self, index: usize) -> Weight {
        self.weights[index]
    }

    fn reselection_weight(&self, index: usize) -> f64 {
        self.reselection[index]
    }
}

/// Run the selection machine to completion. Returns `Fired(i)` with the
/// candidate's scan index, or `NoFire`.
pub fn select_transition<W: CandidateWeights + ?Sized>(weights: &W, rng: &mut SimRng) -> SelectionState {
    let u = rng.next_f64();
    let n = weights.len();
    let mut state = if (0..n).any(|i| weights.weight(i).force) {
        SelectionState::ForcedSelection
    } else {
        SelectionState::Scanning
    };

    let mut cumulative = 0.0;
    let mut next = 0;
    loop {
        state = match state {
            SelectionState::Scanning => {
                if next == n {
                    SelectionState::NoFire
                } else {
                    cumulative += weights.weight(next).value;
                    if u < cumulative {
                        SelectionState::Fired(next)
                    } else {
                        next += 1;
                        SelectionState::Scanning
                    }
                }
            }
            SelectionState::ForcedSelection => match reselect(weights, rng) {
                Some(i) => SelectionState::Fired(i),
                None => SelectionState::NoFire,
            },
            done => return done,
        };
    }
}

/// Weighted redraw over the reselection weights. `None` when they sum to
/// zero.
fn reselect<W: CandidateWeights + ?Sized>(weights: &W, rng: &mut SimRng) -> Option<usize> {
    let total: f64 = (0..weights.len())
        .map(|i| weights.reselection_weight(i).max(0.0))
        .sum();
    if !(total > 0.0) {
        return None;
    }
    let r = rng.next_f64() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for i in 0..weights.len() {
        let w = weights.reselection_weight(i).max(0.0);
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = Some(i);
        if r < cumulative {
            return Some(i);
        }
    }
    last_positive
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: &[f64]) -> WeightTable {
        let mut t = WeightTable::default();
        for &v in values {
            t.push(Weight { value: v, force: false }, v);
        }
        t
    }

    #[test]
    fn certain_transition_always_fires() {
        let t = table(&[1.0]);
        for seed in 0..100 {
            let mut rng = SimRng::new(seed);
            assert_eq!(select_transition(&t, &mut rng), SelectionState::Fired(0));
        }
    }

    #[test]
    fn empty_candidates_never_fire() {
        let t = WeightTable::default();
        let mut rng = SimRng::new(1);
        assert_eq!(select_transition(&t, &mut rng), SelectionState::NoFire);
    }

    #[test]
    fn zero_weight_never_fires() {
        let t = table(&[0.0, 0.0]);
        for seed in 0..1000 {
            let mut rng = SimRng::new(seed);
            assert_eq!(select_transition(&t, &mut rng), SelectionState::NoFire);
        }
    }

    #[test]
    fn scan_uses_one_draw() {
        let t = table(&[0.3, 0.3]);
        let mut a = SimRng::new(9);
        let mut b = SimRng::new(9);
        select_transition(&t, &mut a);
        b.next_f64();
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn first_candidate_past_draw_fires() {
        // Sum above one: the first candidate saturates the draw.
        let t = table(&[1.0, 1.0]);
        let mut rng = SimRng::new(3);
        assert_eq!(select_transition(&t, &mut rng), SelectionState::Fired(0));
    }

    #[test]
    fn forced_path_reselects_among_positive_weights() {
        let mut t = WeightTable::default();
        t.push(Weight { value: 0.0, force: false }, 0.0);
        t.push(Weight::forced(), 0.5);
        for seed in 0..200 {
            let mut rng = SimRng::new(seed);
            assert_eq!(select_transition(&t, &mut rng), SelectionState::Fired(1));
        }
    }

    #[test]
    fn forced_path_with_zero_weights_does_not_fire() {
        let mut t = WeightTable::default();
        t.push(Weight::forced(), 0.0);
        let mut rng = SimRng::new(4);
        assert_eq!(select_transition(&t, &mut rng), SelectionState::NoFire);
    }

    #[test]
    fn fire_rate_tracks_probability() {
        let t = table(&[0.25]);
        let mut rng = SimRng::new(77);
        let fires = (0..10_000)
            .filter(|_| select_transition(&t, &mut rng).fired().is_some())
            .count();
        assert!((2_200..2_800).contains(&fires), "fires = {fires}");
    }
}
