//! Cyclic schedule of dynamics variants
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body masses of the nominal runner (world body first).
pub const NOMINAL_MASSES: [f64; 8] = [
    0.0, 6.25020921, 1.54351464, 1.5874477, 1.09539749, 1.43807531, 1.20083682, 0.88451883,
];

/// Order in which variants are visited.
pub const TASK_CYCLE: [Variant; 5] = [
    Variant::Nominal,
    Variant::Eighteen,
    Variant::Nominal,
    Variant::Sixteen,
    Variant::Twenty,
];

/// Number of steps an environment spends on each variant of the cycle.
pub const TASK_LENGTH: u64 = 100_000;

/// Indices into [`NOMINAL_MASSES`] of the back thigh, shin, and foot.
const BACK_LEG: [usize; 3] = [2, 3, 4];

/// Back-leg mass multiplier of [`Variant::Leg`].
const LEG_MULTIPLIER: f64 = 1.5;

/// A dynamics variant of the runner body.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Nominal body (total mass 14).
    Nominal,
    /// All masses scaled to a total of 16.
    Sixteen,
    /// All masses scaled to a total of 18.
    Eighteen,
    /// All masses scaled to a total of 20.
    Twenty,
    /// Nominal body with a heavier back leg. Not part of the training cycle.
    Leg,
}

impl Variant {
    /// Uniform mass multiplier relative to the nominal body.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Nominal | Self::Leg => 1.0,
            Self::Sixteen => 16.0 / 14.0,
            Self::Eighteen => 18.0 / 14.0,
            Self::Twenty => 20.0 / 14.0,
        }
    }

    /// Body masses of this variant.
    pub fn masses(self) -> [f64; 8] {
        let multiplier = self.multiplier();
        let mut masses = NOMINAL_MASSES.map(|m| m * multiplier);
        if self == Self::Leg {
            for i in BACK_LEG {
                masses[i] *= LEG_MULTIPLIER;
            }
        }
        masses
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Nominal => "nominal",
            Self::Sixteen => "sixteen",
            Self::Eighteen => "eighteen",
            Self::Twenty => "twenty",
            Self::Leg => "leg",
        };
        f.write_str(name)
    }
}

/// Per-environment task cycle state.
///
/// Advances on the environment's own step counter, independently of anything the learner does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCycle {
    index: usize,
    steps_since_change: u64,
    task_length: u64,
}

impl Default for TaskCycle {
    fn default() -> Self {
        Self::new(TASK_LENGTH)
    }
}

impl TaskCycle {
    pub const fn new(task_length: u64) -> Self {
        Self {
            index: 0,
            steps_since_change: 0,
            task_length,
        }
    }

    /// The current variant.
    pub const fn variant(&self) -> Variant {
        TASK_CYCLE[self.index]
    }

    /// Index of the current variant in [`TASK_CYCLE`].
    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn steps_since_change(&self) -> u64 {
        self.steps_since_change
    }

    /// Account for one simulation step.
    ///
    /// The counter is checked before it is incremented: once it strictly exceeds the task length
    /// it is reset to zero and the cycle advances. Returns the new variant when it changed.
    pub fn tick(&mut self) -> Option<Variant> {
        let changed = if self.steps_since_change > self.task_length {
            self.steps_since_change = 0;
            self.index = (self.index + 1) % TASK_CYCLE.len();
            Some(self.variant())
        } else {
            None
        };
        self.steps_since_change += 1;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Variant::Nominal, 14.0)]
    #[case(Variant::Sixteen, 16.0)]
    #[case(Variant::Eighteen, 18.0)]
    #[case(Variant::Twenty, 20.0)]
    fn total_mass(#[case] variant: Variant, #[case] total: f64) {
        let sum: f64 = variant.masses().iter().sum();
        assert!((sum - total).abs() < 1e-6, "{} != {}", sum, total);
    }

    #[test]
    fn leg_variant_only_changes_back_leg() {
        let nominal = Variant::Nominal.masses();
        let leg = Variant::Leg.masses();
        for i in 0..8 {
            if BACK_LEG.contains(&i) {
                assert!(leg[i] > nominal[i]);
            } else {
                assert_eq!(leg[i], nominal[i]);
            }
        }
    }

    #[test]
    fn switches_when_counter_strictly_exceeds_length() {
        let mut cycle = TaskCycle::new(3);
        // Counter values 0, 1, 2, 3 do not exceed the length
        for _ in 0..4 {
            assert_eq!(cycle.tick(), None);
        }
        assert_eq!(cycle.steps_since_change(), 4);
        assert_eq!(cycle.tick(), Some(Variant::Eighteen));
        assert_eq!(cycle.steps_since_change(), 1);
        assert_eq!(cycle.index(), 1);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(10)]
    fn visits_cycle_in_order(#[case] task_length: u64) {
        let mut cycle = TaskCycle::new(task_length);
        let mut visited = vec![cycle.variant()];
        for _ in 0..(task_length + 2) * 6 {
            if let Some(v) = cycle.tick() {
                visited.push(v);
            }
        }
        assert_eq!(visited[..6], [TASK_CYCLE.as_slice(), &TASK_CYCLE[..1]].concat()[..]);
    }

    #[rstest]
    #[case(5, 100)]
    #[case(7, 1000)]
    fn switch_count_over_steps(#[case] task_length: u64, #[case] steps: u64) {
        let mut cycle = TaskCycle::new(task_length);
        let switches = (0..steps).filter(|_| cycle.tick().is_some()).count() as u64;
        // The first switch happens on tick task_length + 2, later ones every task_length + 1
        let expected = if steps < task_length + 2 {
            0
        } else {
            1 + (steps - task_length - 2) / (task_length + 1)
        };
        assert_eq!(switches, expected);
    }
}
