//! Environment testing utilities
use super::{check_action, EnvError, Environment, Step};
use crate::Prng;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;

/// Run an environment with uniform random actions and check that invariants are satisfied.
pub fn check_random_steps<E: Environment>(env: &mut E, num_steps: u64, seed: u64) {
    let mut rng = Prng::seed_from_u64(seed);
    let action_dist = Uniform::new_inclusive(-1.0f32, 1.0);
    let obs = env.reset(&mut rng);
    assert_eq!(obs.len(), env.observation_dim());
    for _ in 0..num_steps {
        let action: Vec<f32> = (0..env.action_dim())
            .map(|_| action_dist.sample(&mut rng))
            .collect();
        let step = env.step(&action, &mut rng).unwrap();
        assert_eq!(step.observation.len(), env.observation_dim());
        assert!(step.observation.iter().all(|x| x.is_finite()));
        assert!(step.reward.is_finite());
        assert!(step.cost >= 0.0);
        if step.episode_done() {
            env.reset(&mut rng);
        }
    }
}

/// Deterministic single-action environment for exercising episode boundary handling.
///
/// The observation is `[t, 1]` where `t` counts steps since reset. Every step has reward 1 and
/// cost 1 on odd steps. Optionally terminates once `t` reaches a set value.
#[derive(Debug, Clone, PartialEq)]
pub struct CountingEnv {
    t: u64,
    terminate_at: Option<u64>,
}

impl CountingEnv {
    pub const fn new(terminate_at: Option<u64>) -> Self {
        Self { t: 0, terminate_at }
    }

    fn observe(&self) -> Vec<f32> {
        vec![self.t as f32, 1.0]
    }
}

impl Environment for CountingEnv {
    fn observation_dim(&self) -> usize {
        2
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn reset(&mut self, _: &mut Prng) -> Vec<f32> {
        self.t = 0;
        self.observe()
    }

    fn step(&mut self, action: &[f32], _: &mut Prng) -> Result<Step, EnvError> {
        check_action(action, 1)?;
        self.t += 1;
        Ok(Step {
            observation: self.observe(),
            reward: 1.0,
            cost: (self.t % 2) as f64,
            terminated: self.terminate_at.map_or(false, |t| self.t >= t),
            truncated: false,
        })
    }
}
