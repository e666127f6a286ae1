//! Planar runner with a forward-velocity safety constraint
use super::task_cycle::{TaskCycle, Variant};
use super::{check_action, EnvError, Environment, Step};
use crate::Prng;
use rand::distributions::{Distribution, Uniform};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Number of actuated joints: back thigh, shin, and foot then front thigh, shin, and foot.
pub const NUM_JOINTS: usize = 6;

/// Observation: torso pitch, joint angles, forward velocity, pitch rate, joint velocities.
const OBSERVATION_DIM: usize = 2 * NUM_JOINTS + 3;

/// Which body the runner has and whether it changes over time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunnerKind {
    /// Cycles through the variants of [`TASK_CYCLE`](super::TASK_CYCLE).
    Cycling,
    /// Fixed nominal body.
    Nominal,
    /// Fixed body with a heavy back leg.
    Leg,
}

/// Configuration for [`VelocityRunner`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityRunnerConfig {
    pub kind: RunnerKind,
    /// Steps spent on each variant when cycling.
    pub task_length: u64,
    /// Forward velocity above which a step incurs unit cost.
    pub velocity_threshold: f64,
    /// Weight of the squared action norm penalty in the reward.
    pub control_cost_weight: f64,
    /// Scale of the random perturbation of the initial state.
    pub reset_noise_scale: f64,
    /// Number of physics sub-steps per environment step.
    pub frame_skip: usize,
    /// Physics integration time step (s).
    pub time_step: f64,
}

impl Default for VelocityRunnerConfig {
    fn default() -> Self {
        Self {
            kind: RunnerKind::Cycling,
            task_length: super::TASK_LENGTH,
            velocity_threshold: 3.2096,
            control_cost_weight: 0.1,
            reset_noise_scale: 0.1,
            frame_skip: 5,
            time_step: 0.01,
        }
    }
}

impl VelocityRunnerConfig {
    #[must_use]
    pub fn with_kind(kind: RunnerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn build_env(&self, rng: &mut Prng) -> VelocityRunner {
        VelocityRunner::new(*self, rng)
    }
}

/// Actuator gear ratios.
const GEAR: [f64; NUM_JOINTS] = [120.0, 90.0, 60.0, 120.0, 60.0, 30.0];
/// Converts geared actuator output into joint torque.
const TORQUE_SCALE: f64 = 0.05;
/// Passive joint spring stiffness.
const STIFFNESS: [f64; NUM_JOINTS] = [12.0, 9.0, 6.0, 12.0, 6.0, 3.0];
/// Passive joint damping.
const DAMPING: [f64; NUM_JOINTS] = [1.2, 0.9, 0.6, 1.2, 0.6, 0.3];
/// Joint angle limit (radians).
const JOINT_LIMIT: f64 = 1.0;
/// Ground traction coefficient of a leg in full contact.
const TRACTION: f64 = 4.0;
/// Linear drag on the body.
const DRAG: f64 = 8.0;
/// Sharpness of the contact model.
const CONTACT_SHARPNESS: f64 = 4.0;
/// Torso pitch spring and damping.
const PITCH_STIFFNESS: f64 = 20.0;
const PITCH_DAMPING: f64 = 2.0;
/// Fraction of joint torque reacted into the torso pitch.
const PITCH_REACTION: f64 = 0.01;

/// Physical state of the runner.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
struct RunnerState {
    pitch: f64,
    pitch_rate: f64,
    joint_angles: [f64; NUM_JOINTS],
    joint_velocities: [f64; NUM_JOINTS],
    forward_velocity: f64,
}

/// Planar six-joint runner rewarded for forward velocity with a cost for running too fast.
///
/// A reduced-order stand-in for a half-cheetah body: joint angles follow driven damped springs
/// whose inertia is the mass of the link they move, and each leg produces forward thrust when
/// its lower joint sweeps backwards while the upper joint holds the leg in ground contact.
/// The body never reaches a terminal state.
///
/// A [`RunnerKind::Cycling`] runner changes its masses according to a [`TaskCycle`] and resets
/// its physical state whenever the variant changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityRunner {
    config: VelocityRunnerConfig,
    masses: [f64; 8],
    cycle: Option<TaskCycle>,
    state: RunnerState,
}

impl VelocityRunner {
    pub fn new(config: VelocityRunnerConfig, rng: &mut Prng) -> Self {
        let (masses, cycle) = match config.kind {
            RunnerKind::Cycling => {
                let cycle = TaskCycle::new(config.task_length);
                (cycle.variant().masses(), Some(cycle))
            }
            RunnerKind::Nominal => (Variant::Nominal.masses(), None),
            RunnerKind::Leg => (Variant::Leg.masses(), None),
        };
        let mut env = Self {
            config,
            masses,
            cycle,
            state: RunnerState::default(),
        };
        env.state = env.initial_state(rng);
        env
    }

    /// Current body masses.
    pub const fn masses(&self) -> &[f64; 8] {
        &self.masses
    }

    /// The task cycle, if this runner has one.
    pub const fn task_cycle(&self) -> Option<&TaskCycle> {
        self.cycle.as_ref()
    }

    pub const fn forward_velocity(&self) -> f64 {
        self.state.forward_velocity
    }

    fn initial_state(&self, rng: &mut Prng) -> RunnerState {
        let scale = self.config.reset_noise_scale;
        let position_noise = Uniform::new_inclusive(-scale, scale);
        let mut velocity_noise = || {
            let z: f64 = StandardNormal.sample(rng);
            z * scale
        };
        let mut state = RunnerState {
            pitch_rate: velocity_noise(),
            forward_velocity: velocity_noise(),
            ..RunnerState::default()
        };
        for v in &mut state.joint_velocities {
            *v = velocity_noise();
        }
        state.pitch = position_noise.sample(rng);
        for q in &mut state.joint_angles {
            *q = position_noise.sample(rng);
        }
        state
    }

    fn observe(&self) -> Vec<f32> {
        let s = &self.state;
        let mut obs = Vec::with_capacity(OBSERVATION_DIM);
        obs.push(s.pitch as f32);
        obs.extend(s.joint_angles.iter().map(|&q| q as f32));
        obs.push(s.forward_velocity as f32);
        obs.push(s.pitch_rate as f32);
        obs.extend(s.joint_velocities.iter().map(|&v| v as f32));
        obs
    }

    /// Integrate the dynamics over one physics time step.
    fn integrate(&mut self, action: &[f32]) {
        let dt = self.config.time_step;
        let s = &mut self.state;

        let mut reaction = 0.0;
        for i in 0..NUM_JOINTS {
            let torque = f64::from(action[i]) * GEAR[i] * TORQUE_SCALE;
            reaction += torque;
            let inertia = self.masses[i + 2];
            let accel = (torque - STIFFNESS[i] * s.joint_angles[i]
                - DAMPING[i] * s.joint_velocities[i])
                / inertia;
            s.joint_velocities[i] += accel * dt;
            let angle = s.joint_angles[i] + s.joint_velocities[i] * dt;
            if angle.abs() > JOINT_LIMIT {
                s.joint_angles[i] = angle.clamp(-JOINT_LIMIT, JOINT_LIMIT);
                s.joint_velocities[i] = 0.0;
            } else {
                s.joint_angles[i] = angle;
            }
        }

        let mut thrust = 0.0;
        for leg in [0, 3] {
            let (q, qd) = (&s.joint_angles[leg..leg + 3], &s.joint_velocities[leg..leg + 3]);
            thrust += TRACTION * contact(q[0]) * -qd[1] + 0.5 * TRACTION * contact(q[1]) * -qd[2];
        }
        let total_mass: f64 = self.masses.iter().sum();
        s.forward_velocity += (thrust - DRAG * s.forward_velocity) / total_mass * dt;

        let pitch_accel = (-PITCH_REACTION * reaction
            - PITCH_STIFFNESS * s.pitch
            - PITCH_DAMPING * s.pitch_rate)
            / self.masses[1];
        s.pitch_rate += pitch_accel * dt;
        s.pitch += s.pitch_rate * dt;
    }

    fn state_is_finite(&self) -> bool {
        let s = &self.state;
        s.pitch.is_finite()
            && s.pitch_rate.is_finite()
            && s.forward_velocity.is_finite()
            && s.joint_angles.iter().all(|x| x.is_finite())
            && s.joint_velocities.iter().all(|x| x.is_finite())
    }
}

/// Degree of ground contact of a leg given its upper joint angle, in `[0, 1]`.
fn contact(angle: f64) -> f64 {
    0.5 * (1.0 + (CONTACT_SHARPNESS * angle).tanh())
}

impl Environment for VelocityRunner {
    fn observation_dim(&self) -> usize {
        OBSERVATION_DIM
    }

    fn action_dim(&self) -> usize {
        NUM_JOINTS
    }

    fn reset(&mut self, rng: &mut Prng) -> Vec<f32> {
        self.state = self.initial_state(rng);
        self.observe()
    }

    fn step(&mut self, action: &[f32], rng: &mut Prng) -> Result<Step, EnvError> {
        check_action(action, NUM_JOINTS)?;
        for _ in 0..self.config.frame_skip {
            self.integrate(action);
        }
        if !self.state_is_finite() {
            return Err(EnvError::NonFiniteState);
        }

        let velocity = self.state.forward_velocity;
        let control_cost = self.config.control_cost_weight
            * action.iter().map(|&a| f64::from(a).powi(2)).sum::<f64>();
        let observation = self.observe();
        let reward = velocity - control_cost;
        let cost = if velocity > self.config.velocity_threshold {
            1.0
        } else {
            0.0
        };

        // The variant switch happens after the observation is taken
        if let Some(cycle) = &mut self.cycle {
            if let Some(variant) = cycle.tick() {
                log::debug!("runner switched to the {} variant", variant);
                self.masses = variant.masses();
                self.state = self.initial_state(rng);
            }
        }

        Ok(Step {
            observation,
            reward,
            cost,
            terminated: false,
            truncated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::testing;
    use rand::SeedableRng;
    use rstest::rstest;

    fn runner(kind: RunnerKind) -> (VelocityRunner, Prng) {
        let mut rng = Prng::seed_from_u64(0);
        let env = VelocityRunnerConfig::with_kind(kind).build_env(&mut rng);
        (env, rng)
    }

    #[rstest]
    #[case(RunnerKind::Cycling)]
    #[case(RunnerKind::Nominal)]
    #[case(RunnerKind::Leg)]
    fn run_random(#[case] kind: RunnerKind) {
        let (mut env, _) = runner(kind);
        testing::check_random_steps(&mut env, 500, 1);
    }

    #[test]
    fn rejects_wrong_action_dim() {
        let (mut env, mut rng) = runner(RunnerKind::Nominal);
        assert_eq!(
            env.step(&[0.0; 3], &mut rng),
            Err(EnvError::ActionDim {
                expected: 6,
                actual: 3
            })
        );
    }

    #[test]
    fn rejects_nan_action() {
        let (mut env, mut rng) = runner(RunnerKind::Nominal);
        let mut action = [0.0; NUM_JOINTS];
        action[2] = f32::NAN;
        assert!(matches!(
            env.step(&action, &mut rng),
            Err(EnvError::NonFiniteAction(_))
        ));
    }

    #[test]
    fn zero_action_settles() {
        let (mut env, mut rng) = runner(RunnerKind::Nominal);
        for _ in 0..2000 {
            env.step(&[0.0; NUM_JOINTS], &mut rng).unwrap();
        }
        assert!(env.forward_velocity().abs() < 1e-3);
    }

    #[test]
    fn cost_marks_fast_steps() {
        let config = VelocityRunnerConfig {
            velocity_threshold: -1e9,
            ..VelocityRunnerConfig::with_kind(RunnerKind::Nominal)
        };
        let mut rng = Prng::seed_from_u64(1);
        let mut env = config.build_env(&mut rng);
        let step = env.step(&[0.0; NUM_JOINTS], &mut rng).unwrap();
        assert_eq!(step.cost, 1.0);
    }

    #[test]
    fn reward_includes_control_cost() {
        let config = VelocityRunnerConfig::with_kind(RunnerKind::Nominal);
        let mut rng_a = Prng::seed_from_u64(2);
        let mut rng_b = Prng::seed_from_u64(2);
        let mut env_a = config.build_env(&mut rng_a);
        let mut env_b = config.build_env(&mut rng_b);
        let zero = env_a.step(&[0.0; NUM_JOINTS], &mut rng_a).unwrap();
        let velocity = env_a.forward_velocity();
        assert!((zero.reward - velocity).abs() < 1e-9);
        let full = env_b.step(&[1.0; NUM_JOINTS], &mut rng_b).unwrap();
        let expected = env_b.forward_velocity() - 0.1 * NUM_JOINTS as f64;
        assert!((full.reward - expected).abs() < 1e-6);
    }

    #[test]
    fn cycling_runner_switches_masses_and_resets() {
        let config = VelocityRunnerConfig {
            task_length: 10,
            ..VelocityRunnerConfig::default()
        };
        let mut rng = Prng::seed_from_u64(3);
        let mut env = config.build_env(&mut rng);
        assert_eq!(env.masses(), &Variant::Nominal.masses());
        for _ in 0..11 {
            env.step(&[1.0; NUM_JOINTS], &mut rng).unwrap();
        }
        assert_eq!(env.masses(), &Variant::Nominal.masses());
        env.step(&[1.0; NUM_JOINTS], &mut rng).unwrap();
        assert_eq!(env.masses(), &Variant::Eighteen.masses());
        assert_eq!(env.task_cycle().unwrap().index(), 1);
    }

    #[test]
    fn step_observation_precedes_switch_reset() {
        let config = VelocityRunnerConfig {
            task_length: 0,
            reset_noise_scale: 0.0,
            ..VelocityRunnerConfig::default()
        };
        let mut rng = Prng::seed_from_u64(4);
        let mut env = config.build_env(&mut rng);
        // First tick never switches; second tick switches and resets the state to zero
        env.step(&[1.0; NUM_JOINTS], &mut rng).unwrap();
        let step = env.step(&[1.0; NUM_JOINTS], &mut rng).unwrap();
        assert!(step.observation.iter().any(|&x| x != 0.0));
        assert_eq!(env.forward_velocity(), 0.0);
        assert_eq!(env.masses(), &Variant::Eighteen.masses());
    }

    #[test]
    fn fixed_runners_never_switch() {
        let (env, _) = runner(RunnerKind::Leg);
        assert!(env.task_cycle().is_none());
        assert_eq!(env.masses(), &Variant::Leg.masses());
    }
}
