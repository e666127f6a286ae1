//! Torch components
pub mod distributions;
pub mod ewc;
pub mod modules;
pub mod optimizers;
pub mod params;
pub mod policy;
pub mod updaters;
pub mod utils;

pub use distributions::DiagGaussian;
pub use ewc::{EwcRegularizer, FisherRefresh};
pub use modules::{Activation, Mlp, MlpConfig};
pub use params::ParamSet;
pub use policy::{ActorVCritic, PolicyStep};
pub use updaters::{PpoUpdater, UpdateError};
