//! Multi-layer perceptron
use std::fmt;
use std::iter;
use tch::{
    nn::{self, Linear, LinearConfig, Module, Path},
    Tensor,
};

/// Activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activation {
    /// No transformation
    Identity,
    /// Rectified linear
    Relu,
    /// Hyperbolic tangent
    Tanh,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Tanh
    }
}

impl Activation {
    /// The function pointer for this activation function if not the identity function.
    #[inline]
    pub fn maybe_function(self) -> Option<fn(&Tensor) -> Tensor> {
        match self {
            Self::Identity => None,
            Self::Relu => Some(Tensor::relu),
            Self::Tanh => Some(Tensor::tanh),
        }
    }
}

/// Configuration for the [`Mlp`] module.
#[derive(Debug, Clone)]
pub struct MlpConfig {
    /// Sizes of the hidden layers
    pub hidden_sizes: Vec<usize>,
    /// Activation function between hidden layers.
    pub activation: Activation,
    /// Activation function on the output.
    pub output_activation: Activation,
    /// Configuration for the linear layers
    pub linear_config: LinearConfig,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 64],
            activation: Activation::Tanh,
            output_activation: Activation::Identity,
            linear_config: LinearConfig::default(),
        }
    }
}

impl MlpConfig {
    pub fn build_module(&self, vs: &Path, in_dim: usize, out_dim: usize) -> Mlp {
        Mlp::new(vs, in_dim, out_dim, self)
    }
}

/// Multi-layer perceptron
pub struct Mlp {
    layers: Vec<Linear>,
    activation: Option<fn(&Tensor) -> Tensor>,
    output_activation: Option<fn(&Tensor) -> Tensor>,
}

impl fmt::Debug for Mlp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mlp")
            .field("num_layers", &self.layers.len())
            .finish()
    }
}

impl Mlp {
    pub fn new(vs: &Path, in_dim: usize, out_dim: usize, config: &MlpConfig) -> Self {
        let in_dims = iter::once(&in_dim).chain(&config.hidden_sizes);
        let out_dims = config.hidden_sizes.iter().chain(iter::once(&out_dim));

        let layers: Vec<_> = in_dims
            .zip(out_dims)
            .enumerate()
            .map(|(i, (in_, out_))| {
                nn::linear(
                    vs / format!("layer_{}", i),
                    *in_ as i64,
                    *out_ as i64,
                    config.linear_config,
                )
            })
            .collect();

        Self {
            layers,
            activation: config.activation.maybe_function(),
            output_activation: config.output_activation.maybe_function(),
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let mut iter_layers = self.layers.iter();
        // There is always at least the output layer
        let mut hidden = match iter_layers.next() {
            Some(layer) => layer.forward(input),
            None => input.shallow_clone(),
        };
        for layer in iter_layers {
            if let Some(activation) = self.activation {
                hidden = activation(&hidden);
            }
            hidden = layer.forward(&hidden);
        }
        if let Some(output_activation) = self.output_activation {
            hidden = output_activation(&hidden);
        }
        hidden
    }
}
