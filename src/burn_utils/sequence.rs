use burn::{
    nn::{Linear, LinearConfig, Relu, Sigmoid, Tanh},
    prelude::*,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

/// One resolved entry of a `network_spec` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerDescriptor {
    Dense {
        units: usize,
        activation: Activation,
        scope: String,
    },
}

impl LayerDescriptor {
    pub fn units(&self) -> usize {
        match self {
            LayerDescriptor::Dense { units, .. } => *units,
        }
    }
}

impl fmt::Display for LayerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerDescriptor::Dense {
                units,
                activation,
                scope,
            } => write!(f, "{}: dense({}, {:?})", scope, units, activation),
        }
    }
}

#[derive(Module, Debug)]
pub enum BurnForwarder<B: Backend> {
    Linear(Linear<B>),
    Relu(Relu),
    Tanh(Tanh),
    Sigmoid(Sigmoid),
}

#[derive(Module, Debug)]
pub struct Sequence<B: Backend> {
    forwarder_vec: Vec<BurnForwarder<B>>,
}

impl<B: Backend> Sequence<B> {
    pub fn push(&mut self, forwarder: BurnForwarder<B>) {
        self.forwarder_vec.push(forwarder);
    }

    pub fn len(&self) -> usize {
        self.forwarder_vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwarder_vec.is_empty()
    }

    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mut out = input;
        for forwarder in &self.forwarder_vec {
            out = match forwarder {
                BurnForwarder::Linear(linear) => linear.forward(out),
                BurnForwarder::Relu(relu) => relu.forward(out),
                BurnForwarder::Tanh(tanh) => tanh.forward(out),
                BurnForwarder::Sigmoid(sigmoid) => sigmoid.forward(out),
            }
        }
        return out;
    }
}

/// Builds the hidden stack described by `descriptors`. Returns the stack and
/// the width of its last layer (`input_size` when the list is empty).
pub fn build_from_descriptors<B: Backend>(
    input_size: usize,
    descriptors: &[LayerDescriptor],
    device: &B::Device,
) -> (Sequence<B>, usize) {
    let mut seq: Sequence<B> = Sequence {
        forwarder_vec: vec![],
    };
    let mut in_size = input_size;
    for descriptor in descriptors {
        match descriptor {
            LayerDescriptor::Dense {
                units, activation, ..
            } => {
                debug!("{} <- {} inputs", descriptor, in_size);
                seq.push(BurnForwarder::Linear(
                    LinearConfig::new(in_size, *units).init(device),
                ));
                match activation {
                    Activation::Linear => {}
                    Activation::Relu => seq.push(BurnForwarder::Relu(Relu::new())),
                    Activation::Tanh => seq.push(BurnForwarder::Tanh(Tanh::new())),
                    Activation::Sigmoid => seq.push(BurnForwarder::Sigmoid(Sigmoid::new())),
                }
                in_size = *units;
            }
        }
    }
    return (seq, in_size);
}
