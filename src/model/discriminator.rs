use anyhow::Result;
use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, activation};

use super::config::DiscriminatorConfig;

#[derive(Debug, Clone)]
pub struct DiscriminatorOutput<B: Backend> {
    pub logits: Tensor<B, 2>,
    pub probs: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    convs: Vec<Conv1d<B>>,
    dropout: Dropout,
    head: Linear<B>,
}

impl<B: Backend> Discriminator<B> {
    pub fn new(config: &DiscriminatorConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let mut channels = config.embedding_size;
        let mut convs = Vec::with_capacity(config.conv_depths.len());
        for (&kernel, &depth) in config.conv_spatials.iter().zip(config.conv_depths.iter()) {
            convs.push(Conv1dConfig::new(channels, depth, kernel).init(device));
            channels = depth;
        }

        Ok(Self {
            convs,
            dropout: DropoutConfig::new(config.dropout).init(),
            head: LinearConfig::new(channels, config.label_dim).init(device),
        })
    }

    pub fn forward(&self, embedded: Tensor<B, 3>) -> DiscriminatorOutput<B> {
        let mut features = embedded.swap_dims(1, 2);
        for conv in &self.convs {
            features = activation::relu(conv.forward(features));
        }

        let [batch, channels, _] = features.dims();
        let pooled = features.max_dim(2).reshape([batch, channels]);
        let logits = self.head.forward(self.dropout.forward(pooled));

        DiscriminatorOutput {
            probs: activation::sigmoid(logits.clone()),
            logits,
        }
    }
}
