use anyhow::Result;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution as TensorDistribution, Int, Tensor, activation};

use super::config::GeneratorConfig;
use super::lstm::{HiddenMemory, LstmCell, OutputProjection};

#[derive(Debug, Clone)]
pub enum GeneratorMode<B: Backend> {
    Pretrain(Tensor<B, 2, Int>),
    Adversarial(Tensor<B, 2>),
}

#[derive(Debug, Clone)]
pub struct GeneratorOutput<B: Backend> {
    pub logits: Tensor<B, 3>,
    pub probs: Tensor<B, 3>,
    pub tokens: Tensor<B, 2, Int>,
    /// Soft-argmax embeddings consumed by the discriminator, `[batch, sequence_length, emb]`.
    pub embedded: Tensor<B, 3>,
}

#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    embedding_size: usize,
    rnn_size: usize,
    z_dim: usize,
    sequence_length: usize,
    start_token: usize,
    l_soft: f32,
    embedding: Embedding<B>,
    latent: Linear<B>,
    cells: Vec<LstmCell<B>>,
    output: OutputProjection<B>,
    dropout: Dropout,
}

enum Drive<B: Backend> {
    Forced(Tensor<B, 3>),
    Free(Tensor<B, 2>),
}

impl<B: Backend> Generator<B> {
    pub fn new(config: &GeneratorConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let cells = (0..config.rnn_depth)
            .map(|layer| {
                let input = if layer == 0 {
                    config.embedding_size
                } else {
                    config.rnn_size
                };
                LstmCell::new(input, config.rnn_size, config.forget_gate_bias, device)
            })
            .collect();

        Ok(Self {
            embedding_size: config.embedding_size,
            rnn_size: config.rnn_size,
            z_dim: config.z_dim,
            sequence_length: config.sequence_length,
            start_token: config.start_token,
            l_soft: config.l_soft,
            embedding: EmbeddingConfig::new(config.vocab_size, config.embedding_size).init(device),
            latent: LinearConfig::new(config.z_dim, config.embedding_size).init(device),
            cells,
            output: OutputProjection::new(config.rnn_size, config.vocab_size, device),
            dropout: DropoutConfig::new(config.dropout).init(),
        })
    }

    pub fn embedding_weight(&self) -> Tensor<B, 2> {
        self.embedding.weight.val()
    }

    /// Embed token sequences with the generator's table. The discriminator's
    /// real pass goes through here, so both sides share one embedding.
    pub fn embed(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.embedding.forward(tokens)
    }

    pub fn latent_prior(&self, batch: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::random(
            [batch, self.z_dim],
            TensorDistribution::Uniform(0.0, 1.0),
            device,
        )
    }

    pub fn forward(&self, mode: GeneratorMode<B>) -> GeneratorOutput<B> {
        match mode {
            GeneratorMode::Pretrain(sequences) => self.forward_pretrain(sequences),
            GeneratorMode::Adversarial(latent) => self.forward_adversarial(latent),
        }
    }

    /// Teacher-forced pass: step `t` sees the real token `t - 1` (the start token at `t = 0`).
    pub fn forward_pretrain(&self, sequences: Tensor<B, 2, Int>) -> GeneratorOutput<B> {
        let [batch, _] = sequences.dims();
        let inputs = self.embed(self.shift_right(sequences));
        self.unroll(batch, Drive::Forced(inputs))
    }

    pub fn forward_adversarial(&self, latent: Tensor<B, 2>) -> GeneratorOutput<B> {
        let [batch, _] = latent.dims();
        let first_input = self.latent.forward(latent);
        self.unroll(batch, Drive::Free(first_input))
    }

    pub fn sample_from_latent(&self, latent: Tensor<B, 2>) -> Tensor<B, 2, Int> {
        self.forward_adversarial(latent).tokens
    }

    fn shift_right(&self, sequences: Tensor<B, 2, Int>) -> Tensor<B, 2, Int> {
        let [batch, length] = sequences.dims();
        let device = sequences.device();
        let start = Tensor::<B, 2, Int>::full([batch, 1], self.start_token as i64, &device);
        if length <= 1 {
            return start;
        }
        Tensor::cat(vec![start, sequences.slice_dim(1, 0..length - 1)], 1)
    }

    /// `softmax(l_soft * logits) · E`: a differentiable stand-in for the argmax embedding.
    fn soft_embedding(&self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        activation::softmax(logits.mul_scalar(self.l_soft), 1).matmul(self.embedding.weight.val())
    }

    fn step(
        &self,
        input: Tensor<B, 2>,
        states: Vec<HiddenMemory<B>>,
    ) -> (Tensor<B, 2>, Vec<HiddenMemory<B>>) {
        let mut layer_input = input;
        let mut next_states = Vec::with_capacity(states.len());
        for (cell, state) in self.cells.iter().zip(states) {
            let state = cell.forward(layer_input, state);
            layer_input = self.dropout.forward(state.hidden());
            next_states.push(state);
        }
        (layer_input, next_states)
    }

    fn unroll(&self, batch: usize, drive: Drive<B>) -> GeneratorOutput<B> {
        let device = self.embedding.weight.val().device();
        let length = self.sequence_length;

        let mut states: Vec<HiddenMemory<B>> = self
            .cells
            .iter()
            .map(|_| HiddenMemory::zeros(batch, self.rnn_size, &device))
            .collect();
        let mut feedback = match &drive {
            Drive::Free(first) => first.clone(),
            Drive::Forced(_) => Tensor::zeros([batch, self.embedding_size], &device),
        };

        let mut logits_steps = Vec::with_capacity(length);
        let mut embedded_steps = Vec::with_capacity(length);

        for t in 0..length {
            let input = match &drive {
                Drive::Forced(inputs) => inputs.clone().slice_dim(1, t..t + 1).squeeze::<2>(1),
                Drive::Free(_) => feedback,
            };

            let (hidden, next_states) = self.step(input, states);
            states = next_states;

            let logits = self.output.forward(hidden);
            feedback = self.soft_embedding(logits.clone());

            embedded_steps.push(feedback.clone());
            logits_steps.push(logits);
        }

        let logits = Tensor::stack::<3>(logits_steps, 1);
        let probs = activation::softmax(logits.clone(), 2);
        let tokens = logits.clone().argmax(2).squeeze::<2>(2);

        GeneratorOutput {
            logits,
            probs,
            tokens,
            embedded: Tensor::stack::<3>(embedded_steps, 1),
        }
    }
}
