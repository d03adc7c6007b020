use anyhow::{Result, anyhow};
use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData, activation};

use crate::sampling::{TokenSampler, sample_rows};

use super::config::TargetLstmConfig;
use super::lstm::{Gate, HiddenMemory, LstmCell, OutputProjection};
use super::params::TargetParams;

#[derive(Module, Debug)]
pub struct TargetLstm<B: Backend> {
    vocab_size: usize,
    batch_size: usize,
    emb_dim: usize,
    hidden_dim: usize,
    sequence_length: usize,
    start_token: usize,
    embeddings: Param<Tensor<B, 2>>,
    cell: LstmCell<B>,
    output: OutputProjection<B>,
}

#[derive(Debug, Clone)]
pub struct Generation<B: Backend> {
    pub tokens: Tensor<B, 2, Int>,
    pub probs: Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub struct TeacherForcedScore<B: Backend> {
    /// Softmax rows, `[batch, sequence_length, vocab]`.
    pub predictions: Tensor<B, 3>,
    /// Mean per-token cross-entropy, shape `[1]`.
    pub pretrain_loss: Tensor<B, 1>,
    /// Summed cross-entropy per sequence, shape `[batch]`.
    pub out_loss: Tensor<B, 1>,
}

impl<B: Backend> TargetLstm<B> {
    pub fn from_params(
        config: &TargetLstmConfig,
        params: &TargetParams,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        params.validate(config)?;

        let arrays = params.arrays();
        let gate = |offset: usize| {
            Gate::from_tensors(
                arrays[offset].to_tensor::<B, 2>(device),
                arrays[offset + 1].to_tensor::<B, 2>(device),
                arrays[offset + 2].to_tensor::<B, 1>(device),
            )
        };
        let cell = LstmCell::from_gates(gate(1), gate(4), gate(7), gate(10));
        let output = OutputProjection::from_tensors(
            arrays[13].to_tensor::<B, 2>(device),
            arrays[14].to_tensor::<B, 1>(device),
        );

        let model = Self {
            vocab_size: config.vocab_size,
            batch_size: config.batch_size,
            emb_dim: config.emb_dim,
            hidden_dim: config.hidden_dim,
            sequence_length: config.sequence_length,
            start_token: config.start_token,
            embeddings: Param::from_tensor(arrays[0].to_tensor::<B, 2>(device)),
            cell,
            output,
        };

        Ok(model.no_grad())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    fn device(&self) -> B::Device {
        self.embeddings.val().device()
    }

    fn embed(&self, tokens: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.embeddings.val().select(0, tokens)
    }

    fn start_input(&self, device: &B::Device) -> Tensor<B, 2> {
        let start = Tensor::<B, 1, Int>::full([self.batch_size], self.start_token as i64, device);
        self.embed(start)
    }

    pub fn generate<S: TokenSampler + ?Sized>(&self, sampler: &mut S) -> Result<Generation<B>> {
        let device = self.device();
        let batch = self.batch_size;
        let length = self.sequence_length;

        let mut state = HiddenMemory::zeros(batch, self.hidden_dim, &device);
        let mut input = self.start_input(&device);
        let mut tokens = vec![0i64; batch * length];
        let mut chosen_probs = Vec::with_capacity(length);

        for step in 0..length {
            state = self.cell.forward(input, state);
            let logits = self.output.forward(state.hidden());
            let probs = activation::log_softmax(logits, 1).exp();

            let rows = probs
                .to_data()
                .convert::<f32>()
                .into_vec::<f32>()
                .map_err(|err| anyhow!("{err:?}"))?;
            let next = sample_rows(sampler, &rows, self.vocab_size)?;
            for (row, token) in next.iter().enumerate() {
                tokens[row * length + step] = *token;
            }

            let next_tokens = Tensor::<B, 1, Int>::from_data(TensorData::new(next, [batch]), &device);
            chosen_probs.push(probs.gather(1, next_tokens.clone().reshape([batch, 1])));
            input = self.embed(next_tokens);
        }

        Ok(Generation {
            tokens: Tensor::from_data(TensorData::new(tokens, [batch, length]), &device),
            probs: Tensor::cat(chosen_probs, 1),
        })
    }

    fn log_predictions(&self, sequences: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let device = self.device();
        let batch = self.batch_size;
        let length = self.sequence_length;

        let embedded = self
            .embed(sequences.reshape([batch * length]))
            .reshape([batch, length, self.emb_dim]);

        let mut state = HiddenMemory::zeros(batch, self.hidden_dim, &device);
        let mut input = self.start_input(&device);
        let mut steps = Vec::with_capacity(length);

        for step in 0..length {
            state = self.cell.forward(input, state);
            steps.push(activation::log_softmax(self.output.forward(state.hidden()), 1));
            input = embedded.clone().slice_dim(1, step..step + 1).squeeze::<2>(1);
        }

        Tensor::stack::<3>(steps, 1)
    }

    /// Score `sequences` (`[batch, sequence_length]`, no start token) under teacher forcing.
    pub fn score(&self, sequences: Tensor<B, 2, Int>) -> Result<TeacherForcedScore<B>> {
        let dims = sequences.dims();
        if dims != [self.batch_size, self.sequence_length] {
            return Err(anyhow!(
                "expected sequences of shape [{}, {}], got {dims:?}",
                self.batch_size,
                self.sequence_length
            ));
        }
        let values = sequences
            .to_data()
            .convert::<i64>()
            .into_vec::<i64>()
            .map_err(|err| anyhow!("{err:?}"))?;
        if let Some(token) = values
            .iter()
            .find(|&&token| token < 0 || token >= self.vocab_size as i64)
        {
            return Err(anyhow!(
                "token {token} outside vocabulary of size {}",
                self.vocab_size
            ));
        }

        let log_probs = self.log_predictions(sequences.clone());
        let token_nll = log_probs
            .clone()
            .gather(2, sequences.unsqueeze_dim::<3>(2))
            .squeeze::<2>(2)
            .neg();

        let pretrain_loss = token_nll
            .clone()
            .sum()
            .div_scalar((self.sequence_length * self.batch_size) as f32);
        let out_loss = token_nll.sum_dim(1).squeeze::<1>(1);

        Ok(TeacherForcedScore {
            predictions: log_probs.exp(),
            pretrain_loss,
            out_loss,
        })
    }

    pub fn nll(&self, sequences: Tensor<B, 2, Int>) -> Result<f32> {
        let score = self.score(sequences)?;
        let values = score
            .out_loss
            .mean()
            .div_scalar(self.sequence_length as f32)
            .to_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .map_err(|err| anyhow!("{err:?}"))?;
        values
            .first()
            .copied()
            .ok_or_else(|| anyhow!("empty nll tensor"))
    }
}
