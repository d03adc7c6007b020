use anyhow::{Result, anyhow};

#[derive(Clone, Debug, PartialEq)]
pub struct TargetLstmConfig {
    pub vocab_size: usize,
    pub batch_size: usize,
    pub emb_dim: usize,
    pub hidden_dim: usize,
    pub sequence_length: usize,
    pub start_token: usize,
}

impl Default for TargetLstmConfig {
    fn default() -> Self {
        Self {
            vocab_size: 5000,
            batch_size: 64,
            emb_dim: 32,
            hidden_dim: 32,
            sequence_length: 20,
            start_token: 0,
        }
    }
}

impl TargetLstmConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("vocab_size", self.vocab_size)?;
        require_positive("batch_size", self.batch_size)?;
        require_positive("emb_dim", self.emb_dim)?;
        require_positive("hidden_dim", self.hidden_dim)?;
        require_positive("sequence_length", self.sequence_length)?;
        if self.start_token >= self.vocab_size {
            return Err(anyhow!(
                "start token {} outside vocabulary of size {}",
                self.start_token,
                self.vocab_size
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorConfig {
    pub vocab_size: usize,
    pub embedding_size: usize,
    pub rnn_size: usize,
    pub rnn_depth: usize,
    pub z_dim: usize,
    pub sequence_length: usize,
    pub start_token: usize,
    pub dropout: f64,
    pub forget_gate_bias: f32,
    /// Inverse temperature of the soft-argmax feeding generated embeddings back in.
    pub l_soft: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            vocab_size: 5000,
            embedding_size: 32,
            rnn_size: 32,
            rnn_depth: 1,
            z_dim: 32,
            sequence_length: 20,
            start_token: 0,
            dropout: 0.5,
            forget_gate_bias: 1.0,
            l_soft: 10_000.0,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("vocab_size", self.vocab_size)?;
        require_positive("embedding_size", self.embedding_size)?;
        require_positive("rnn_size", self.rnn_size)?;
        require_positive("rnn_depth", self.rnn_depth)?;
        require_positive("z_dim", self.z_dim)?;
        require_positive("sequence_length", self.sequence_length)?;
        if self.start_token >= self.vocab_size {
            return Err(anyhow!(
                "start token {} outside vocabulary of size {}",
                self.start_token,
                self.vocab_size
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(anyhow!("dropout {} must lie in [0, 1)", self.dropout));
        }
        if !(self.l_soft.is_finite() && self.l_soft > 0.0) {
            return Err(anyhow!("l_soft {} must be finite and positive", self.l_soft));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiscriminatorConfig {
    pub embedding_size: usize,
    pub sequence_length: usize,
    pub conv_spatials: Vec<usize>,
    pub conv_depths: Vec<usize>,
    pub dropout: f64,
    pub label_dim: usize,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            embedding_size: 32,
            sequence_length: 20,
            conv_spatials: vec![2, 2, 2, 2],
            conv_depths: vec![32, 32, 32, 32],
            dropout: 0.5,
            label_dim: 1,
        }
    }
}

impl DiscriminatorConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("embedding_size", self.embedding_size)?;
        require_positive("sequence_length", self.sequence_length)?;
        require_positive("label_dim", self.label_dim)?;
        if self.conv_spatials.is_empty() {
            return Err(anyhow!("discriminator needs at least one convolution"));
        }
        if self.conv_spatials.len() != self.conv_depths.len() {
            return Err(anyhow!(
                "conv_spatials ({}) and conv_depths ({}) must have the same length",
                self.conv_spatials.len(),
                self.conv_depths.len()
            ));
        }
        if let Some(idx) = self.conv_spatials.iter().position(|&k| k == 0) {
            return Err(anyhow!("conv_spatials[{idx}] must be at least 1"));
        }
        if let Some(idx) = self.conv_depths.iter().position(|&d| d == 0) {
            return Err(anyhow!("conv_depths[{idx}] must be at least 1"));
        }
        let shrink: usize = self.conv_spatials.iter().map(|k| k - 1).sum();
        if shrink >= self.sequence_length {
            return Err(anyhow!(
                "convolution stack shrinks sequences by {shrink}, more than length {} allows",
                self.sequence_length
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(anyhow!("dropout {} must lie in [0, 1)", self.dropout));
        }
        Ok(())
    }

    pub fn pooled_length(&self) -> usize {
        self.sequence_length - self.conv_spatials.iter().map(|k| k - 1).sum::<usize>()
    }
}

fn require_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(anyhow!("{name} must be positive"));
    }
    Ok(())
}
