use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;

use crate::model::{DiscriminatorConfig, GeneratorConfig, TargetLstmConfig};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TargetSection {
    pub vocab_size: usize,
    pub emb_dim: usize,
    pub hidden_dim: usize,
    pub sequence_length: usize,
    #[serde(default)]
    pub start_token: usize,
    /// JSON parameter blob; random N(0, 1) parameters are drawn when absent.
    #[serde(default)]
    pub params_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct GeneratorOverrides {
    pub embedding_size: Option<usize>,
    pub rnn_size: Option<usize>,
    pub rnn_depth: Option<usize>,
    pub z_dim: Option<usize>,
    pub dropout: Option<f64>,
    pub forget_gate_bias: Option<f32>,
    pub l_soft: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct DiscriminatorOverrides {
    pub conv_spatials: Option<Vec<usize>>,
    pub conv_depths: Option<Vec<usize>>,
    pub dropout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrainingHyperparameters {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub batch_size: usize,
    pub epoch_pretrain: usize,
    pub epoch_train: usize,
    pub batches_per_epoch: usize,
    #[serde(default = "default_iters_per_batch")]
    pub d_iters_per_batch: usize,
    #[serde(default = "default_iters_per_batch")]
    pub g_iters_per_batch: usize,
    pub log_frequency: usize,
    /// Batches between mid-epoch oracle NLL evaluations; 0 evaluates at epoch end only.
    #[serde(default)]
    pub evaluate_every: usize,
    /// Adversarial epochs without oracle NLL improvement before stopping; 0 disables.
    #[serde(default)]
    pub early_stopping: usize,
    pub checkpoint_every: usize,
    pub checkpoint_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    RmsProp,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OptimizerConfig {
    pub name: OptimizerKind,
    pub learning_rate_g: f64,
    pub learning_rate_d: f64,
    #[serde(default)]
    pub l2_lambda_g: f32,
    #[serde(default)]
    pub l2_lambda_d: f32,
    /// Per-epoch multiplicative learning rate decay.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_num_batches")]
    pub num_batches: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_batches: default_num_batches(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    pub target: TargetSection,
    #[serde(default)]
    pub generator: GeneratorOverrides,
    #[serde(default)]
    pub discriminator: DiscriminatorOverrides,
    pub training: TrainingHyperparameters,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

pub fn load_experiment_config(paths: &[PathBuf]) -> Result<ExperimentConfig> {
    if paths.is_empty() {
        return Err(anyhow!("at least one configuration path is required"));
    }

    let mut iter = paths.iter();
    let first_path = iter
        .next()
        .ok_or_else(|| anyhow!("configuration iterator unexpectedly empty"))?;
    let mut value = load_value(first_path)?;

    for path in iter {
        let overlay = load_value(path)?;
        merge_values(&mut value, overlay);
    }

    value
        .try_into::<ExperimentConfig>()
        .map_err(|err| anyhow!(err))
}

pub fn build_target_config(config: &ExperimentConfig) -> TargetLstmConfig {
    TargetLstmConfig {
        vocab_size: config.target.vocab_size,
        batch_size: config.training.batch_size,
        emb_dim: config.target.emb_dim,
        hidden_dim: config.target.hidden_dim,
        sequence_length: config.target.sequence_length,
        start_token: config.target.start_token,
    }
}

/// Generator defaults sized to the oracle's vocabulary and sequence length, then overridden.
pub fn build_generator_config(config: &ExperimentConfig) -> GeneratorConfig {
    let overrides = &config.generator;
    let mut generator = GeneratorConfig {
        vocab_size: config.target.vocab_size,
        sequence_length: config.target.sequence_length,
        start_token: config.target.start_token,
        ..GeneratorConfig::default()
    };

    if let Some(embedding_size) = overrides.embedding_size {
        generator.embedding_size = embedding_size;
    }
    if let Some(rnn_size) = overrides.rnn_size {
        generator.rnn_size = rnn_size;
    }
    if let Some(rnn_depth) = overrides.rnn_depth {
        generator.rnn_depth = rnn_depth;
    }
    if let Some(z_dim) = overrides.z_dim {
        generator.z_dim = z_dim;
    }
    if let Some(dropout) = overrides.dropout {
        generator.dropout = dropout;
    }
    if let Some(bias) = overrides.forget_gate_bias {
        generator.forget_gate_bias = bias;
    }
    if let Some(l_soft) = overrides.l_soft {
        generator.l_soft = l_soft;
    }

    generator
}

/// The discriminator reads generator embeddings, so it inherits their width.
pub fn build_discriminator_config(config: &ExperimentConfig) -> DiscriminatorConfig {
    let overrides = &config.discriminator;
    let generator = build_generator_config(config);
    let mut discriminator = DiscriminatorConfig {
        embedding_size: generator.embedding_size,
        sequence_length: generator.sequence_length,
        ..DiscriminatorConfig::default()
    };

    if let Some(spatials) = &overrides.conv_spatials {
        discriminator.conv_spatials = spatials.clone();
    }
    if let Some(depths) = &overrides.conv_depths {
        discriminator.conv_depths = depths.clone();
    }
    if let Some(dropout) = overrides.dropout {
        discriminator.dropout = dropout;
    }

    discriminator
}

fn load_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    let table: toml::value::Table = toml::from_str(&content)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;
    Ok(Value::Table(table))
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn default_seed() -> u64 {
    666_666
}

fn default_iters_per_batch() -> usize {
    1
}

fn default_decay_rate() -> f64 {
    1.0
}

fn default_num_batches() -> usize {
    1
}
