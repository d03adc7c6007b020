#![recursion_limit = "512"]

pub mod config;
pub mod early_stopping;
pub mod logging;
pub mod model;
pub mod sampling;

pub use config::{
    DiscriminatorOverrides, ExperimentConfig, GenerationConfig, GeneratorOverrides,
    OptimizerConfig, OptimizerKind, TargetSection, TrainingHyperparameters,
    build_discriminator_config, build_generator_config, build_target_config,
    load_experiment_config,
};
pub use early_stopping::EarlyStopping;
pub use model::{
    AdversarialLosses, Discriminator, DiscriminatorConfig, DiscriminatorOutput, Generation,
    Generator, GeneratorConfig, GeneratorMode, GeneratorOutput, HiddenMemory, LstmCell,
    TargetLstm, TargetLstmConfig, TargetParams, TeacherForcedScore, TextGan, TextGanOutput,
    language_model_loss, sequence_loss,
};
pub use sampling::{SeededSampler, TokenSampler, sample_rows};
