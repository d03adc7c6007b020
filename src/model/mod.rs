mod config;
mod discriminator;
mod generator;
mod loss;
mod lstm;
mod params;
mod target;
mod textgan;

pub use config::{DiscriminatorConfig, GeneratorConfig, TargetLstmConfig};
pub use discriminator::{Discriminator, DiscriminatorOutput};
pub use generator::{Generator, GeneratorMode, GeneratorOutput};
pub use loss::{
    DiscriminatorLosses, binary_cross_entropy_with_logits, discriminator_adversarial_loss,
    generator_adversarial_loss, language_model_loss, sequence_loss,
};
pub use lstm::{Gate, HiddenMemory, LstmCell, OutputProjection};
pub use params::{ParamArray, TARGET_PARAM_COUNT, TargetParams};
pub use target::{Generation, TargetLstm, TeacherForcedScore};
pub use textgan::{AdversarialLosses, TextGan, TextGanOutput};
