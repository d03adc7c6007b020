use anyhow::{Result, anyhow};
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::config::{DiscriminatorConfig, GeneratorConfig};
use super::discriminator::{Discriminator, DiscriminatorOutput};
use super::generator::{Generator, GeneratorOutput};
use super::loss::{
    DiscriminatorLosses, binary_cross_entropy_with_logits, discriminator_adversarial_loss,
    generator_adversarial_loss, sequence_loss,
};

/// RNN generator and CNN discriminator trained against each other.
///
/// The discriminator is held once and borrowed for both the real and the
/// fake pass, so the two passes always read the same weights.
#[derive(Module, Debug)]
pub struct TextGan<B: Backend> {
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
}

#[derive(Debug, Clone)]
pub struct TextGanOutput<B: Backend> {
    pub targets: Tensor<B, 2, Int>,
    pub pretrain: GeneratorOutput<B>,
    pub adversarial: GeneratorOutput<B>,
    pub embedded_real: Tensor<B, 3>,
    pub real: DiscriminatorOutput<B>,
    pub fake: DiscriminatorOutput<B>,
}

#[derive(Debug, Clone)]
pub struct AdversarialLosses<B: Backend> {
    pub real_d: Tensor<B, 1>,
    pub fake_d: Tensor<B, 1>,
    pub d: Tensor<B, 1>,
    pub g: Tensor<B, 1>,
}

impl<B: Backend> TextGan<B> {
    pub fn new(
        generator: &GeneratorConfig,
        discriminator: &DiscriminatorConfig,
        device: &B::Device,
    ) -> Result<Self> {
        if generator.embedding_size != discriminator.embedding_size {
            return Err(anyhow!(
                "generator embeds into {} dims but the discriminator expects {}",
                generator.embedding_size,
                discriminator.embedding_size
            ));
        }
        if generator.sequence_length != discriminator.sequence_length {
            return Err(anyhow!(
                "generator emits {} steps but the discriminator expects {}",
                generator.sequence_length,
                discriminator.sequence_length
            ));
        }

        Ok(Self {
            generator: Generator::new(generator, device)?,
            discriminator: Discriminator::new(discriminator, device)?,
        })
    }

    pub fn forward(&self, sequences: Tensor<B, 2, Int>, latent: Tensor<B, 2>) -> TextGanOutput<B> {
        let pretrain = self.generator.forward_pretrain(sequences.clone());
        let adversarial = self.generator.forward_adversarial(latent);
        let embedded_real = self.generator.embed(sequences.clone());

        let real = self.discriminator.forward(embedded_real.clone());
        let fake = self.discriminator.forward(adversarial.embedded.clone());

        TextGanOutput {
            targets: sequences,
            pretrain,
            adversarial,
            embedded_real,
            real,
            fake,
        }
    }

    /// Supervised discriminator loss on labelled sequences (`labels` is `[batch, label_dim]`).
    pub fn pretrain_discriminator_loss(
        &self,
        sequences: Tensor<B, 2, Int>,
        labels: Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        let scored = self.discriminator.forward(self.generator.embed(sequences));
        binary_cross_entropy_with_logits(scored.logits, labels)
    }
}

impl<B: Backend> TextGanOutput<B> {
    pub fn adversarial_losses(&self) -> AdversarialLosses<B> {
        let DiscriminatorLosses { real, fake, total } =
            discriminator_adversarial_loss(self.real.logits.clone(), self.fake.logits.clone());
        AdversarialLosses {
            real_d: real,
            fake_d: fake,
            d: total,
            g: generator_adversarial_loss(self.fake.logits.clone()),
        }
    }

    pub fn pretrain_generator_loss(&self) -> Tensor<B, 1> {
        let weights = self.targets.clone().ones_like().float();
        self.pretrain_generator_loss_masked(weights)
    }

    pub fn pretrain_generator_loss_masked(&self, weights: Tensor<B, 2>) -> Tensor<B, 1> {
        sequence_loss(self.pretrain.logits.clone(), self.targets.clone(), weights)
    }
}
