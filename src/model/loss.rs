use burn::nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, activation};

const WEIGHT_EPSILON: f32 = 1e-12;

pub fn language_model_loss<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch, time, vocab] = logits.shape().dims();

    let logits_flat = logits.reshape([batch * time, vocab]);
    let targets_flat = targets.reshape([batch * time]);

    let device = logits_flat.device();
    CrossEntropyLossConfig::new()
        .init::<B>(&device)
        .forward(logits_flat, targets_flat)
}

/// Weighted token cross-entropy averaged over both timesteps and batch:
/// `sum(w * ce) / sum(w)`.
pub fn sequence_loss<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let token_nll = activation::log_softmax(logits, 2)
        .gather(2, targets.unsqueeze_dim::<3>(2))
        .squeeze::<2>(2)
        .neg();

    let total_weight = weights.clone().sum().add_scalar(WEIGHT_EPSILON);
    (token_nll * weights).sum().div(total_weight)
}

pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let device = logits.device();
    BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init::<B>(&device)
        .forward(logits, labels)
}

/// Discriminator terms of the non-saturating GAN objective.
#[derive(Debug, Clone)]
pub struct DiscriminatorLosses<B: Backend> {
    pub real: Tensor<B, 1>,
    pub fake: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

/// `BCE(D(real), 1) + BCE(D(fake), 0)`.
pub fn discriminator_adversarial_loss<B: Backend>(
    real_logits: Tensor<B, 2>,
    fake_logits: Tensor<B, 2>,
) -> DiscriminatorLosses<B> {
    let ones = Tensor::<B, 2, Int>::ones(real_logits.dims(), &real_logits.device());
    let zeros = Tensor::<B, 2, Int>::zeros(fake_logits.dims(), &fake_logits.device());

    let real = binary_cross_entropy_with_logits(real_logits, ones);
    let fake = binary_cross_entropy_with_logits(fake_logits, zeros);
    DiscriminatorLosses {
        total: real.clone() + fake.clone(),
        real,
        fake,
    }
}

/// `BCE(D(fake), 1)`: the generator is pushed to make fakes look real.
pub fn generator_adversarial_loss<B: Backend>(fake_logits: Tensor<B, 2>) -> Tensor<B, 1> {
    let ones = Tensor::<B, 2, Int>::ones(fake_logits.dims(), &fake_logits.device());
    binary_cross_entropy_with_logits(fake_logits, ones)
}
