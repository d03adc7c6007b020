use burn::module::Module;
use burn::tensor::backend::Backend as BackendTrait;
use burn::tensor::{Int, Tensor, TensorData};
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use burn_seqgan::{DiscriminatorConfig, GeneratorConfig, GeneratorMode, TextGan};

type Backend = NdArray<f32>;
type TrainBackend = Autodiff<NdArray<f32>>;

const BATCH: usize = 3;

fn generator_config() -> GeneratorConfig {
    GeneratorConfig {
        vocab_size: 7,
        embedding_size: 4,
        rnn_size: 5,
        rnn_depth: 2,
        z_dim: 3,
        sequence_length: 6,
        start_token: 0,
        ..GeneratorConfig::default()
    }
}

fn discriminator_config() -> DiscriminatorConfig {
    DiscriminatorConfig {
        embedding_size: 4,
        sequence_length: 6,
        conv_spatials: vec![2, 3],
        conv_depths: vec![8, 6],
        ..DiscriminatorConfig::default()
    }
}

fn sequences<B: BackendTrait>(device: &B::Device) -> Tensor<B, 2, Int> {
    let values: Vec<i64> = (0..BATCH * 6).map(|idx| (idx * 5 % 7) as i64).collect();
    Tensor::from_data(TensorData::new(values, [BATCH, 6]), device)
}

fn values_f32<B: BackendTrait, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .expect("float values")
}

fn build<B: BackendTrait>(seed: u64) -> (TextGan<B>, B::Device) {
    B::seed(seed);
    let device = B::Device::default();
    let gan = TextGan::<B>::new(&generator_config(), &discriminator_config(), &device)
        .expect("textgan");
    (gan, device)
}

fn assert_close(left: &[f32], right: &[f32]) {
    assert_eq!(left.len(), right.len());
    for (a, b) in left.iter().zip(right.iter()) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }
}

#[test]
fn forward_shapes() {
    let (gan, device) = build::<Backend>(0);
    let latent = gan.generator.latent_prior(BATCH, &device);
    let output = gan.forward(sequences(&device), latent);

    assert_eq!(output.pretrain.logits.dims(), [BATCH, 6, 7]);
    assert_eq!(output.pretrain.probs.dims(), [BATCH, 6, 7]);
    assert_eq!(output.pretrain.tokens.dims(), [BATCH, 6]);
    assert_eq!(output.adversarial.logits.dims(), [BATCH, 6, 7]);
    assert_eq!(output.adversarial.embedded.dims(), [BATCH, 6, 4]);
    assert_eq!(output.embedded_real.dims(), [BATCH, 6, 4]);
    assert_eq!(output.real.logits.dims(), [BATCH, 1]);
    assert_eq!(output.fake.probs.dims(), [BATCH, 1]);

    for prob in values_f32(output.fake.probs) {
        assert!((0.0..=1.0).contains(&prob));
    }
}

#[test]
fn real_and_fake_passes_share_one_discriminator() {
    let (gan, device) = build::<Backend>(1);

    assert_eq!(
        gan.num_params(),
        gan.generator.num_params() + gan.discriminator.num_params()
    );

    let latent = gan.generator.latent_prior(BATCH, &device);
    let output = gan.forward(sequences(&device), latent);

    let real = gan
        .discriminator
        .forward(gan.generator.embed(sequences(&device)));
    let fake = gan.discriminator.forward(output.adversarial.embedded.clone());

    assert_close(&values_f32(output.real.logits), &values_f32(real.logits));
    assert_close(&values_f32(output.fake.logits), &values_f32(fake.logits));
}

#[test]
fn adversarial_losses_are_consistent() {
    let (gan, device) = build::<Backend>(2);
    let latent = gan.generator.latent_prior(BATCH, &device);
    let losses = gan.forward(sequences(&device), latent).adversarial_losses();

    let real_d = values_f32(losses.real_d)[0];
    let fake_d = values_f32(losses.fake_d)[0];
    let d = values_f32(losses.d)[0];
    let g = values_f32(losses.g)[0];

    assert!(real_d >= 0.0 && fake_d >= 0.0 && g >= 0.0);
    assert!((d - (real_d + fake_d)).abs() < 1e-5);
}

#[test]
fn pretrain_loss_is_bounded_at_initialisation() {
    let (gan, device) = build::<Backend>(3);
    let latent = gan.generator.latent_prior(BATCH, &device);
    let output = gan.forward(sequences(&device), latent);

    let loss = values_f32(output.pretrain_generator_loss())[0];
    // Small random weights keep predictions near uniform over 7 tokens.
    assert!(loss > 0.0 && loss < 2.0 * 7.0f32.ln(), "{loss}");

    let half = Tensor::<Backend, 2>::ones([BATCH, 6], &device).mul_scalar(0.5);
    let masked = values_f32(output.pretrain_generator_loss_masked(half))[0];
    assert!((masked - loss).abs() < 1e-5);
}

#[test]
fn pretrain_mode_is_causal() {
    let (gan, device) = build::<Backend>(4);
    let base = sequences::<Backend>(&device);

    let mut altered: Vec<i64> = base
        .clone()
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .expect("ints");
    for row in 0..BATCH {
        altered[row * 6 + 5] = (altered[row * 6 + 5] + 1) % 7;
    }
    let altered = Tensor::<Backend, 2, Int>::from_data(TensorData::new(altered, [BATCH, 6]), &device);

    let original = gan.generator.forward(GeneratorMode::Pretrain(base)).logits;
    let changed = gan.generator.forward(GeneratorMode::Pretrain(altered)).logits;

    // The last target token is never fed back in, so no step sees the change.
    assert_close(&values_f32(original), &values_f32(changed));
}

#[test]
fn latent_samples_stay_in_vocabulary() {
    let (gan, device) = build::<Backend>(5);
    let latent = gan.generator.latent_prior(BATCH, &device);
    for value in values_f32(latent.clone()) {
        assert!((0.0..1.0).contains(&value));
    }

    let tokens = gan
        .generator
        .sample_from_latent(latent)
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .expect("ints");
    assert_eq!(tokens.len(), BATCH * 6);
    assert!(tokens.iter().all(|token| (0..7).contains(token)));
}

#[test]
fn pretrain_discriminator_loss_uses_labels() {
    let (gan, device) = build::<Backend>(6);
    let labels = Tensor::<Backend, 2, Int>::from_data(
        TensorData::new(vec![1i64, 0, 1], [BATCH, 1]),
        &device,
    );
    let loss = values_f32(gan.pretrain_discriminator_loss(sequences(&device), labels))[0];
    assert!(loss.is_finite() && loss > 0.0);
}

#[test]
fn generator_loss_reaches_embeddings_through_soft_path() {
    let (gan, device) = build::<TrainBackend>(7);
    let latent = gan.generator.latent_prior(BATCH, &device);

    // Only the adversarial branch feeds `g`, so any embedding gradient
    // must have flowed through the soft-argmax feedback.
    let output = gan.forward(sequences(&device), latent);
    let grads = output.adversarial_losses().g.backward();

    let grad = gan
        .generator
        .embedding_weight()
        .grad(&grads)
        .expect("embedding gradient");
    assert_eq!(grad.dims(), [7, 4]);
    let magnitude: f32 = values_f32(grad).iter().map(|v| v.abs()).sum();
    assert!(magnitude > 0.0);
}

#[test]
fn mismatched_configs_are_rejected() {
    let device = <Backend as BackendTrait>::Device::default();

    let wide = DiscriminatorConfig {
        embedding_size: 8,
        ..discriminator_config()
    };
    let err = TextGan::<Backend>::new(&generator_config(), &wide, &device).expect_err("width");
    assert!(err.to_string().contains("discriminator expects 8"));

    let long = DiscriminatorConfig {
        sequence_length: 9,
        ..discriminator_config()
    };
    assert!(TextGan::<Backend>::new(&generator_config(), &long, &device).is_err());

    let bad_dropout = GeneratorConfig {
        dropout: 1.0,
        ..generator_config()
    };
    assert!(TextGan::<Backend>::new(&bad_dropout, &discriminator_config(), &device).is_err());
}
