use burn::LearningRate;
use burn::optim::{GradientsParams, Optimizer, RmsPropConfig};
use burn::tensor::backend::Backend as BackendTrait;
use burn::tensor::{Int, Tensor, TensorData};
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use burn_seqgan::{DiscriminatorConfig, GeneratorConfig, TextGan};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

fn training_step_bench(c: &mut Criterion) {
    type Backend = Autodiff<NdArray<f32>>;
    <Backend as BackendTrait>::seed(24);
    let device = <Backend as BackendTrait>::Device::default();

    let generator_config = GeneratorConfig {
        vocab_size: 500,
        ..GeneratorConfig::default()
    };
    let discriminator_config = DiscriminatorConfig::default();
    let base_model = TextGan::<Backend>::new(&generator_config, &discriminator_config, &device)
        .expect("textgan");

    let batch_size = 16;
    let length = generator_config.sequence_length;
    let tokens: Vec<i64> = (0..(batch_size * length))
        .map(|idx| (idx * 7 % generator_config.vocab_size) as i64)
        .collect();
    let sequences =
        Tensor::<Backend, 2, Int>::from_data(TensorData::new(tokens, [batch_size, length]), &device);
    let latent = base_model.generator.latent_prior(batch_size, &device);

    let optimizer_config = RmsPropConfig::new();
    let lr: LearningRate = 2e-4;

    c.bench_function("textgan_pretrain_generator_step", |b| {
        b.iter_batched(
            || {
                let model = base_model.clone();
                let optimizer = optimizer_config.init::<Backend, TextGan<Backend>>();
                (model, optimizer)
            },
            |(mut model, mut optimizer)| {
                let output = model.forward(sequences.clone(), latent.clone());
                let loss = output.pretrain_generator_loss();
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("textgan_adversarial_step", |b| {
        b.iter_batched(
            || {
                let model = base_model.clone();
                let optimizer = optimizer_config.init::<Backend, TextGan<Backend>>();
                (model, optimizer)
            },
            |(mut model, mut optimizer)| {
                let losses = model
                    .forward(sequences.clone(), latent.clone())
                    .adversarial_losses();
                let loss = losses.d + losses.g;
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(lr, model, grads);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, training_step_bench);
criterion_main!(benches);
