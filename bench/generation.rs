use burn::tensor::backend::Backend as BackendTrait;
use burn_ndarray::NdArray;
use burn_seqgan::{
    Generator, GeneratorConfig, SeededSampler, TargetLstm, TargetLstmConfig, TargetParams,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

#[derive(Clone, Copy)]
struct GenerationCase {
    name: &'static str,
    batch: usize,
    vocab: usize,
    length: usize,
}

const GENERATION_CASES: &[GenerationCase] = &[
    GenerationCase {
        name: "b16_v500_t20",
        batch: 16,
        vocab: 500,
        length: 20,
    },
    GenerationCase {
        name: "b64_v5000_t20",
        batch: 64,
        vocab: 5000,
        length: 20,
    },
];

fn oracle_generation_bench(c: &mut Criterion) {
    type Backend = NdArray<f32>;
    <Backend as BackendTrait>::seed(42);
    let device = <Backend as BackendTrait>::Device::default();

    for case in GENERATION_CASES {
        let config = TargetLstmConfig {
            vocab_size: case.vocab,
            batch_size: case.batch,
            sequence_length: case.length,
            ..TargetLstmConfig::default()
        };
        let params = TargetParams::random(&config, 7);
        let target = TargetLstm::<Backend>::from_params(&config, &params, &device)
            .expect("oracle parameters");
        let mut sampler = SeededSampler::new(7);

        c.bench_with_input(
            BenchmarkId::new("oracle_generate", case.name),
            case,
            |b, _| {
                b.iter(|| {
                    let _ = target.generate(&mut sampler).expect("generate");
                });
            },
        );
    }
}

fn generator_sampling_bench(c: &mut Criterion) {
    type Backend = NdArray<f32>;
    <Backend as BackendTrait>::seed(43);
    let device = <Backend as BackendTrait>::Device::default();

    for case in GENERATION_CASES {
        let config = GeneratorConfig {
            vocab_size: case.vocab,
            sequence_length: case.length,
            ..GeneratorConfig::default()
        };
        let generator = Generator::<Backend>::new(&config, &device).expect("generator");
        let latent = generator.latent_prior(case.batch, &device);

        c.bench_with_input(
            BenchmarkId::new("generator_sample_from_latent", case.name),
            case,
            |b, _| {
                b.iter(|| {
                    let _ = generator.sample_from_latent(latent.clone());
                });
            },
        );
    }
}

criterion_group!(benches, oracle_generation_bench, generator_sampling_bench);
criterion_main!(benches);
