#![recursion_limit = "512"]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};

use burn::LearningRate;
use burn::lr_scheduler::LrScheduler;
use burn::lr_scheduler::exponential::{ExponentialLrScheduler, ExponentialLrSchedulerConfig};
use burn::module::{AutodiffModule, Module};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, RmsPropConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::{AutodiffBackend, Backend as BackendTrait};
use burn::tensor::{Int, Tensor};
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use burn_wgpu::Wgpu;
use tracing::info;

#[cfg(feature = "cuda")]
use burn_cuda::Cuda;

use burn_seqgan::logging::init_logging;
use burn_seqgan::model::discriminator_adversarial_loss;
use burn_seqgan::{
    Discriminator, EarlyStopping, ExperimentConfig, Generator, OptimizerKind, SeededSampler, TargetLstm,
    TargetParams, TextGan, build_discriminator_config, build_generator_config,
    build_target_config, load_experiment_config, sequence_loss,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a TextGAN against the SeqGAN oracle LSTM")]
struct Args {
    /// Additional configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,
    /// Backend to use for training.
    #[arg(long, value_enum, default_value_t = BackendArg::Ndarray)]
    backend: BackendArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    Ndarray,
    Wgpu,
    Cuda,
}

type ValidBackend<B> = <B as AutodiffBackend>::InnerBackend;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let mut config_paths = vec![PathBuf::from("config/base.toml")];
    config_paths.extend(args.config);
    let config = load_experiment_config(&config_paths)?;

    match args.backend {
        BackendArg::Ndarray => train_backend::<Autodiff<NdArray<f32>>>(&config, "ndarray"),
        BackendArg::Wgpu => train_backend::<Autodiff<Wgpu<f32>>>(&config, "wgpu"),
        BackendArg::Cuda => {
            #[cfg(feature = "cuda")]
            {
                train_backend::<Autodiff<Cuda<f32>>>(&config, "cuda")
            }
            #[cfg(not(feature = "cuda"))]
            {
                Err(anyhow!(
                    "cuda backend selected but this build lacks `cuda` feature; rebuild with `--features cuda`"
                ))
            }
        }
    }
}

fn train_backend<B>(config: &ExperimentConfig, backend_name: &str) -> Result<()>
where
    B: AutodiffBackend + 'static,
    B::Device: Clone,
{
    B::seed(config.training.seed);
    let device = B::Device::default();

    let target_config = build_target_config(config);
    let params = match &config.target.params_path {
        Some(path) => TargetParams::load(path)?,
        None => TargetParams::random(&target_config, config.training.seed),
    };
    let target = TargetLstm::<ValidBackend<B>>::from_params(&target_config, &params, &device)
        .context("failed to build the oracle LSTM")?;

    let checkpoint_dir = config.training.checkpoint_dir.join(backend_name);
    fs::create_dir_all(&checkpoint_dir)
        .with_context(|| format!("failed to create {}", checkpoint_dir.display()))?;
    params.save(&checkpoint_dir.join("target_params.json"))?;

    let gan = TextGan::<B>::new(
        &build_generator_config(config),
        &build_discriminator_config(config),
        &device,
    )?;
    info!(
        "[train:{backend_name}] generator params={}, discriminator params={}",
        gan.generator.num_params(),
        gan.discriminator.num_params()
    );

    let optimizer = &config.optimizer;
    let gan = match optimizer.name {
        OptimizerKind::Adam => {
            let optim_g = AdamConfig::new()
                .with_weight_decay(weight_decay(optimizer.l2_lambda_g))
                .init::<B, Generator<B>>();
            let optim_d = AdamConfig::new()
                .with_weight_decay(weight_decay(optimizer.l2_lambda_d))
                .init::<B, Discriminator<B>>();
            run_experiment(config, &checkpoint_dir, &device, gan, &target, optim_g, optim_d)?
        }
        OptimizerKind::RmsProp => {
            let optim_g = RmsPropConfig::new()
                .with_weight_decay(weight_decay(optimizer.l2_lambda_g))
                .init::<B, Generator<B>>();
            let optim_d = RmsPropConfig::new()
                .with_weight_decay(weight_decay(optimizer.l2_lambda_d))
                .init::<B, Discriminator<B>>();
            run_experiment(config, &checkpoint_dir, &device, gan, &target, optim_g, optim_d)?
        }
    };

    info!("Training complete on {backend_name}. Sampling from the generator...");
    let generator = gan.generator.valid();
    let latent = generator.latent_prior(1, &device);
    let tokens = tensor_values_i64(generator.sample_from_latent(latent))?;
    println!("{tokens:?}");

    Ok(())
}

fn weight_decay(lambda: f32) -> Option<WeightDecayConfig> {
    (lambda > 0.0).then(|| WeightDecayConfig::new(lambda))
}

fn lr_scheduler(initial_lr: LearningRate, decay_rate: f64) -> Result<ExponentialLrScheduler> {
    ExponentialLrSchedulerConfig::new(initial_lr, decay_rate)
        .init()
        .map_err(|err| anyhow!("failed to initialize exponential lr scheduler: {err}"))
}

#[allow(clippy::too_many_arguments)]
fn run_experiment<B, OG, OD>(
    config: &ExperimentConfig,
    checkpoint_dir: &Path,
    device: &B::Device,
    mut gan: TextGan<B>,
    target: &TargetLstm<ValidBackend<B>>,
    mut optim_g: OG,
    mut optim_d: OD,
) -> Result<TextGan<B>>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    let training = &config.training;
    let label_dim = build_discriminator_config(config).label_dim;
    let batch = training.batch_size;
    let log_every = training.log_frequency.max(1);
    let evaluate_every = training.evaluate_every;

    let mut sampler = SeededSampler::new(training.seed);
    let mut scheduler_g = lr_scheduler(config.optimizer.learning_rate_g, config.optimizer.decay_rate)?;
    let mut scheduler_d = lr_scheduler(config.optimizer.learning_rate_d, config.optimizer.decay_rate)?;

    for epoch in 0..training.epoch_pretrain {
        let lr_g = scheduler_g.step();
        let lr_d = scheduler_d.step();

        for step in 0..training.batches_per_epoch {
            let real = oracle_batch::<B>(target, &mut sampler)?;

            let output = gan.generator.forward_pretrain(real.clone());
            let loss_g = sequence_loss(output.logits, real.clone(), real.clone().ones_like().float());
            let grads = GradientsParams::from_grads(loss_g.backward(), &gan.generator);
            gan.generator = optim_g.step(lr_g, gan.generator, grads);

            let fake = gan
                .generator
                .sample_from_latent(gan.generator.latent_prior(batch, device));
            let sequences = Tensor::cat(vec![real, fake], 0);
            let labels = Tensor::cat(
                vec![
                    Tensor::<B, 2, Int>::ones([batch, label_dim], device),
                    Tensor::<B, 2, Int>::zeros([batch, label_dim], device),
                ],
                0,
            );
            let loss_d = gan.pretrain_discriminator_loss(sequences, labels);
            let grads = GradientsParams::from_grads(loss_d.backward(), &gan.discriminator);
            gan.discriminator = optim_d.step(lr_d, gan.discriminator, grads);

            if step % log_every == 0 {
                info!(
                    "[pretrain] epoch={epoch} step={step} lr_g={lr_g:.2e} lr_d={lr_d:.2e} \
                     loss_g={:.4} loss_d={:.4}",
                    scalar(loss_g.inner())?,
                    scalar(loss_d.inner())?,
                );
            }
            if evaluate_every > 0 && (step + 1) % evaluate_every == 0 {
                let nll = oracle_nll(&gan, target, device)?;
                info!("[pretrain] epoch={epoch} step={step} oracle_nll={nll:.4}");
            }
        }

        let nll = oracle_nll(&gan, target, device)?;
        info!("[pretrain] epoch={epoch} oracle_nll={nll:.4}");
        maybe_checkpoint(&gan, checkpoint_dir, "pretrain", epoch, training.checkpoint_every)?;
    }

    let mut stopper = EarlyStopping::new(training.early_stopping);
    for epoch in 0..training.epoch_train {
        let lr_g = scheduler_g.step();
        let lr_d = scheduler_d.step();

        for step in 0..training.batches_per_epoch {
            let real = oracle_batch::<B>(target, &mut sampler)?;

            let mut last_d = None;
            for _ in 0..training.d_iters_per_batch {
                let latent = gan.generator.latent_prior(batch, device);
                let fake = gan.generator.forward_adversarial(latent).embedded.detach();
                let real_embedded = gan.generator.embed(real.clone()).detach();
                let losses = discriminator_adversarial_loss(
                    gan.discriminator.forward(real_embedded).logits,
                    gan.discriminator.forward(fake).logits,
                );
                let grads = GradientsParams::from_grads(losses.total.backward(), &gan.discriminator);
                gan.discriminator = optim_d.step(lr_d, gan.discriminator, grads);
                last_d = Some(losses);
            }

            let mut last_g = None;
            for _ in 0..training.g_iters_per_batch {
                let latent = gan.generator.latent_prior(batch, device);
                let losses = gan.forward(real.clone(), latent).adversarial_losses();
                let grads = GradientsParams::from_grads(losses.g.backward(), &gan.generator);
                gan.generator = optim_g.step(lr_g, gan.generator, grads);
                last_g = Some(losses.g);
            }

            if step % log_every == 0 {
                let (real_d, fake_d) = match last_d {
                    Some(losses) => (scalar(losses.real.inner())?, scalar(losses.fake.inner())?),
                    None => (f32::NAN, f32::NAN),
                };
                let loss_g = match last_g {
                    Some(loss) => scalar(loss.inner())?,
                    None => f32::NAN,
                };
                info!(
                    "[adversarial] epoch={epoch} step={step} lr_g={lr_g:.2e} lr_d={lr_d:.2e} \
                     loss_real_d={real_d:.4} loss_fake_d={fake_d:.4} loss_g={loss_g:.4}"
                );
            }
            if evaluate_every > 0 && (step + 1) % evaluate_every == 0 {
                let nll = oracle_nll(&gan, target, device)?;
                info!("[adversarial] epoch={epoch} step={step} oracle_nll={nll:.4}");
            }
        }

        let nll = oracle_nll(&gan, target, device)?;
        info!("[adversarial] epoch={epoch} oracle_nll={nll:.4}");
        maybe_checkpoint(&gan, checkpoint_dir, "adversarial", epoch, training.checkpoint_every)?;
        if stopper.observe(nll) {
            info!(
                "[adversarial] early stop after epoch={epoch}: no oracle_nll improvement for {} epochs (best {:.4})",
                training.early_stopping,
                stopper.best()
            );
            break;
        }
    }

    Ok(gan)
}

/// Real data for the discriminator: a fresh batch sampled from the oracle.
fn oracle_batch<B: AutodiffBackend>(
    target: &TargetLstm<ValidBackend<B>>,
    sampler: &mut SeededSampler,
) -> Result<Tensor<B, 2, Int>> {
    let generation = target.generate(sampler)?;
    Ok(Tensor::from_inner(generation.tokens))
}

fn oracle_nll<B: AutodiffBackend>(
    gan: &TextGan<B>,
    target: &TargetLstm<ValidBackend<B>>,
    device: &B::Device,
) -> Result<f32> {
    let generator = gan.generator.valid();
    let latent = generator.latent_prior(target.batch_size(), device);
    target.nll(generator.sample_from_latent(latent))
}

fn maybe_checkpoint<B: AutodiffBackend>(
    gan: &TextGan<B>,
    checkpoint_dir: &Path,
    stage: &str,
    epoch: usize,
    every: usize,
) -> Result<()> {
    if every == 0 || (epoch + 1) % every != 0 {
        return Ok(());
    }
    let path = checkpoint_dir.join(format!("textgan-{stage}-{epoch}"));
    gan.clone()
        .save_file(path.clone(), &BinFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|err| anyhow!("failed to save checkpoint {}: {err:?}", path.display()))?;
    info!("[{stage}] epoch={epoch} checkpoint saved to {}", path.display());
    Ok(())
}

fn scalar<B: BackendTrait>(tensor: Tensor<B, 1>) -> Result<f32> {
    let values = tensor
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|err| anyhow!("{err:?}"))?;
    values
        .first()
        .copied()
        .ok_or_else(|| anyhow!("empty scalar tensor"))
}

fn tensor_values_i64<B: BackendTrait>(tensor: Tensor<B, 2, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .map_err(|err| anyhow!("{err:?}"))
}
