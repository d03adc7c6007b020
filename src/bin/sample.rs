#![recursion_limit = "512"]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use burn_ndarray::NdArray;
use burn_wgpu::Wgpu;
use tracing::info;

#[cfg(feature = "cuda")]
use burn_cuda::Cuda;

use burn_seqgan::logging::init_logging;
use burn_seqgan::{
    ExperimentConfig, SeededSampler, TargetLstm, TargetParams, TextGan,
    build_discriminator_config, build_generator_config, build_target_config,
    load_experiment_config,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Sample sequences from the oracle LSTM or a trained TextGAN generator"
)]
struct Args {
    /// Additional configuration files applied in order (later files override earlier ones).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,
    /// Backend to use for sampling.
    #[arg(long, value_enum, default_value_t = BackendArg::Ndarray)]
    backend: BackendArg,
    /// Oracle parameter blob; overrides `target.params_path`.
    #[arg(long, value_name = "PATH")]
    params: Option<PathBuf>,
    /// Write a fresh random parameter blob to PATH and exit.
    #[arg(long, value_name = "PATH")]
    write_params: Option<PathBuf>,
    /// TextGAN checkpoint (without the `.bin` extension) to sample the generator from.
    #[arg(long, value_name = "PATH")]
    checkpoint: Option<PathBuf>,
    /// Override the number of batches to draw.
    #[arg(long, value_name = "N")]
    num_batches: Option<usize>,
    /// Override the sampling seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    Ndarray,
    Wgpu,
    Cuda,
}

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
    config_paths.extend(args.config.clone());
    let config = load_experiment_config(&config_paths)?;

    if let Some(path) = &args.write_params {
        let seed = args.seed.unwrap_or(config.training.seed);
        TargetParams::random(&build_target_config(&config), seed).save(path)?;
        info!("wrote random oracle parameters to {}", path.display());
        return Ok(());
    }

    match args.backend {
        BackendArg::Ndarray => sample_backend::<NdArray<f32>>(&config, &args),
        BackendArg::Wgpu => sample_backend::<Wgpu<f32>>(&config, &args),
        BackendArg::Cuda => {
            #[cfg(feature = "cuda")]
            {
                sample_backend::<Cuda<f32>>(&config, &args)
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

fn sample_backend<B>(config: &ExperimentConfig, args: &Args) -> Result<()>
where
    B: Backend + 'static,
    B::Device: Clone,
{
    let seed = args.seed.unwrap_or(config.training.seed);
    B::seed(seed);
    let device = B::Device::default();

    let target_config = build_target_config(config);
    let params_path = args.params.clone().or_else(|| config.target.params_path.clone());
    let params = match &params_path {
        Some(path) => TargetParams::load(path)?,
        None => TargetParams::random(&target_config, seed),
    };
    let target = TargetLstm::<B>::from_params(&target_config, &params, &device)
        .context("failed to build the oracle LSTM")?;

    let num_batches = args.num_batches.unwrap_or(config.generation.num_batches);
    match &args.checkpoint {
        Some(checkpoint) => sample_generator(config, &target, checkpoint, num_batches, &device),
        None => sample_oracle(&target, seed, num_batches),
    }
}

fn sample_oracle<B: Backend>(target: &TargetLstm<B>, seed: u64, num_batches: usize) -> Result<()> {
    let mut sampler = SeededSampler::new(seed);
    for batch in 0..num_batches {
        let generation = target.generate(&mut sampler)?;
        let tokens = rows_i64(generation.tokens.clone(), target.sequence_length())?;
        let probs = rows_f32(generation.probs, target.sequence_length())?;
        for (row, row_probs) in tokens.iter().zip(probs.iter()) {
            let formatted: Vec<String> = row_probs.iter().map(|p| format!("{p:.3}")).collect();
            println!("{row:?}\t[{}]", formatted.join(", "));
        }
        let nll = target.nll(generation.tokens)?;
        info!("[oracle] batch={batch} nll={nll:.4}");
    }
    Ok(())
}

fn sample_generator<B: Backend>(
    config: &ExperimentConfig,
    target: &TargetLstm<B>,
    checkpoint: &Path,
    num_batches: usize,
    device: &B::Device,
) -> Result<()> {
    let model = TextGan::<B>::new(
        &build_generator_config(config),
        &build_discriminator_config(config),
        device,
    )?;
    let record = BinFileRecorder::<FullPrecisionSettings>::new()
        .load::<<TextGan<B> as Module<B>>::Record>(checkpoint.to_path_buf(), device)
        .with_context(|| format!("failed to load checkpoint {}.bin", checkpoint.display()))?;
    let generator = model.load_record(record).generator;

    for batch in 0..num_batches {
        let latent = generator.latent_prior(target.batch_size(), device);
        let samples = generator.sample_from_latent(latent);
        for row in rows_i64(samples.clone(), target.sequence_length())? {
            println!("{row:?}");
        }
        let nll = target.nll(samples)?;
        info!("[generator] batch={batch} oracle_nll={nll:.4}");
    }
    Ok(())
}

fn rows_i64<B: Backend>(tensor: Tensor<B, 2, Int>, width: usize) -> Result<Vec<Vec<i64>>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .map_err(|err| anyhow!("{err:?}"))?;
    Ok(values.chunks(width).map(<[i64]>::to_vec).collect())
}

fn rows_f32<B: Backend>(tensor: Tensor<B, 2>, width: usize) -> Result<Vec<Vec<f32>>> {
    let values = tensor
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|err| anyhow!("{err:?}"))?;
    Ok(values.chunks(width).map(<[f32]>::to_vec).collect())
}
