use anyhow::{Result, anyhow};
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

/// Source of categorical draws for autoregressive sampling.
///
/// Every stochastic step of the crate goes through this trait, so tests can
/// substitute a deterministic implementation.
pub trait TokenSampler {
    fn sample(&mut self, probs: &[f32]) -> Result<usize>;
}

#[derive(Clone, Debug)]
pub struct SeededSampler {
    rng: StdRng,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl TokenSampler for SeededSampler {
    fn sample(&mut self, probs: &[f32]) -> Result<usize> {
        let dist = WeightedIndex::new(probs).map_err(|err| anyhow!(err.to_string()))?;
        Ok(dist.sample(&mut self.rng))
    }
}

pub fn sample_rows<S: TokenSampler + ?Sized>(
    sampler: &mut S,
    probs: &[f32],
    vocab: usize,
) -> Result<Vec<i64>> {
    if vocab == 0 || probs.len() % vocab != 0 {
        return Err(anyhow!(
            "probability buffer of length {} is not a multiple of vocab size {vocab}",
            probs.len()
        ));
    }

    probs
        .chunks(vocab)
        .enumerate()
        .map(|(row, values)| {
            sampler
                .sample(values)
                .map(|token| token as i64)
                .map_err(|err| anyhow!("categorical draw failed for row {row}: {err}"))
        })
        .collect()
}
