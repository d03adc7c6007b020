//! Positional parameter blob for the oracle LSTM.
//!
//! The blob is an ordered list of 15 arrays:
//! `[embeddings, Wi, Ui, bi, Wf, Uf, bf, Wog, Uog, bog, Wc, Uc, bc, Wo, bo]`.
//! On disk it is a JSON array of `{ "shape": [...], "values": [...] }` objects
//! with row-major values.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use super::config::TargetLstmConfig;

pub const TARGET_PARAM_COUNT: usize = 15;

const PARAM_ROLES: [&str; TARGET_PARAM_COUNT] = [
    "embeddings", "Wi", "Ui", "bi", "Wf", "Uf", "bf", "Wog", "Uog", "bog", "Wc", "Uc", "bc", "Wo",
    "bo",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamArray {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamArray {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            values: vec![value; len],
        }
    }

    pub(crate) fn to_tensor<B: Backend, const D: usize>(&self, device: &B::Device) -> Tensor<B, D> {
        Tensor::from_data(
            TensorData::new(self.values.clone(), self.shape.clone()),
            device,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetParams {
    arrays: Vec<ParamArray>,
}

impl TargetParams {
    pub fn new(arrays: Vec<ParamArray>) -> Self {
        Self { arrays }
    }

    pub fn arrays(&self) -> &[ParamArray] {
        &self.arrays
    }

    pub fn arrays_mut(&mut self) -> &mut [ParamArray] {
        &mut self.arrays
    }

    /// Expected array shapes, in blob order, for the given dimensions.
    pub fn expected_shapes(config: &TargetLstmConfig) -> Vec<Vec<usize>> {
        let emb = config.emb_dim;
        let hidden = config.hidden_dim;
        let vocab = config.vocab_size;

        let mut shapes = vec![vec![vocab, emb]];
        for _ in 0..4 {
            shapes.push(vec![emb, hidden]);
            shapes.push(vec![hidden, hidden]);
            shapes.push(vec![hidden]);
        }
        shapes.push(vec![hidden, vocab]);
        shapes.push(vec![vocab]);
        shapes
    }

    /// Every array drawn from N(0, 1).
    pub fn random(config: &TargetLstmConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let arrays = Self::expected_shapes(config)
            .into_iter()
            .map(|shape| {
                let len: usize = shape.iter().product();
                let values = (0..len)
                    .map(|_| Distribution::<f32>::sample(&StandardNormal, &mut rng))
                    .collect();
                ParamArray::new(shape, values)
            })
            .collect();
        Self { arrays }
    }

    pub fn zeros(config: &TargetLstmConfig) -> Self {
        Self {
            arrays: Self::expected_shapes(config)
                .into_iter()
                .map(|shape| ParamArray::filled(shape, 0.0))
                .collect(),
        }
    }

    pub fn validate(&self, config: &TargetLstmConfig) -> Result<()> {
        if self.arrays.len() != TARGET_PARAM_COUNT {
            return Err(anyhow!(
                "parameter blob holds {} arrays, expected {TARGET_PARAM_COUNT}",
                self.arrays.len()
            ));
        }

        let expected = Self::expected_shapes(config);
        for (idx, (array, shape)) in self.arrays.iter().zip(expected.iter()).enumerate() {
            let role = PARAM_ROLES[idx];
            if &array.shape != shape {
                return Err(anyhow!(
                    "parameter {idx} ({role}) has shape {:?}, expected {shape:?}",
                    array.shape
                ));
            }
            let len: usize = array.shape.iter().product();
            if array.values.len() != len {
                return Err(anyhow!(
                    "parameter {idx} ({role}) holds {} values for shape {:?}",
                    array.values.len(),
                    array.shape
                ));
            }
            if array.values.iter().any(|v| !v.is_finite()) {
                return Err(anyhow!("parameter {idx} ({role}) contains non-finite values"));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read parameter blob {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {} as a parameter blob", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string(self)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write parameter blob {}", path.display()))
    }
}
