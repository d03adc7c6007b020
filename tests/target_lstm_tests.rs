use anyhow::Result;
use burn::tensor::backend::Backend as BackendTrait;
use burn::tensor::{Int, Tensor, TensorData};
use burn_ndarray::NdArray;
use burn_seqgan::model::ParamArray;
use burn_seqgan::{SeededSampler, TargetLstm, TargetLstmConfig, TargetParams, TokenSampler};

type Backend = NdArray<f32>;

fn small_config() -> TargetLstmConfig {
    TargetLstmConfig {
        vocab_size: 5,
        batch_size: 2,
        emb_dim: 4,
        hidden_dim: 4,
        sequence_length: 3,
        start_token: 0,
    }
}

fn device() -> <Backend as BackendTrait>::Device {
    <Backend as BackendTrait>::Device::default()
}

fn values_f32<const D: usize>(tensor: Tensor<Backend, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .expect("float values")
}

fn values_i64(tensor: Tensor<Backend, 2, Int>) -> Vec<i64> {
    tensor
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .expect("int values")
}

fn tokens(values: Vec<i64>, config: &TargetLstmConfig) -> Tensor<Backend, 2, Int> {
    Tensor::from_data(
        TensorData::new(values, [config.batch_size, config.sequence_length]),
        &device(),
    )
}

/// Always returns the same index, regardless of the row.
struct FixedSampler(usize);

impl TokenSampler for FixedSampler {
    fn sample(&mut self, _probs: &[f32]) -> Result<usize> {
        Ok(self.0)
    }
}

#[test]
fn generation_shapes_follow_config() {
    let config = TargetLstmConfig {
        vocab_size: 11,
        batch_size: 3,
        emb_dim: 6,
        hidden_dim: 5,
        sequence_length: 7,
        start_token: 2,
    };
    let params = TargetParams::random(&config, 1);
    let target = TargetLstm::<Backend>::from_params(&config, &params, &device()).expect("target");

    let generation = target.generate(&mut SeededSampler::new(3)).expect("generate");
    assert_eq!(generation.tokens.dims(), [3, 7]);
    assert_eq!(generation.probs.dims(), [3, 7]);

    for token in values_i64(generation.tokens) {
        assert!((0..11).contains(&token), "token {token} outside vocabulary");
    }
    for prob in values_f32(generation.probs) {
        assert!(prob > 0.0 && prob <= 1.0, "probability {prob} out of range");
    }
}

#[test]
fn same_seed_same_sequences() {
    let config = small_config();
    let params = TargetParams::random(&config, 42);
    let target = TargetLstm::<Backend>::from_params(&config, &params, &device()).expect("target");

    let first = target.generate(&mut SeededSampler::new(9)).expect("generate");
    let second = target.generate(&mut SeededSampler::new(9)).expect("generate");

    assert_eq!(values_i64(first.tokens), values_i64(second.tokens));
    assert_eq!(values_f32(first.probs), values_f32(second.probs));
}

#[test]
fn zero_parameters_give_uniform_probabilities() {
    let config = small_config();
    let target = TargetLstm::<Backend>::from_params(&config, &TargetParams::zeros(&config), &device())
        .expect("target");

    let generation = target.generate(&mut FixedSampler(3)).expect("generate");
    assert_eq!(values_i64(generation.tokens), vec![3; 6]);
    for prob in values_f32(generation.probs) {
        assert!((prob - 0.2).abs() < 1e-6, "{prob}");
    }

    let score = target.score(tokens(vec![1, 4, 0, 2, 2, 3], &config)).expect("score");
    let ln5 = 5.0f32.ln();
    assert!((values_f32(score.pretrain_loss)[0] - ln5).abs() < 1e-5);
    for loss in values_f32(score.out_loss) {
        assert!((loss - 3.0 * ln5).abs() < 1e-4, "{loss}");
    }
}

#[test]
fn zero_parameters_sample_uniformly() {
    let config = small_config();
    let target = TargetLstm::<Backend>::from_params(&config, &TargetParams::zeros(&config), &device())
        .expect("target");

    let mut sampler = SeededSampler::new(2024);
    let mut counts = [0usize; 5];
    for _ in 0..200 {
        let generation = target.generate(&mut sampler).expect("generate");
        for token in values_i64(generation.tokens) {
            counts[token as usize] += 1;
        }
    }

    let total: usize = counts.iter().sum();
    let expected = total as f64 / 5.0;
    let chi_square: f64 = counts
        .iter()
        .map(|&count| {
            let diff = count as f64 - expected;
            diff * diff / expected
        })
        .sum();
    // 99.9th percentile of chi-square with 4 degrees of freedom.
    assert!(chi_square < 18.47, "chi-square {chi_square} for counts {counts:?}");
}

#[test]
fn teacher_forced_predictions_are_distributions() {
    let config = small_config();
    let params = TargetParams::random(&config, 5);
    let target = TargetLstm::<Backend>::from_params(&config, &params, &device()).expect("target");

    let score = target.score(tokens(vec![1, 2, 3, 4, 0, 1], &config)).expect("score");
    assert_eq!(score.predictions.dims(), [2, 3, 5]);
    assert_eq!(score.out_loss.dims(), [2]);

    let predictions = values_f32(score.predictions);
    for row in predictions.chunks(5) {
        let total: f32 = row.iter().sum();
        assert!((total - 1.0).abs() < 1e-5, "row sums to {total}");
    }

    let pretrain = values_f32(score.pretrain_loss)[0];
    let out = values_f32(score.out_loss);
    assert!(pretrain > 0.0);
    assert!(out.iter().all(|loss| *loss > 0.0));
    let mean_out = out.iter().sum::<f32>() / out.len() as f32;
    assert!((mean_out / 3.0 - pretrain).abs() < 1e-5, "{mean_out} vs {pretrain}");
}

#[test]
fn losses_pick_the_observed_token() {
    let config = small_config();
    let params = TargetParams::random(&config, 8);
    let target = TargetLstm::<Backend>::from_params(&config, &params, &device()).expect("target");

    let sequence = vec![4i64, 1, 1, 0, 3, 2];
    let score = target.score(tokens(sequence.clone(), &config)).expect("score");
    let predictions = values_f32(score.predictions);

    let mut per_row = [0.0f32; 2];
    for (position, token) in sequence.iter().enumerate() {
        let row = position / 3;
        per_row[row] -= predictions[position * 5 + *token as usize].ln();
    }

    let out = values_f32(score.out_loss);
    for (expected, actual) in per_row.iter().zip(out.iter()) {
        assert!((expected - actual).abs() < 1e-4, "{expected} vs {actual}");
    }
}

#[test]
fn generated_probabilities_match_scoring() {
    let config = small_config();
    let params = TargetParams::random(&config, 13);
    let target = TargetLstm::<Backend>::from_params(&config, &params, &device()).expect("target");

    let generation = target.generate(&mut SeededSampler::new(77)).expect("generate");
    let sampled = values_i64(generation.tokens.clone());
    let chosen = values_f32(generation.probs);

    let predictions = values_f32(target.score(generation.tokens).expect("score").predictions);
    for (position, token) in sampled.iter().enumerate() {
        let scored = predictions[position * 5 + *token as usize];
        assert!((scored - chosen[position]).abs() < 1e-5, "{scored} vs {}", chosen[position]);
    }
}

#[test]
fn nll_is_mean_per_token_loss() {
    let config = small_config();
    let target = TargetLstm::<Backend>::from_params(&config, &TargetParams::zeros(&config), &device())
        .expect("target");
    let nll = target.nll(tokens(vec![0, 1, 2, 3, 4, 0], &config)).expect("nll");
    assert!((nll - 5.0f32.ln()).abs() < 1e-5, "{nll}");
}

#[test]
fn certain_model_has_zero_loss() {
    let config = small_config();
    let mut params = TargetParams::zeros(&config);
    // Zero weights keep the hidden state at zero, so the output bias alone sets the logits.
    params.arrays_mut()[14] = ParamArray::new(vec![5], vec![0.0, 0.0, 50.0, 0.0, 0.0]);
    let target = TargetLstm::<Backend>::from_params(&config, &params, &device()).expect("target");

    let score = target.score(tokens(vec![2; 6], &config)).expect("score");
    let pretrain = values_f32(score.pretrain_loss)[0];
    assert!(pretrain.abs() < 1e-4, "{pretrain}");
    for loss in values_f32(score.out_loss) {
        assert!(loss.abs() < 1e-4, "{loss}");
    }

    let other = target.score(tokens(vec![2, 2, 1, 2, 2, 2], &config)).expect("score");
    assert!(values_f32(other.pretrain_loss)[0] > 1.0);
}

#[test]
fn score_rejects_out_of_range_token() {
    let config = small_config();
    let target = TargetLstm::<Backend>::from_params(&config, &TargetParams::zeros(&config), &device())
        .expect("target");

    let err = target
        .score(tokens(vec![0, 1, 2, 3, 4, 9], &config))
        .expect_err("token 9 with vocab 5");
    assert!(err.to_string().contains("token 9 outside vocabulary of size 5"));

    let err = target
        .score(tokens(vec![0, -1, 2, 3, 4, 0], &config))
        .expect_err("negative token");
    assert!(err.to_string().contains("outside vocabulary"));
}

#[test]
fn score_rejects_wrong_shape() {
    let config = small_config();
    let target = TargetLstm::<Backend>::from_params(&config, &TargetParams::zeros(&config), &device())
        .expect("target");

    let wrong = Tensor::<Backend, 2, Int>::zeros([2, 4], &device());
    let err = target.score(wrong).expect_err("shape mismatch");
    assert!(err.to_string().contains("expected sequences of shape [2, 3]"));
}

#[test]
fn malformed_blobs_are_rejected() {
    let config = small_config();

    let mut short = TargetParams::zeros(&config).arrays().to_vec();
    short.pop();
    let err = TargetLstm::<Backend>::from_params(&config, &TargetParams::new(short), &device())
        .expect_err("14 arrays");
    assert!(err.to_string().contains("expected 15"));

    let mut reshaped = TargetParams::zeros(&config);
    reshaped.arrays_mut()[13] = ParamArray::filled(vec![5, 4], 0.0);
    let err = TargetLstm::<Backend>::from_params(&config, &reshaped, &device())
        .expect_err("transposed projection");
    assert!(err.to_string().contains("Wo"));
}
