use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution as TensorDistribution, Tensor, activation};

const WEIGHT_STDDEV: f64 = 0.1;

/// Recurrent state `(h, c)` stacked as a `[2, batch, hidden]` tensor.
///
/// Index 0 holds the exposed hidden state, index 1 the memory cell. A new
/// value is produced at every timestep; the previous one is never mutated.
#[derive(Debug, Clone)]
pub struct HiddenMemory<B: Backend> {
    stacked: Tensor<B, 3>,
}

impl<B: Backend> HiddenMemory<B> {
    pub fn zeros(batch: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            stacked: Tensor::zeros([2, batch, hidden], device),
        }
    }

    pub fn from_parts(hidden: Tensor<B, 2>, cell: Tensor<B, 2>) -> Self {
        Self {
            stacked: Tensor::stack::<3>(vec![hidden, cell], 0),
        }
    }

    pub fn hidden(&self) -> Tensor<B, 2> {
        self.stacked.clone().slice_dim(0, 0..1).squeeze::<2>(0)
    }

    pub fn cell(&self) -> Tensor<B, 2> {
        self.stacked.clone().slice_dim(0, 1..2).squeeze::<2>(0)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.stacked.dims()
    }

    pub fn into_tensor(self) -> Tensor<B, 3> {
        self.stacked
    }
}

/// One affine pre-activation `x·W + h·U + b` shared by every LSTM gate.
#[derive(Module, Debug)]
pub struct Gate<B: Backend> {
    input_weight: Param<Tensor<B, 2>>,
    hidden_weight: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> Gate<B> {
    pub fn new(input: usize, hidden: usize, bias: f32, device: &B::Device) -> Self {
        let weight_init = |shape: [usize; 2]| {
            Tensor::<B, 2>::random(shape, TensorDistribution::Normal(0.0, WEIGHT_STDDEV), device)
        };

        Self {
            input_weight: Param::from_tensor(weight_init([input, hidden])),
            hidden_weight: Param::from_tensor(weight_init([hidden, hidden])),
            bias: Param::from_tensor(Tensor::full([hidden], bias, device)),
        }
    }

    pub fn from_tensors(
        input_weight: Tensor<B, 2>,
        hidden_weight: Tensor<B, 2>,
        bias: Tensor<B, 1>,
    ) -> Self {
        Self {
            input_weight: Param::from_tensor(input_weight),
            hidden_weight: Param::from_tensor(hidden_weight),
            bias: Param::from_tensor(bias),
        }
    }

    fn preactivation(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        x.matmul(self.input_weight.val())
            + h.matmul(self.hidden_weight.val())
            + self.bias.val().unsqueeze::<2>()
    }
}

#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    input_gate: Gate<B>,
    forget_gate: Gate<B>,
    output_gate: Gate<B>,
    candidate: Gate<B>,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(input: usize, hidden: usize, forget_bias: f32, device: &B::Device) -> Self {
        Self {
            input_gate: Gate::new(input, hidden, 0.0, device),
            forget_gate: Gate::new(input, hidden, forget_bias, device),
            output_gate: Gate::new(input, hidden, 0.0, device),
            candidate: Gate::new(input, hidden, 0.0, device),
        }
    }

    pub fn from_gates(
        input_gate: Gate<B>,
        forget_gate: Gate<B>,
        output_gate: Gate<B>,
        candidate: Gate<B>,
    ) -> Self {
        Self {
            input_gate,
            forget_gate,
            output_gate,
            candidate,
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>, state: HiddenMemory<B>) -> HiddenMemory<B> {
        let h_prev = state.hidden();
        let c_prev = state.cell();

        let input = activation::sigmoid(self.input_gate.preactivation(x.clone(), h_prev.clone()));
        let forget = activation::sigmoid(self.forget_gate.preactivation(x.clone(), h_prev.clone()));
        let output = activation::sigmoid(self.output_gate.preactivation(x.clone(), h_prev.clone()));
        let candidate = self.candidate.preactivation(x, h_prev).tanh();

        let cell = forget * c_prev + input * candidate;
        let hidden = output * cell.clone().tanh();

        HiddenMemory::from_parts(hidden, cell)
    }
}

#[derive(Module, Debug)]
pub struct OutputProjection<B: Backend> {
    weight: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> OutputProjection<B> {
    pub fn new(hidden: usize, vocab: usize, device: &B::Device) -> Self {
        Self {
            weight: Param::from_tensor(Tensor::random(
                [hidden, vocab],
                TensorDistribution::Normal(0.0, WEIGHT_STDDEV),
                device,
            )),
            bias: Param::from_tensor(Tensor::zeros([vocab], device)),
        }
    }

    pub fn from_tensors(weight: Tensor<B, 2>, bias: Tensor<B, 1>) -> Self {
        Self {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(bias),
        }
    }

    pub fn forward(&self, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        hidden.matmul(self.weight.val()) + self.bias.val().unsqueeze::<2>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
        tensor
            .to_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .expect("tensor values")
    }

    fn constant_gate(input: usize, hidden: usize, weight: f32, bias: f32) -> Gate<TestBackend> {
        let device = Default::default();
        Gate::from_tensors(
            Tensor::full([input, hidden], weight, &device),
            Tensor::full([hidden, hidden], weight, &device),
            Tensor::full([hidden], bias, &device),
        )
    }

    #[test]
    fn zero_cell_keeps_state_at_zero() {
        let device = Default::default();
        let cell = LstmCell::from_gates(
            constant_gate(4, 4, 0.0, 0.0),
            constant_gate(4, 4, 0.0, 0.0),
            constant_gate(4, 4, 0.0, 0.0),
            constant_gate(4, 4, 0.0, 0.0),
        );
        let x = Tensor::<TestBackend, 2>::random(
            [2, 4],
            TensorDistribution::Uniform(-1.0, 1.0),
            &device,
        );

        let mut state = HiddenMemory::zeros(2, 4, &device);
        for _ in 0..3 {
            state = cell.forward(x.clone(), state);
            assert_eq!(state.dims(), [2, 2, 4]);
        }
        assert!(values(state.into_tensor()).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn single_unit_matches_gate_equations() {
        let device = Default::default();
        let cell = LstmCell::from_gates(
            constant_gate(1, 1, 1.0, 0.0),
            constant_gate(1, 1, 1.0, 0.5),
            constant_gate(1, 1, 1.0, -0.5),
            constant_gate(1, 1, 1.0, 0.0),
        );
        let x = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32], [1, 1]), &device);
        let state = HiddenMemory::from_parts(
            Tensor::from_data(TensorData::new(vec![0.2f32], [1, 1]), &device),
            Tensor::from_data(TensorData::new(vec![0.3f32], [1, 1]), &device),
        );

        let next = cell.forward(x, state);

        let sigmoid = |v: f32| 1.0 / (1.0 + (-v).exp());
        let pre = 1.0 + 0.2;
        let i = sigmoid(pre);
        let f = sigmoid(pre + 0.5);
        let o = sigmoid(pre - 0.5);
        let candidate = pre.tanh();
        let c = f * 0.3 + i * candidate;
        let h = o * c.tanh();

        assert!((values(next.hidden())[0] - h).abs() < 1e-5);
        assert!((values(next.cell())[0] - c).abs() < 1e-5);
    }

    #[test]
    fn projection_is_affine() {
        let device = Default::default();
        let projection = OutputProjection::<TestBackend>::from_tensors(
            Tensor::from_data(TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]), &device),
            Tensor::from_data(TensorData::new(vec![0.5f32, 0.0, -0.5], [3]), &device),
        );
        let hidden =
            Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32, -1.0], [1, 2]), &device);

        assert_eq!(values(projection.forward(hidden)), vec![-2.5, -3.0, -3.5]);
    }
}
