use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::Backend;
use burn::tensor::{Element, Int, Tensor, TensorData};
use num_traits::{ToPrimitive, Zero};

pub fn vec2tensor1<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Vec<T>,
    device: &B::Device,
) -> Tensor<B, 1> {
    let shape = [arr.len()];
    let tensor_data = TensorData::new(arr, shape);
    return Tensor::<B, 1>::from_data(tensor_data, device);
}

pub fn vec2tensor2<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Vec<T>,
    shape: [usize; 2],
    device: &B::Device,
) -> Tensor<B, 2> {
    let tensor_data = TensorData::new(arr, shape);
    return Tensor::<B, 2>::from_data(tensor_data, device);
}

pub fn vec2int_tensor1<B: Backend>(arr: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let shape = [arr.len()];
    let tensor_data = TensorData::new(arr, shape);
    return Tensor::<B, 1, Int>::from_data(tensor_data, device);
}

/// Stacks equally sized rows into a `[rows.len(), dim]` float tensor.
pub fn rows2tensor2<B: Backend>(rows: &[&[f64]], dim: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut flat = Vec::<f32>::with_capacity(rows.len() * dim);
    for row in rows {
        flat.extend(row.iter().map(|x| *x as f32));
    }
    return vec2tensor2(flat, [rows.len(), dim], device);
}

pub fn tensor2vec2<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.shape().dims();
    let flat: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    flat.chunks(cols.max(1)).map(|row| row.to_vec()).collect()
}

struct ParamCollector {
    values: Vec<f32>,
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.values
            .extend(tensor.to_data().iter::<f32>());
    }
}

/// Every float parameter of `module`, in visiting order.
pub fn flatten_params<B: Backend, M: Module<B>>(module: &M) -> Vec<f32> {
    let mut collector = ParamCollector { values: vec![] };
    module.visit(&mut collector);
    return collector.values;
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::nn::LinearConfig;

    #[test]
    fn test_rows_round_trip_shape() {
        let device = NdArrayDevice::Cpu;
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let tensor = rows2tensor2::<NdArray>(&[&a, &b], 3, &device);
        assert_eq!(tensor.shape().dims, [2, 3]);
        assert_eq!(
            tensor2vec2(tensor),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
        );
    }

    #[test]
    fn test_flatten_params_counts_weights_and_bias() {
        let device = NdArrayDevice::Cpu;
        let linear = LinearConfig::new(3, 2).init::<NdArray>(&device);
        assert_eq!(flatten_params(&linear).len(), 3 * 2 + 2);
    }
}
