use burn::{
    module::{Module, ModuleVisitor, ParamId},
    prelude::Backend,
    tensor::{cast::ToElement, Tensor},
};

pub fn has_nan_or_inf<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> bool {
    let is_nan = tensor.clone().is_nan().any().into_scalar();
    let is_inf = tensor.abs().equal_elem(f32::INFINITY).any().into_scalar();
    return is_nan || is_inf;
}

pub fn is_finite_scalar<B: Backend>(tensor: Tensor<B, 1>) -> bool {
    tensor.into_scalar().to_f64().is_finite()
}

struct NonFiniteFinder {
    found: bool,
}

impl<B: Backend> ModuleVisitor<B> for NonFiniteFinder {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if !self.found && has_nan_or_inf(tensor.clone()) {
            self.found = true;
        }
    }
}

/// True if any float parameter of `module` is NaN or infinite.
pub fn module_has_nan_or_inf<B: Backend, M: Module<B>>(module: &M) -> bool {
    let mut finder = NonFiniteFinder { found: false };
    module.visit(&mut finder);
    return finder.found;
}
