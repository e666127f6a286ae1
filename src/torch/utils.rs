//! Torch utilities.
use std::borrow::Borrow;
use tch::{Kind, TchError, Tensor};

/// Zero the gradient of a tensor.
pub fn f_zero_grad(x: &Tensor) -> Result<(), TchError> {
    let mut grad = x.f_grad()?;
    if grad.defined() {
        let _ = grad.f_detach_()?;
        let _ = grad.f_zero_()?;
    }
    Ok(())
}

/// Zero the gradients of a set of tensors.
pub fn f_zero_grads<I>(tensors: I) -> Result<(), TchError>
where
    I: IntoIterator,
    <I as IntoIterator>::Item: Borrow<Tensor>,
{
    for t in tensors {
        f_zero_grad(t.borrow())?;
    }
    Ok(())
}

/// Euclidean norm of the concatenated gradients of a set of tensors.
///
/// Tensors without a gradient are skipped.
pub fn f_grad_norm<I>(tensors: I) -> Result<f64, TchError>
where
    I: IntoIterator,
    <I as IntoIterator>::Item: Borrow<Tensor>,
{
    let _no_grad = tch::no_grad_guard();
    let mut squared_sum = 0.0;
    for t in tensors {
        let grad = t.borrow().f_grad()?;
        if grad.defined() {
            let norm = grad.f_norm()?.f_double_value(&[])?;
            squared_sum += norm * norm;
        }
    }
    Ok(squared_sum.sqrt())
}

/// Scale gradients so that their global Euclidean norm is at most `max_norm`.
///
/// Returns the total norm before clipping.
pub fn f_clip_grad_norm(tensors: &[&Tensor], max_norm: f64) -> Result<f64, TchError> {
    let total_norm = f_grad_norm(tensors.iter().copied())?;
    let scale = max_norm / (total_norm + 1e-6);
    if scale < 1.0 {
        let _no_grad = tch::no_grad_guard();
        for t in tensors {
            let mut grad = t.f_grad()?;
            if grad.defined() {
                let scaled = &grad * scale;
                let _ = grad.f_copy_(&scaled)?;
            }
        }
    }
    Ok(total_norm)
}

/// Whether every element of a tensor is finite.
pub fn f_all_finite(x: &Tensor) -> Result<bool, TchError> {
    let finite = x.f_isfinite()?.f_all()?;
    Ok(finite.f_to_kind(Kind::Int64)?.f_int64_value(&[])? != 0)
}

#[cfg(test)]
mod zero_grad {
    use super::*;
    use tch::{Cuda, Device, Kind};

    #[test]
    fn zeros_nonzero_grad() {
        // Work-around for https://github.com/pytorch/pytorch/issues/35736
        Cuda::is_available();

        let mut x = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
        let _ = x.requires_grad_(true);
        let y = x.sum(Kind::Float);
        y.backward();
        // First verify that the gradient is nonzero
        assert_eq!(x.grad(), Tensor::ones_like(&x));

        f_zero_grad(&x).unwrap();
        assert_eq!(x.grad(), Tensor::zeros_like(&x));
    }

    #[test]
    fn no_grad_ok() {
        let x = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
        f_zero_grads([&x]).unwrap();
    }
}
