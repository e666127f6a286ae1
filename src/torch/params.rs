//! Named parameter registry
use tch::{nn::VarStore, Tensor};

/// An ordered list of named tensors.
///
/// Consumers that hold a `ParamSet` derived from the same source (gradients, Fisher weights,
/// anchors) align their entries by position.
#[derive(Debug)]
pub struct ParamSet {
    params: Vec<(String, Tensor)>,
}

impl ParamSet {
    /// The trainable variables of a var store, ordered by name.
    ///
    /// The tensors share storage (and gradients) with the store.
    pub fn from_var_store(vs: &VarStore) -> Self {
        let mut params: Vec<_> = vs
            .variables()
            .into_iter()
            .filter(|(_, t)| t.requires_grad())
            .collect();
        params.sort_by(|(a, _), (b, _)| a.cmp(b));
        Self { params }
    }

    pub fn from_named(params: Vec<(String, Tensor)>) -> Self {
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.params.iter().map(|(name, t)| (name.as_str(), t))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(name, _)| name.as_str())
    }

    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> {
        self.params.iter().map(|(_, t)| t)
    }

    /// Independently owned copies of every tensor, detached from the autograd graph.
    pub fn snapshot(&self) -> Self {
        let _no_grad = tch::no_grad_guard();
        Self {
            params: self
                .params
                .iter()
                .map(|(name, t)| (name.clone(), t.detach().copy()))
                .collect(),
        }
    }

    /// Zero tensors with the same names and shapes.
    pub fn zeros_like(&self) -> Self {
        Self {
            params: self
                .params
                .iter()
                .map(|(name, t)| (name.clone(), t.zeros_like().detach()))
                .collect(),
        }
    }

    /// Whether `other` has the same names in the same order.
    pub fn is_aligned_with(&self, other: &Self) -> bool {
        self.names().eq(other.names())
    }

    /// Total number of scalar elements.
    pub fn numel(&self) -> usize {
        self.tensors().map(Tensor::numel).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn store() -> VarStore {
        let vs = VarStore::new(Device::Cpu);
        let root = vs.root();
        let _ = root.ones("b", &[2]);
        let _ = root.zeros("a", &[3, 2]);
        vs
    }

    #[test]
    fn ordered_by_name() {
        let vs = store();
        let params = ParamSet::from_var_store(&vs);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.numel(), 8);
    }

    #[test]
    fn snapshot_is_independent() {
        let vs = store();
        let params = ParamSet::from_var_store(&vs);
        let snapshot = params.snapshot();
        assert!(snapshot.is_aligned_with(&params));
        {
            let _no_grad = tch::no_grad_guard();
            for t in params.tensors() {
                let _ = t.shallow_clone().fill_(5.0);
            }
        }
        let (_, b) = snapshot.iter().nth(1).unwrap();
        assert_eq!(b, &Tensor::ones(&[2], (Kind::Float, Device::Cpu)));
        assert!(!b.requires_grad());
    }

    #[test]
    fn shares_storage_with_store() {
        let vs = store();
        let params = ParamSet::from_var_store(&vs);
        {
            let _no_grad = tch::no_grad_guard();
            let _ = params.tensors().next().unwrap().shallow_clone().fill_(2.0);
        }
        let variables = vs.variables();
        assert_eq!(&variables["a"], &Tensor::full(&[3, 2], 2.0, (Kind::Float, Device::Cpu)));
    }
}
