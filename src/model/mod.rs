mod completion;
mod discriminator;

pub use completion::{CompletionNetwork, CompletionNetworkInit};
pub use discriminator::{ContextDiscriminator, ContextDiscriminatorInit};

use crate::common::*;

/// A network together with the variable store that owns its parameters.
///
/// A frozen model still runs forward passes but its parameters stop requiring
/// gradients, so no optimizer step can move them.
#[derive(Debug)]
pub struct Model<N> {
    vs: VarStore,
    net: N,
    trainable: bool,
}

impl<N> Model<N> {
    pub fn new<F>(device: Device, build: F) -> Self
    where
        F: FnOnce(&nn::Path) -> N,
    {
        let vs = VarStore::new(device);
        let net = build(&vs.root());
        Self {
            vs,
            net,
            trainable: true,
        }
    }

    pub fn net(&self) -> &N {
        &self.net
    }

    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn freeze(&mut self) {
        self.vs.freeze();
        self.trainable = false;
    }

    pub fn unfreeze(&mut self) {
        self.vs.unfreeze();
        self.trainable = true;
    }
}

impl Model<CompletionNetwork> {
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        self.net.forward_t(input, train)
    }
}

impl Model<ContextDiscriminator> {
    pub fn forward_t(&self, local: &Tensor, global: &Tensor, train: bool) -> Tensor {
        self.net.forward_t(local, global, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_model_does_not_track_gradients() {
        let mut model = Model::new(Device::Cpu, |path| {
            CompletionNetworkInit::default().build(path)
        });
        let input = Tensor::rand(&[1, 3, 16, 16], (Kind::Float, Device::Cpu));

        assert!(model.is_trainable());
        assert!(model.forward_t(&input, true).requires_grad());

        model.freeze();
        assert!(!model.is_trainable());
        assert!(!model.forward_t(&input, false).requires_grad());

        model.unfreeze();
        assert!(model.forward_t(&input, true).requires_grad());
    }
}
