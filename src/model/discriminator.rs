use crate::common::*;

const FEATURE_CHANNELS: i64 = 1024;

#[derive(Debug, Clone)]
pub struct ContextDiscriminatorInit {
    pub local_input_size: i64,
    pub global_input_size: i64,
}

impl ContextDiscriminatorInit {
    pub fn build<'p, P>(self, path: P) -> ContextDiscriminator
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            local_input_size,
            global_input_size,
        } = self;

        let local = branch(
            path / "local",
            local_input_size,
            &[64, 128, 256, 512, 512],
        );
        let global = branch(
            path / "global",
            global_input_size,
            &[64, 128, 256, 512, 512, 512],
        );
        let fc = nn::linear(
            path / "fc",
            FEATURE_CHANNELS * 2,
            1,
            Default::default(),
        );

        ContextDiscriminator { local, global, fc }
    }
}

/// Scores a (local patch, full image) pair with the probability that it is real.
#[derive(Debug)]
pub struct ContextDiscriminator {
    local: nn::SequentialT,
    global: nn::SequentialT,
    fc: nn::Linear,
}

impl ContextDiscriminator {
    /// Returns a `[batch, 1]` tensor of probabilities.
    pub fn forward_t(&self, local: &Tensor, global: &Tensor, train: bool) -> Tensor {
        let local = local.apply_t(&self.local, train);
        let global = global.apply_t(&self.global, train);
        Tensor::cat(&[local, global], 1).apply(&self.fc).sigmoid()
    }
}

/// Strided 5x5 convolutions followed by a fully connected projection to a
/// `FEATURE_CHANNELS` feature vector.
fn branch<'p, P>(path: P, input_size: i64, channels: &[i64]) -> nn::SequentialT
where
    P: Borrow<nn::Path<'p>>,
{
    let path = path.borrow();
    let config = ConvConfig {
        stride: 2,
        padding: 2,
        ..Default::default()
    };

    let (layers, in_channels, size) = channels.iter().enumerate().fold(
        (nn::seq_t(), 3, input_size),
        |(layers, in_channels, size), (index, &out_channels)| {
            let block = path / format!("conv{}", index + 1);
            let layers = layers
                .add(nn::conv2d(
                    &block / "conv",
                    in_channels,
                    out_channels,
                    5,
                    config,
                ))
                .add(nn::batch_norm2d(&block / "bn", out_channels, Default::default()))
                .add_fn(|xs| xs.relu());
            (layers, out_channels, (size - 1) / 2 + 1)
        },
    );

    layers
        .add_fn(|xs| xs.flatten(1, -1))
        .add(nn::linear(
            path / "fc",
            in_channels * size * size,
            FEATURE_CHANNELS,
            Default::default(),
        ))
        .add_fn(|xs| xs.relu())
}
