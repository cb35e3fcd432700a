use crate::common::*;

/// Hyper-parameters of the completion network.
///
/// The input side length must be divisible by 4 since the encoder downsamples
/// twice before the dilated convolutions.
#[derive(Debug, Clone)]
pub struct CompletionNetworkInit {
    pub in_channels: i64,
    pub out_channels: i64,
    pub base_channels: i64,
    pub dilations: Vec<i64>,
}

impl Default for CompletionNetworkInit {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 3,
            base_channels: 64,
            dilations: vec![2, 4, 8, 16],
        }
    }
}

impl CompletionNetworkInit {
    pub fn build<'p, P>(self, path: P) -> CompletionNetwork
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_channels,
            out_channels,
            base_channels: c1,
            dilations,
        } = self;
        let c2 = c1 * 2;
        let c4 = c1 * 4;

        let mut layers = nn::seq_t()
            // encoder
            .add(conv_block(path / "conv1", in_channels, c1, 5, 1, 1))
            .add(conv_block(path / "conv2", c1, c2, 3, 2, 1))
            .add(conv_block(path / "conv3", c2, c2, 3, 1, 1))
            .add(conv_block(path / "conv4", c2, c4, 3, 2, 1))
            .add(conv_block(path / "conv5", c4, c4, 3, 1, 1))
            .add(conv_block(path / "conv6", c4, c4, 3, 1, 1));

        // enlarge the receptive field without losing resolution
        for (index, dilation) in dilations.into_iter().enumerate() {
            layers = layers.add(conv_block(
                path / format!("dilated_conv{}", index + 1),
                c4,
                c4,
                3,
                1,
                dilation,
            ));
        }

        let layers = layers
            .add(conv_block(path / "conv7", c4, c4, 3, 1, 1))
            .add(conv_block(path / "conv8", c4, c4, 3, 1, 1))
            // decoder
            .add(deconv_block(path / "deconv1", c4, c2))
            .add(conv_block(path / "conv9", c2, c2, 3, 1, 1))
            .add(deconv_block(path / "deconv2", c2, c1))
            .add(conv_block(path / "conv10", c1, c1 / 2, 3, 1, 1))
            .add(nn::conv2d(
                path / "conv_out",
                c1 / 2,
                out_channels,
                3,
                ConvConfig {
                    padding: 1,
                    ..Default::default()
                },
            ))
            .add_fn(|xs| xs.sigmoid());

        CompletionNetwork { layers }
    }
}

/// Predicts the full image from an image whose holes are filled with the mean
/// pixel value. The output has the input's spatial size and lies in [0, 1].
#[derive(Debug)]
pub struct CompletionNetwork {
    layers: nn::SequentialT,
}

impl ModuleT for CompletionNetwork {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs.apply_t(&self.layers, train)
    }
}

fn conv_block<'p, P>(
    path: P,
    in_channels: i64,
    out_channels: i64,
    kernel_size: i64,
    stride: i64,
    dilation: i64,
) -> nn::SequentialT
where
    P: Borrow<nn::Path<'p>>,
{
    let path = path.borrow();
    let config = ConvConfig {
        stride,
        dilation,
        padding: dilation * (kernel_size - 1) / 2,
        ..Default::default()
    };

    nn::seq_t()
        .add(nn::conv2d(
            path / "conv",
            in_channels,
            out_channels,
            kernel_size,
            config,
        ))
        .add(nn::batch_norm2d(path / "bn", out_channels, Default::default()))
        .add_fn(|xs| xs.relu())
}

fn deconv_block<'p, P>(path: P, in_channels: i64, out_channels: i64) -> nn::SequentialT
where
    P: Borrow<nn::Path<'p>>,
{
    let path = path.borrow();
    let config = ConvTransposeConfig {
        stride: 2,
        padding: 1,
        ..Default::default()
    };

    nn::seq_t()
        .add(nn::conv_transpose2d(
            path / "deconv",
            in_channels,
            out_channels,
            4,
            config,
        ))
        .add(nn::batch_norm2d(path / "bn", out_channels, Default::default()))
        .add_fn(|xs| xs.relu())
}
