use crate::common::*;

/// Mean squared error between `output` and `target`, counting only hole pixels.
pub fn completion_network_loss(target: &Tensor, output: &Tensor, mask: &Tensor) -> Tensor {
    (output * mask).mse_loss(&(target * mask), Reduction::Mean)
}

/// Binary cross entropy of discriminator probabilities against a constant label.
pub fn discriminator_loss(scores: &Tensor, label: f64) -> Tensor {
    let target = scores.ones_like().detach() * label;
    scores.binary_cross_entropy::<Tensor>(&target, None, Reduction::Mean)
}

/// Discriminator objective: the mean of the fake and real terms, scaled by `weight`.
///
/// Discriminator pretraining uses a weight of 1, joint training uses `alpha`.
pub fn context_discriminator_objective(
    loss_fake: &Tensor,
    loss_real: &Tensor,
    weight: f64,
) -> Tensor {
    (loss_fake + loss_real) * weight / 2.0
}

/// Completion network objective in joint training, `(recon + alpha * adv) / 2`.
pub fn completion_network_objective(
    loss_recon: &Tensor,
    loss_adv: &Tensor,
    alpha: f64,
) -> Tensor {
    (loss_recon + loss_adv * alpha) / 2.0
}
