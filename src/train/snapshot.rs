use super::Trainer;
use crate::{
    common::*,
    model::{CompletionNetwork, Model},
    region::HoleMask,
    utils,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    One,
    Two,
    Three,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::One, Phase::Two, Phase::Three];

    pub fn number(&self) -> usize {
        match self {
            Phase::One => 1,
            Phase::Two => 2,
            Phase::Three => 3,
        }
    }

    pub fn dir_name(&self) -> String {
        format!("phase_{}", self.number())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}", self.number())
    }
}

impl Trainer {
    /// Renders the completion of a random test batch and saves the given weights.
    ///
    /// `mask` is the hole mask of the training step that triggered the snapshot.
    /// Runs without gradients and with batch statistics frozen, so the models are
    /// left as they were. Returns the mask tensor applied to the test batch.
    pub(super) fn snapshot(
        &mut self,
        phase: Phase,
        step: usize,
        model_cn: &Model<CompletionNetwork>,
        mask: &HoleMask,
        weights: &[(&str, &VarStore)],
    ) -> Fallible<Tensor> {
        let dir = self.result_dir.join(phase.dir_name());

        let images = self
            .test_set
            .sample_random_batch(self.config.bsize, &mut self.snapshot_rng)?
            .to_device(self.device);
        let batch_size = images.size()[0] as usize;
        let mask = mask.to_tensor(batch_size, self.device);

        let grid = tch::no_grad(|| {
            let input = utils::mask_images(&images, &mask, self.mean_pv);
            let output = model_cn.forward_t(&input, false);
            let completed = utils::composite(&input, &output, &mask);
            Tensor::cat(&[input, completed], 0)
        });

        let image_path = dir.join(format!("step{}.png", step));
        utils::save_image_grid(&grid, batch_size, &image_path)?;

        for (name, vs) in weights {
            let path = dir.join(format!("model_{}_step{}", name, step));
            vs.save(&path)
                .with_context(|| format!("failed to save weights to {}", path.display()))?;
        }

        info!("{} | saved snapshot at step {}", phase, step);
        Ok(mask)
    }
}
