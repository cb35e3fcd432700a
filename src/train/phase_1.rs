use super::{Phase, PhaseReport, StepCounter, StepLoss, Trainer};
use crate::{
    common::*,
    model::{CompletionNetwork, Model},
    objective::completion_network_loss,
    optim::Adadelta,
    region::HoleMask,
    utils,
};

impl Trainer {
    /// Trains a fresh completion network on the reconstruction loss alone for
    /// `Tc` steps.
    pub fn phase_1(&mut self) -> Fallible<(Model<CompletionNetwork>, PhaseReport)> {
        let model_cn = self.new_completion_network();
        let mut opt_cn = self.completion_optimizer(&model_cn);

        let mut counter = StepCounter::new(self.config.tc);
        let mut report = PhaseReport::default();
        let mut batches = self.batch_stream()?;
        info!(
            "{} | training the completion network for {} steps",
            Phase::One,
            counter.budget()
        );

        while !counter.is_done() {
            let images = self.next_batch(&mut batches)?;
            let (loss, mask) = self.phase_1_step(&model_cn, &mut opt_cn, &images)?;
            let step = counter.advance();

            report.last_loss = loss;
            self.log_step(Phase::One, &counter, &loss);

            if counter.is_due(self.config.snaperiod_1) {
                self.snapshot(
                    Phase::One,
                    step,
                    &model_cn,
                    &mask,
                    &[("cn", model_cn.var_store())],
                )?;
                report.snapshot_steps.push(step);
            }
        }

        report.steps = counter.step();
        Ok((model_cn, report))
    }

    /// One reconstruction update. Returns the loss and the sampled mask.
    fn phase_1_step(
        &mut self,
        model_cn: &Model<CompletionNetwork>,
        opt_cn: &mut Adadelta,
        images: &Tensor,
    ) -> Fallible<(StepLoss, HoleMask)> {
        let region = self.sample_patch_region(images)?;
        let mask = self.sample_hole_mask(images, &region)?;

        let mask_tensor = mask.to_tensor(mask.batch_size(), self.device);
        let input = utils::mask_images(images, &mask_tensor, self.mean_pv);
        let output = model_cn.forward_t(&input, true);
        let loss = completion_network_loss(images, &output, &mask_tensor);
        opt_cn.backward_step(&loss);

        let loss = StepLoss {
            cn: Some(loss.double_value(&[])),
            cd: None,
        };
        Ok((loss, mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::tests::{small_config, small_trainer};

    #[test]
    fn snapshot_applies_the_mask_of_the_training_step() {
        let (_dirs, mut trainer) = small_trainer(small_config());
        let model_cn = trainer.new_completion_network();
        let mut opt_cn = trainer.completion_optimizer(&model_cn);
        let mut batches = trainer.batch_stream().unwrap();
        let images = trainer.next_batch(&mut batches).unwrap();

        let (_, mask) = trainer
            .phase_1_step(&model_cn, &mut opt_cn, &images)
            .unwrap();
        let applied = trainer
            .snapshot(Phase::One, 1, &model_cn, &mask, &[])
            .unwrap();

        let trained = mask.to_tensor(mask.batch_size(), Device::Cpu);
        assert_eq!(applied.size(), trained.size());
        assert!(applied.equal(&trained));
        assert!(applied.sum(Kind::Float).double_value(&[]) >= 64.0);
    }
}
