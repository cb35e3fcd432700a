use super::{Phase, PhaseReport, StepCounter, StepLoss, Trainer};
use crate::{
    common::*,
    model::{CompletionNetwork, ContextDiscriminator, Model},
    objective::{context_discriminator_objective, discriminator_loss},
    optim::Adadelta,
    region::{crop, HoleMask},
    utils,
};

pub(super) const REAL: f64 = 1.0;
pub(super) const FAKE: f64 = 0.0;

impl Trainer {
    /// Trains a fresh context discriminator for `Td` steps against completions of
    /// the frozen completion network.
    pub fn phase_2(
        &mut self,
        model_cn: &mut Model<CompletionNetwork>,
    ) -> Fallible<(Model<ContextDiscriminator>, PhaseReport)> {
        model_cn.freeze();

        let model_cd = self.new_context_discriminator();
        let mut opt_cd = self.discriminator_optimizer(&model_cd);

        let mut counter = StepCounter::new(self.config.td);
        let mut report = PhaseReport::default();
        let mut batches = self.batch_stream()?;
        info!(
            "{} | training the context discriminator for {} steps",
            Phase::Two,
            counter.budget()
        );

        while !counter.is_done() {
            let images = self.next_batch(&mut batches)?;
            let (loss, mask) = self.phase_2_step(model_cn, &model_cd, &mut opt_cd, &images)?;
            let step = counter.advance();

            report.last_loss = loss;
            self.log_step(Phase::Two, &counter, &loss);

            if counter.is_due(self.config.snaperiod_2) {
                self.snapshot(
                    Phase::Two,
                    step,
                    model_cn,
                    &mask,
                    &[("cd", model_cd.var_store())],
                )?;
                report.snapshot_steps.push(step);
            }
        }

        report.steps = counter.step();
        Ok((model_cd, report))
    }

    /// One discriminator update on a (completed, real) pair of inputs.
    fn phase_2_step(
        &mut self,
        model_cn: &Model<CompletionNetwork>,
        model_cd: &Model<ContextDiscriminator>,
        opt_cd: &mut Adadelta,
        images: &Tensor,
    ) -> Fallible<(StepLoss, HoleMask)> {
        // fake
        let fake_region = self.sample_patch_region(images)?;
        let mask = self.sample_hole_mask(images, &fake_region)?;

        let mask_tensor = mask.to_tensor(mask.batch_size(), self.device);
        let input_cn = utils::mask_images(images, &mask_tensor, self.mean_pv);
        let input_gd_fake = tch::no_grad(|| model_cn.forward_t(&input_cn, false)).detach();
        let input_ld_fake = crop(&input_gd_fake, &fake_region);
        let output_fake = model_cd.forward_t(&input_ld_fake, &input_gd_fake, true);
        let loss_fake = discriminator_loss(&output_fake, FAKE);

        // real
        let real_region = self.sample_patch_region(images)?;
        let input_ld_real = crop(images, &real_region);
        let output_real = model_cd.forward_t(&input_ld_real, images, true);
        let loss_real = discriminator_loss(&output_real, REAL);

        // optimize
        let loss = context_discriminator_objective(&loss_fake, &loss_real, 1.0);
        opt_cd.backward_step(&loss);

        let loss = StepLoss {
            cn: None,
            cd: Some(loss.double_value(&[])),
        };
        Ok((loss, mask))
    }
}
