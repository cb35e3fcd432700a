use super::{
    phase_2::{FAKE, REAL},
    Phase, PhaseReport, StepCounter, StepLoss, Trainer,
};
use crate::{
    common::*,
    model::{CompletionNetwork, ContextDiscriminator, Model},
    objective::{
        completion_network_loss, completion_network_objective, context_discriminator_objective,
        discriminator_loss,
    },
    optim::Adadelta,
    region::{crop, HoleMask},
    utils,
};

impl Trainer {
    /// Trains both networks adversarially for the remaining `Ttrain - (Tc + Td)`
    /// steps, starting from the weights of the previous phases.
    ///
    /// The optimizers start from scratch; only the parameters carry over.
    pub fn phase_3(
        &mut self,
        mut model_cn: Model<CompletionNetwork>,
        mut model_cd: Model<ContextDiscriminator>,
    ) -> Fallible<(
        Model<CompletionNetwork>,
        Model<ContextDiscriminator>,
        PhaseReport,
    )> {
        model_cn.unfreeze();
        model_cd.unfreeze();

        let mut opt_cn = self.completion_optimizer(&model_cn);
        let mut opt_cd = self.discriminator_optimizer(&model_cd);

        let mut counter = StepCounter::new(self.config.phase_3_steps());
        let mut report = PhaseReport::default();
        let mut batches = self.batch_stream()?;
        info!(
            "{} | training both networks for {} steps",
            Phase::Three,
            counter.budget()
        );

        while !counter.is_done() {
            let images = self.next_batch(&mut batches)?;
            let (loss, mask) =
                self.phase_3_step(&model_cn, &model_cd, &mut opt_cn, &mut opt_cd, &images)?;
            let step = counter.advance();

            report.last_loss = loss;
            self.log_step(Phase::Three, &counter, &loss);

            if counter.is_due(self.config.snaperiod_3) {
                self.snapshot(
                    Phase::Three,
                    step,
                    &model_cn,
                    &mask,
                    &[("cn", model_cn.var_store()), ("cd", model_cd.var_store())],
                )?;
                report.snapshot_steps.push(step);
            }
        }

        report.steps = counter.step();
        Ok((model_cn, model_cd, report))
    }

    /// A discriminator update followed by a completion network update, both
    /// driven by the same completion forward pass and hole mask.
    fn phase_3_step(
        &mut self,
        model_cn: &Model<CompletionNetwork>,
        model_cd: &Model<ContextDiscriminator>,
        opt_cn: &mut Adadelta,
        opt_cd: &mut Adadelta,
        images: &Tensor,
    ) -> Fallible<(StepLoss, HoleMask)> {
        let alpha = self.config.alpha;

        // train the discriminator, fake
        let fake_region = self.sample_patch_region(images)?;
        let mask = self.sample_hole_mask(images, &fake_region)?;

        let mask_tensor = mask.to_tensor(mask.batch_size(), self.device);
        let input_cn = utils::mask_images(images, &mask_tensor, self.mean_pv);
        let output_cn = model_cn.forward_t(&input_cn, true);

        let input_gd_fake = output_cn.detach();
        let input_ld_fake = crop(&input_gd_fake, &fake_region);
        let output_fake = model_cd.forward_t(&input_ld_fake, &input_gd_fake, true);
        let loss_cd_fake = discriminator_loss(&output_fake, FAKE);

        // train the discriminator, real
        let real_region = self.sample_patch_region(images)?;
        let input_ld_real = crop(images, &real_region);
        let output_real = model_cd.forward_t(&input_ld_real, images, true);
        let loss_cd_real = discriminator_loss(&output_real, REAL);

        let loss_cd = context_discriminator_objective(&loss_cd_fake, &loss_cd_real, alpha);
        opt_cd.backward_step(&loss_cd);

        // train the completion network on the same forward pass; the local crop
        // reuses the region of the real branch
        let loss_cn_recon = completion_network_loss(images, &output_cn, &mask_tensor);
        let input_ld_fake = crop(&output_cn, &real_region);
        let output_fake = model_cd.forward_t(&input_ld_fake, &output_cn, true);
        let loss_cn_adv = discriminator_loss(&output_fake, REAL);

        let loss_cn = completion_network_objective(&loss_cn_recon, &loss_cn_adv, alpha);
        opt_cn.backward_step(&loss_cn);

        let loss = StepLoss {
            cn: Some(loss_cn.double_value(&[])),
            cd: Some(loss_cd.double_value(&[])),
        };
        Ok((loss, mask))
    }
}
