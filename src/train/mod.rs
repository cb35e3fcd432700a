mod phase_1;
mod phase_2;
mod phase_3;
mod snapshot;

pub use snapshot::Phase;

use crate::{
    common::*,
    config::{ConfigSnapshot, TrainingConfig},
    dataset::{BatchStream, ImageDataset},
    model::{
        CompletionNetwork, CompletionNetworkInit, ContextDiscriminator, ContextDiscriminatorInit,
        Model,
    },
    optim::{Adadelta, AdadeltaConfig},
    region::{HoleMask, PatchRegion, RegionSampler},
    utils,
};

/// Counts processed batches of one phase and decides when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCounter {
    step: usize,
    budget: usize,
}

impl StepCounter {
    pub fn new(budget: usize) -> Self {
        Self { step: 0, budget }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn is_done(&self) -> bool {
        self.step >= self.budget
    }

    /// Records one processed batch and returns the new step number.
    pub fn advance(&mut self) -> usize {
        debug_assert!(!self.is_done());
        self.step += 1;
        self.step
    }

    /// Whether the current step falls on `period`. A zero period never does.
    pub fn is_due(&self, period: usize) -> bool {
        period != 0 && self.step != 0 && self.step % period == 0
    }
}

/// Losses of the most recent step. Each phase fills the models it trains.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepLoss {
    pub cn: Option<f64>,
    pub cd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseReport {
    pub steps: usize,
    pub snapshot_steps: Vec<usize>,
    pub last_loss: StepLoss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub mean_pv: f64,
    pub phase_1: PhaseReport,
    pub phase_2: PhaseReport,
    pub phase_3: PhaseReport,
}

impl TrainingReport {
    pub fn total_steps(&self) -> usize {
        self.phase_1.steps + self.phase_2.steps + self.phase_3.steps
    }
}

/// Drives the three training phases over one corpus.
///
/// Constructing a trainer validates the configuration, prepares the result
/// directory, computes the mean pixel value and writes `config.json`.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    mean_pv: f64,
    result_dir: PathBuf,
    train_set: Arc<ImageDataset>,
    test_set: Arc<ImageDataset>,
    sampler: RegionSampler,
    #[derivative(Debug = "ignore")]
    rng: StdRng,
    /// Draws test batches for snapshots, kept apart from `rng` so that
    /// snapshots leave the training sequence untouched.
    #[derivative(Debug = "ignore")]
    snapshot_rng: StdRng,
}

impl Trainer {
    pub fn new<P1, P2>(config: TrainingConfig, data_dir: P1, result_dir: P2) -> Fallible<Self>
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
    {
        let data_dir = data_dir.as_ref();
        let result_dir = result_dir.as_ref();

        config.validate()?;

        // create result directories
        for phase in Phase::ALL {
            let dir = result_dir.join(phase.dir_name());
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }

        let (rng, snapshot_rng) = match config.seed {
            Some(seed) => {
                tch::manual_seed(seed as i64);
                (
                    StdRng::seed_from_u64(seed),
                    StdRng::seed_from_u64(seed.wrapping_add(1)),
                )
            }
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        };
        let device = config.device();
        info!("using device {:?}", device);

        // load datasets
        info!("loading dataset from {}", data_dir.display());
        let train_set = ImageDataset::open(data_dir.join("train"), config.cn_input_size)?;
        let test_set = ImageDataset::open(data_dir.join("test"), config.cn_input_size)?;
        info!(
            "{} training images, {} test images",
            train_set.len(),
            test_set.len()
        );

        // compute the mean pixel value of datasets
        let mean_pv = if config.comp_mpv {
            info!("computing the mean pixel value");
            let image_paths = train_set
                .image_paths()
                .iter()
                .chain(test_set.image_paths())
                .collect_vec();
            utils::mean_pixel_value(&image_paths)?
        } else {
            0.0
        };
        info!("mean pixel value: {:.5}", mean_pv);

        // save training config
        ConfigSnapshot {
            data_dir,
            result_dir,
            config: &config,
            mean_pv,
        }
        .save(result_dir.join("config.json"))?;

        Ok(Self {
            sampler: RegionSampler::new(&config),
            config,
            device,
            mean_pv,
            result_dir: result_dir.to_owned(),
            train_set: Arc::new(train_set),
            test_set: Arc::new(test_set),
            rng,
            snapshot_rng,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn mean_pv(&self) -> f64 {
        self.mean_pv
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Runs phase 1, 2 and 3 back to back, handing the trained weights of each
    /// phase to the next one.
    pub fn run(mut self) -> Fallible<TrainingReport> {
        let instant = Instant::now();

        let (mut model_cn, phase_1) = self.phase_1()?;
        let (model_cd, phase_2) = self.phase_2(&mut model_cn)?;
        let (_model_cn, _model_cd, phase_3) = self.phase_3(model_cn, model_cd)?;

        let report = TrainingReport {
            mean_pv: self.mean_pv,
            phase_1,
            phase_2,
            phase_3,
        };
        info!(
            "training finished after {} steps in {}s",
            report.total_steps(),
            instant.elapsed().as_secs()
        );
        Ok(report)
    }

    fn new_completion_network(&self) -> Model<CompletionNetwork> {
        Model::new(self.device, |path| CompletionNetworkInit::default().build(path))
    }

    fn new_context_discriminator(&self) -> Model<ContextDiscriminator> {
        let init = ContextDiscriminatorInit {
            local_input_size: self.config.ld_input_size as i64,
            global_input_size: self.config.gd_input_size as i64,
        };
        Model::new(self.device, |path| init.build(path))
    }

    fn completion_optimizer(&self, model: &Model<CompletionNetwork>) -> Adadelta {
        AdadeltaConfig {
            lr: self.config.lr_cn,
            rho: self.config.rho_cn,
            weight_decay: self.config.wd_cn,
            ..Default::default()
        }
        .build(model.var_store())
    }

    fn discriminator_optimizer(&self, model: &Model<ContextDiscriminator>) -> Adadelta {
        AdadeltaConfig {
            lr: self.config.lr_cd,
            rho: self.config.rho_cd,
            weight_decay: self.config.wd_cd,
            ..Default::default()
        }
        .build(model.var_store())
    }

    /// Opens a fresh pass over the training set for one phase.
    fn batch_stream(&mut self) -> Fallible<BatchStream> {
        BatchStream::new(
            self.train_set.clone(),
            self.config.bsize,
            self.config.shuffle,
            self.config.prefetch,
            self.rng.gen(),
        )
    }

    fn next_batch(&self, batches: &mut BatchStream) -> Fallible<Tensor> {
        Ok(batches.next_batch()?.to_device(self.device))
    }

    fn sample_patch_region(&mut self, images: &Tensor) -> Fallible<PatchRegion> {
        let (_, _, height, width) = images.size4()?;
        self.sampler
            .patch_region(&mut self.rng, width as usize, height as usize)
    }

    fn sample_hole_mask(&mut self, images: &Tensor, region: &PatchRegion) -> Fallible<HoleMask> {
        let (batch_size, _, height, width) = images.size4()?;
        self.sampler.hole_mask(
            &mut self.rng,
            batch_size as usize,
            width as usize,
            height as usize,
            region,
        )
    }

    fn log_step(&self, phase: Phase, counter: &StepCounter, loss: &StepLoss) {
        let message = format!(
            "{} | step {}/{}{}{}",
            phase,
            counter.step(),
            counter.budget(),
            loss.cd
                .map(|loss| format!(" | train loss (cd): {:.5}", loss))
                .unwrap_or_default(),
            loss.cn
                .map(|loss| format!(" | train loss (cn): {:.5}", loss))
                .unwrap_or_default(),
        );

        if counter.is_due(self.config.log_period) || counter.is_done() {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A 32 pixel configuration that keeps the networks small.
    pub(super) fn small_config() -> TrainingConfig {
        TrainingConfig {
            ptch_reg_w: 16,
            ptch_reg_h: 16,
            ptch_min_w: 8,
            ptch_max_w: 16,
            ptch_min_h: 8,
            ptch_max_h: 16,
            max_patches: 3,
            cn_input_size: 32,
            gd_input_size: 32,
            ld_input_size: 16,
            bsize: 2,
            no_cuda: true,
            seed: Some(5),
            ..Default::default()
        }
    }

    /// Builds a trainer over three 40x40 images per split. The returned
    /// directories must outlive the trainer.
    pub(super) fn small_trainer(
        config: TrainingConfig,
    ) -> ((TempDir, TempDir), Trainer) {
        let data = TempDir::new().unwrap();
        let results = TempDir::new().unwrap();

        for split in ["train", "test"] {
            let dir = data.path().join(split);
            fs::create_dir_all(&dir).unwrap();
            for index in 0..3 {
                let value = 50 + index as u8 * 60;
                RgbImage::from_pixel(40, 40, Rgb([value, value / 2, 255 - value]))
                    .save(dir.join(format!("{}.png", index)))
                    .unwrap();
            }
        }

        let trainer = Trainer::new(config, data.path(), results.path()).unwrap();
        ((data, results), trainer)
    }

    fn due_steps(budget: usize, period: usize) -> Vec<usize> {
        let mut counter = StepCounter::new(budget);
        let mut steps = vec![];
        while !counter.is_done() {
            counter.advance();
            if counter.is_due(period) {
                steps.push(counter.step());
            }
        }
        steps
    }

    #[test]
    fn counter_stops_exactly_at_budget() {
        let mut counter = StepCounter::new(4);
        let mut processed = 0;
        while !counter.is_done() {
            counter.advance();
            processed += 1;
        }
        assert_eq!(processed, 4);
        assert_eq!(counter.step(), 4);
    }

    #[test]
    fn zero_budget_runs_no_step() {
        assert!(StepCounter::new(0).is_done());
    }

    #[test]
    fn cadence_hits_multiples_of_period() {
        assert_eq!(due_steps(10, 3), vec![3, 6, 9]);
        // the final step counts when the budget is a multiple of the period
        assert_eq!(due_steps(9, 3), vec![3, 6, 9]);
        assert_eq!(due_steps(5, 1), vec![1, 2, 3, 4, 5]);
        assert_eq!(due_steps(2, 3), Vec::<usize>::new());
    }

    #[test]
    fn zero_period_disables_cadence() {
        assert!(due_steps(10, 0).is_empty());
    }
}
