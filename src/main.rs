use glcic::{common::*, config::TrainingConfig, train::Trainer};

/// Trains a globally and locally consistent image completion model.
#[derive(Debug, FromArgs)]
struct Args {
    /// dataset directory holding "train" and "test" image folders.
    #[argh(positional)]
    data_dir: PathBuf,
    /// directory receiving config.json, snapshots and weights.
    #[argh(positional)]
    result_dir: PathBuf,
    /// a JSON5 training config; when given, the training options below are
    /// ignored.
    #[argh(option)]
    config: Option<PathBuf>,
    /// number of completion network steps in phase 1.
    #[argh(option, default = "90000")]
    tc: usize,
    /// number of discriminator steps in phase 2.
    #[argh(option, default = "10000")]
    td: usize,
    /// total number of steps over all phases.
    #[argh(option, default = "500000")]
    ttrain: usize,
    /// snapshot period of phase 1.
    #[argh(option, default = "18000")]
    snaperiod_1: usize,
    /// snapshot period of phase 2.
    #[argh(option, default = "2000")]
    snaperiod_2: usize,
    /// snapshot period of phase 3.
    #[argh(option, default = "80000")]
    snaperiod_3: usize,
    /// maximum number of holes per image.
    #[argh(option, default = "1")]
    max_patches: usize,
    /// patch region width.
    #[argh(option, default = "96")]
    ptch_reg_w: usize,
    /// patch region height.
    #[argh(option, default = "96")]
    ptch_reg_h: usize,
    /// minimum hole width.
    #[argh(option, default = "48")]
    ptch_min_w: usize,
    /// maximum hole width.
    #[argh(option, default = "96")]
    ptch_max_w: usize,
    /// minimum hole height.
    #[argh(option, default = "48")]
    ptch_min_h: usize,
    /// maximum hole height.
    #[argh(option, default = "96")]
    ptch_max_h: usize,
    /// input size of the completion network.
    #[argh(option, default = "160")]
    cn_input_size: usize,
    /// input size of the global discriminator branch.
    #[argh(option, default = "160")]
    gd_input_size: usize,
    /// input size of the local discriminator branch.
    #[argh(option, default = "96")]
    ld_input_size: usize,
    /// batch size.
    #[argh(option, default = "16")]
    bsize: usize,
    /// whether to shuffle the training set every epoch.
    #[argh(option, default = "true")]
    shuffle: bool,
    /// number of training batches decoded ahead.
    #[argh(option, default = "2")]
    prefetch: usize,
    /// run on CPU even if CUDA is available.
    #[argh(switch)]
    no_cuda: bool,
    /// random seed for reproducible runs.
    #[argh(option)]
    seed: Option<u64>,
    /// number of steps between progress messages.
    #[argh(option, default = "100")]
    log_period: usize,
    /// learning rate of the completion network.
    #[argh(option, default = "1.0")]
    lr_cn: f64,
    /// rho of the completion network optimizer.
    #[argh(option, default = "0.9")]
    rho_cn: f64,
    /// weight decay of the completion network.
    #[argh(option, default = "0.0")]
    wd_cn: f64,
    /// learning rate of the context discriminator.
    #[argh(option, default = "1.0")]
    lr_cd: f64,
    /// rho of the context discriminator optimizer.
    #[argh(option, default = "0.9")]
    rho_cd: f64,
    /// weight decay of the context discriminator.
    #[argh(option, default = "0.0")]
    wd_cd: f64,
    /// weight of the adversarial loss.
    #[argh(option, default = "4e-4")]
    alpha: f64,
    /// whether to compute the mean pixel value of the corpus instead of using 0.
    #[argh(option, default = "true")]
    comp_mpv: bool,
}

impl Args {
    fn training_config(&self) -> Fallible<TrainingConfig> {
        let flags = self.flags_config();

        if let Some(path) = &self.config {
            if flags != TrainingConfig::default() {
                warn!(
                    "training options given alongside --config are ignored in favor of {}",
                    path.display()
                );
            }
            info!("loading config from {}", path.display());
            return TrainingConfig::open(path);
        }

        Ok(flags)
    }

    fn flags_config(&self) -> TrainingConfig {
        TrainingConfig {
            tc: self.tc,
            td: self.td,
            ttrain: self.ttrain,
            snaperiod_1: self.snaperiod_1,
            snaperiod_2: self.snaperiod_2,
            snaperiod_3: self.snaperiod_3,
            max_patches: self.max_patches,
            ptch_reg_w: self.ptch_reg_w,
            ptch_reg_h: self.ptch_reg_h,
            ptch_min_w: self.ptch_min_w,
            ptch_max_w: self.ptch_max_w,
            ptch_min_h: self.ptch_min_h,
            ptch_max_h: self.ptch_max_h,
            cn_input_size: self.cn_input_size,
            gd_input_size: self.gd_input_size,
            ld_input_size: self.ld_input_size,
            bsize: self.bsize,
            shuffle: self.shuffle,
            prefetch: self.prefetch,
            no_cuda: self.no_cuda,
            seed: self.seed,
            log_period: self.log_period,
            lr_cn: self.lr_cn,
            rho_cn: self.rho_cn,
            wd_cn: self.wd_cn,
            lr_cd: self.lr_cd,
            rho_cd: self.rho_cd,
            wd_cd: self.wd_cd,
            alpha: self.alpha,
            comp_mpv: self.comp_mpv,
        }
    }
}

fn main() -> Fallible<()> {
    pretty_env_logger::init();

    // Parse arguments
    let args: Args = argh::from_env();
    let config = args.training_config()?;

    let report = Trainer::new(config, &args.data_dir, &args.result_dir)?.run()?;
    info!(
        "steps per phase: {}, {}, {}",
        report.phase_1.steps, report.phase_2.steps, report.phase_3.steps
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["glcic"], args).unwrap_or_else(|exit| panic!("{}", exit.output))
    }

    #[test]
    fn flag_defaults_match_config_defaults() {
        let args = parse(&["data", "results"]);
        assert_eq!(args.flags_config(), TrainingConfig::default());
    }

    #[test]
    fn explicit_flags_differ_from_defaults() {
        let args = parse(&["data", "results", "--tc", "5", "--shuffle", "false"]);
        let config = args.flags_config();
        assert_eq!(config.tc, 5);
        assert!(!config.shuffle);
        assert_ne!(config, TrainingConfig::default());
    }

    #[test]
    fn config_file_takes_precedence_over_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json5");
        fs::write(&path, "{ Tc: 11 }").unwrap();
        let path = path.to_str().unwrap();

        let args = parse(&["data", "results", "--config", path, "--tc", "5"]);
        let config = args.training_config().unwrap();
        assert_eq!(config.tc, 11);
    }
}
