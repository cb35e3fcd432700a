use crate::common::*;

/// Every tunable quantity of a training run.
///
/// Keys are spelled like the command line flags, so a `config.json` written by
/// one run can be fed back with `--config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // step budgets
    #[serde(rename = "Tc")]
    pub tc: usize,
    #[serde(rename = "Td")]
    pub td: usize,
    #[serde(rename = "Ttrain")]
    pub ttrain: usize,
    // snapshot cadences
    pub snaperiod_1: usize,
    pub snaperiod_2: usize,
    pub snaperiod_3: usize,
    // region sampling
    pub max_patches: usize,
    pub ptch_reg_w: usize,
    pub ptch_reg_h: usize,
    pub ptch_min_w: usize,
    pub ptch_max_w: usize,
    pub ptch_min_h: usize,
    pub ptch_max_h: usize,
    // network input resolutions
    pub cn_input_size: usize,
    pub gd_input_size: usize,
    pub ld_input_size: usize,
    // data
    pub bsize: usize,
    pub shuffle: bool,
    pub prefetch: usize,
    // execution
    pub no_cuda: bool,
    pub seed: Option<u64>,
    pub log_period: usize,
    // optimizers
    pub lr_cn: f64,
    pub rho_cn: f64,
    pub wd_cn: f64,
    pub lr_cd: f64,
    pub rho_cd: f64,
    pub wd_cd: f64,
    // loss
    pub alpha: f64,
    pub comp_mpv: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            tc: 90000,
            td: 10000,
            ttrain: 500000,
            snaperiod_1: 18000,
            snaperiod_2: 2000,
            snaperiod_3: 80000,
            max_patches: 1,
            ptch_reg_w: 96,
            ptch_reg_h: 96,
            ptch_min_w: 48,
            ptch_max_w: 96,
            ptch_min_h: 48,
            ptch_max_h: 96,
            cn_input_size: 160,
            gd_input_size: 160,
            ld_input_size: 96,
            bsize: 16,
            shuffle: true,
            prefetch: 2,
            no_cuda: false,
            seed: None,
            log_period: 100,
            lr_cn: 1.0,
            rho_cn: 0.9,
            wd_cn: 0.0,
            lr_cd: 1.0,
            rho_cd: 0.9,
            wd_cd: 0.0,
            alpha: 4e-4,
            comp_mpv: true,
        }
    }
}

impl TrainingConfig {
    pub fn open<P>(path: P) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Number of joint adversarial steps, `Ttrain - (Tc + Td)`.
    pub fn phase_3_steps(&self) -> usize {
        self.ttrain.saturating_sub(self.tc + self.td)
    }

    pub fn device(&self) -> Device {
        if self.no_cuda {
            return Device::Cpu;
        }
        let device = Device::cuda_if_available();
        if device == Device::Cpu {
            warn!("CUDA is not available, falling back to CPU");
        }
        device
    }

    /// Rejects settings that would make the networks or the region sampler
    /// inconsistent with each other.
    pub fn validate(&self) -> Fallible<()> {
        ensure!(
            self.ttrain >= self.tc + self.td,
            "Ttrain ({}) must be at least Tc + Td ({})",
            self.ttrain,
            self.tc + self.td
        );
        ensure!(self.bsize >= 1, "bsize must be at least 1");
        ensure!(self.max_patches >= 1, "max_patches must be at least 1");
        ensure!(
            self.ptch_min_w >= 1 && self.ptch_min_w <= self.ptch_max_w,
            "invalid hole width range [{}, {}]",
            self.ptch_min_w,
            self.ptch_max_w
        );
        ensure!(
            self.ptch_min_h >= 1 && self.ptch_min_h <= self.ptch_max_h,
            "invalid hole height range [{}, {}]",
            self.ptch_min_h,
            self.ptch_max_h
        );
        ensure!(
            self.cn_input_size >= 4 && self.cn_input_size % 4 == 0,
            "cn_input_size ({}) must be a positive multiple of 4",
            self.cn_input_size
        );
        ensure!(
            self.gd_input_size == self.cn_input_size,
            "gd_input_size ({}) must equal cn_input_size ({})",
            self.gd_input_size,
            self.cn_input_size
        );
        ensure!(
            self.ld_input_size == self.ptch_reg_w && self.ld_input_size == self.ptch_reg_h,
            "ld_input_size ({}) must equal the patch region size ({}x{})",
            self.ld_input_size,
            self.ptch_reg_w,
            self.ptch_reg_h
        );
        Ok(())
    }
}

/// The record persisted as `config.json` before phase 1.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot<'a> {
    pub data_dir: &'a Path,
    pub result_dir: &'a Path,
    #[serde(flatten)]
    pub config: &'a TrainingConfig,
    pub mean_pv: f64,
}

impl ConfigSnapshot<'_> {
    pub fn save<P>(&self, path: P) -> Fallible<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }
}
