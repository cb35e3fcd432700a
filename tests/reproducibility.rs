use glcic::{
    common::*,
    config::TrainingConfig,
    train::{StepLoss, Trainer},
};
use tempfile::TempDir;

fn write_corpus(root: &Path) {
    for split in ["train", "test"] {
        let dir = root.join(split);
        fs::create_dir_all(&dir).unwrap();
        for index in 0..5_u8 {
            let value = 30 + index * 40;
            RgbImage::from_pixel(36, 44, Rgb([value, 255 - value, value / 3]))
                .save(dir.join(format!("{}.png", index)))
                .unwrap();
        }
    }
}

/// Runs all three phases and returns the last losses and final weights.
fn train(data_dir: &Path, snaperiod: usize) -> (Vec<StepLoss>, Vec<Tensor>) {
    let results = TempDir::new().unwrap();
    let config = TrainingConfig {
        tc: 3,
        td: 2,
        ttrain: 7,
        snaperiod_1: snaperiod,
        snaperiod_2: snaperiod,
        snaperiod_3: snaperiod,
        ptch_reg_w: 16,
        ptch_reg_h: 16,
        ptch_min_w: 8,
        ptch_max_w: 16,
        ptch_min_h: 8,
        ptch_max_h: 16,
        max_patches: 2,
        cn_input_size: 32,
        gd_input_size: 32,
        ld_input_size: 16,
        bsize: 2,
        no_cuda: true,
        seed: Some(7),
        ..Default::default()
    };
    let mut trainer = Trainer::new(config, data_dir, results.path()).unwrap();

    let (mut model_cn, phase_1) = trainer.phase_1().unwrap();
    let (model_cd, phase_2) = trainer.phase_2(&mut model_cn).unwrap();
    let (model_cn, model_cd, phase_3) = trainer.phase_3(model_cn, model_cd).unwrap();

    let losses = vec![phase_1.last_loss, phase_2.last_loss, phase_3.last_loss];
    let weights = model_cn
        .var_store()
        .variables()
        .into_iter()
        .chain(model_cd.var_store().variables())
        .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .map(|(_, var)| var.copy())
        .collect_vec();
    (losses, weights)
}

#[test]
fn snapshots_do_not_change_the_training_run() {
    // single threaded kernels keep reductions bitwise reproducible
    tch::set_num_threads(1);

    let data = TempDir::new().unwrap();
    write_corpus(data.path());

    let (quiet_losses, quiet_weights) = train(data.path(), 0);
    let (noisy_losses, noisy_weights) = train(data.path(), 1);

    assert_eq!(quiet_losses, noisy_losses);
    assert_eq!(quiet_weights.len(), noisy_weights.len());
    for (quiet, noisy) in quiet_weights.iter().zip(noisy_weights.iter()) {
        assert!(quiet.equal(noisy));
    }
}
