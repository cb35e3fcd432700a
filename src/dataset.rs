use crate::{common::*, utils::decode_image};
use crossbeam::channel::{self, Receiver};

/// A directory of images, loaded as square RGB crops of side `image_size`.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    image_paths: Vec<PathBuf>,
    image_size: usize,
}

impl ImageDataset {
    pub fn open<P>(dir: P, image_size: usize) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        ensure!(image_size > 0, "image size must be positive");

        let dir_str = dir
            .to_str()
            .ok_or_else(|| format_err!("non-UTF-8 dataset path {}", dir.display()))?;
        let pattern = format!("{}/*", glob::Pattern::escape(dir_str));

        let image_paths = glob::glob(&pattern)?
            .map(|entry| -> Fallible<PathBuf> { Ok(entry?) })
            .filter_ok(|path: &PathBuf| path.is_file() && ImageFormat::from_path(path).is_ok())
            .collect::<Fallible<Vec<_>>>()?
            .into_iter()
            .sorted()
            .collect_vec();

        ensure!(
            !image_paths.is_empty(),
            "no images found in {}",
            dir.display()
        );

        Ok(Self {
            image_paths,
            image_size,
        })
    }

    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    pub fn image_paths(&self) -> &[PathBuf] {
        &self.image_paths
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Loads one image: the shorter side is resized to `image_size`, then a random
    /// square of `image_size` is cropped. Returns a `[3, size, size]` tensor in [0, 1].
    pub fn load<R>(&self, index: usize, rng: &mut R) -> Fallible<Tensor>
    where
        R: Rng,
    {
        let path = &self.image_paths[index];
        let image = decode_image(path)?.to_rgb8();
        let size = self.image_size as u32;

        let (width, height) = image.dimensions();
        ensure!(
            width > 0 && height > 0,
            "image {} is empty",
            path.display()
        );
        let (resized_w, resized_h) = if width <= height {
            let resized_h = (size as u64 * height as u64 / width as u64).max(size as u64);
            (size, resized_h as u32)
        } else {
            let resized_w = (size as u64 * width as u64 / height as u64).max(size as u64);
            (resized_w as u32, size)
        };
        let resized = image::imageops::resize(&image, resized_w, resized_h, FilterType::Triangle);

        let left = rng.gen_range(0..=(resized_w - size));
        let top = rng.gen_range(0..=(resized_h - size));
        let cropped = image::imageops::crop_imm(&resized, left, top, size, size).to_image();

        let tensor = Tensor::of_slice(cropped.as_raw())
            .view([size as i64, size as i64, 3])
            .permute(&[2, 0, 1])
            .to_kind(Kind::Float)
            / 255.0;
        Ok(tensor)
    }

    /// Loads the images at `indexes` in parallel and stacks them into a
    /// `[batch, 3, size, size]` tensor.
    pub fn load_batch<R>(&self, indexes: &[usize], rng: &mut R) -> Fallible<Tensor>
    where
        R: Rng,
    {
        ensure!(!indexes.is_empty(), "cannot load an empty batch");

        let seeds = indexes.iter().map(|_| rng.gen::<u64>()).collect_vec();
        let images = indexes
            .par_iter()
            .zip(seeds.into_par_iter())
            .map(|(&index, seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                self.load(index, &mut rng)
            })
            .collect::<Fallible<Vec<_>>>()?;

        Ok(Tensor::stack(&images, 0))
    }

    /// Draws `min(batch_size, len)` images uniformly with replacement.
    pub fn sample_random_batch<R>(&self, batch_size: usize, rng: &mut R) -> Fallible<Tensor>
    where
        R: Rng,
    {
        let count = batch_size.min(self.len());
        let indexes = (0..count)
            .map(|_| rng.gen_range(0..self.len()))
            .collect_vec();
        self.load_batch(&indexes, rng)
    }
}

/// Training batches prefetched by a background loader thread.
///
/// The stream never ends by itself; the consumer decides when to stop. Dropping the
/// stream shuts the loader down.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BatchStream {
    #[derivative(Debug = "ignore")]
    rx: Option<Receiver<Fallible<Tensor>>>,
    #[derivative(Debug = "ignore")]
    handle: Option<thread::JoinHandle<()>>,
}

impl BatchStream {
    /// Starts a loader thread that walks the dataset epoch after epoch, reshuffling
    /// each epoch when `shuffle` is set. Up to `prefetch` batches are decoded ahead.
    pub fn new(
        dataset: Arc<ImageDataset>,
        batch_size: usize,
        shuffle: bool,
        prefetch: usize,
        seed: u64,
    ) -> Fallible<Self> {
        ensure!(batch_size > 0, "batch size must be positive");

        let (tx, rx) = channel::bounded(prefetch.max(1));

        let handle = thread::Builder::new()
            .name("batch_loader".into())
            .spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut indexes = (0..dataset.len()).collect_vec();

                for epoch in 0_usize.. {
                    if shuffle {
                        indexes.shuffle(&mut rng);
                    }
                    debug!("loader starts epoch {}", epoch);

                    for chunk in indexes.chunks(batch_size) {
                        let result = dataset.load_batch(chunk, &mut rng);
                        let failed = result.is_err();

                        if tx.send(result).is_err() || failed {
                            return;
                        }
                    }
                }
            })?;

        Ok(Self {
            rx: Some(rx),
            handle: Some(handle),
        })
    }

    pub fn next_batch(&mut self) -> Fallible<Tensor> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| format_err!("batch stream is closed"))?;
        let batch = rx
            .recv()
            .map_err(|_| format_err!("batch loader stopped unexpectedly"))??;
        Ok(batch)
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        // disconnect first so that a blocked loader wakes up
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("batch loader panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_images(dir: &Path, count: usize, width: u32, height: u32) {
        for index in 0..count {
            let value = (index * 40) as u8;
            RgbImage::from_pixel(width, height, Rgb([value, value, value]))
                .save(dir.join(format!("{:02}.png", index)))
                .unwrap();
        }
    }

    #[test]
    fn open_skips_non_images() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 3, 8, 8);
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let dataset = ImageDataset::open(dir.path(), 8).unwrap();
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn open_takes_glob_characters_in_dir_literally() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("shots[1]*?");
        fs::create_dir_all(&dir).unwrap();
        write_images(&dir, 2, 8, 8);

        // would match this sibling if the brackets formed a character class
        let sibling = root.path().join("shots1xy");
        fs::create_dir_all(&sibling).unwrap();
        write_images(&sibling, 3, 8, 8);

        let dataset = ImageDataset::open(&dir, 8).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.image_paths().iter().all(|path| path.starts_with(&dir)));
    }

    #[test]
    fn open_empty_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageDataset::open(dir.path(), 8).is_err());
    }

    #[test]
    fn load_resizes_and_crops() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 1, 30, 20);

        let dataset = ImageDataset::open(dir.path(), 10).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let image = dataset.load(0, &mut rng).unwrap();
        assert_eq!(image.size(), vec![3, 10, 10]);
        assert!(image.max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn random_batch_is_capped_by_dataset_size() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 3, 8, 8);

        let dataset = ImageDataset::open(dir.path(), 8).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let batch = dataset.sample_random_batch(5, &mut rng).unwrap();
        assert_eq!(batch.size(), vec![3, 3, 8, 8]);
    }

    #[test]
    fn stream_cycles_through_epochs() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 5, 8, 8);

        let dataset = Arc::new(ImageDataset::open(dir.path(), 8).unwrap());
        let mut stream = BatchStream::new(dataset, 2, false, 1, 0).unwrap();

        let sizes = (0..7)
            .map(|_| stream.next_batch().unwrap().size()[0])
            .collect_vec();
        assert_eq!(sizes, vec![2, 2, 1, 2, 2, 1, 2]);
    }

    #[test]
    fn unshuffled_stream_follows_file_order() {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path(), 3, 8, 8);

        let dataset = Arc::new(ImageDataset::open(dir.path(), 8).unwrap());
        let mut stream = BatchStream::new(dataset, 3, false, 2, 0).unwrap();

        for _ in 0..2 {
            let batch = stream.next_batch().unwrap();
            let firsts = (0..3)
                .map(|index| (batch.double_value(&[index, 0, 0, 0]) * 255.0).round() as i64)
                .collect_vec();
            assert_eq!(firsts, vec![0, 40, 80]);
        }
    }
}
