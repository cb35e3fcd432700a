use crate::common::*;

pub fn decode_image<P>(path: P) -> Fallible<DynamicImage>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let image =
        image::open(path).with_context(|| format!("failed to decode image {}", path.display()))?;
    Ok(image)
}

/// Average normalized intensity over a corpus of images.
///
/// Each image contributes the mean of its RGB samples, and the per-image means are
/// averaged and divided by 255 to land in [0, 1].
///
/// Images are converted to 8-bit RGB first: alpha channels are dropped and 16-bit
/// samples are scaled down to 8 bits, matching what the networks are fed.
pub fn mean_pixel_value<P>(paths: &[P]) -> Fallible<f64>
where
    P: AsRef<Path> + Sync,
{
    ensure!(
        !paths.is_empty(),
        "cannot compute the mean pixel value of an empty corpus"
    );

    let means = paths
        .par_iter()
        .map(|path| {
            let image = decode_image(path)?.to_rgb8();
            let samples = image.as_raw();
            let sum: f64 = samples.iter().map(|&value| value as f64).sum();
            Ok(sum / samples.len().max(1) as f64)
        })
        .collect::<Fallible<Vec<_>>>()?;

    let mean = means.iter().sum::<f64>() / means.len() as f64;
    Ok(mean / 255.0)
}

/// Replaces the masked pixels of `images` with `fill`.
pub fn mask_images(images: &Tensor, mask: &Tensor, fill: f64) -> Tensor {
    images - images * mask + mask * fill
}

/// Pastes the network output into the holes of the input.
pub fn composite(input: &Tensor, output: &Tensor, mask: &Tensor) -> Tensor {
    input - input * mask + output * mask
}

/// Writes a `[batch, 3, height, width]` tensor in [0, 1] as one PNG grid with
/// `nrow` images per row and a 2 pixel black border.
pub fn save_image_grid<P>(images: &Tensor, nrow: usize, path: P) -> Fallible<()>
where
    P: AsRef<Path>,
{
    const PADDING: usize = 2;

    let path = path.as_ref();
    let (batch_size, channels, height, width) = images.size4()?;
    ensure!(
        channels == 3,
        "expect 3 channel images, but get {} channels",
        channels
    );
    let (batch_size, height, width) = (batch_size as usize, height as usize, width as usize);
    ensure!(batch_size > 0, "cannot save an empty image grid");

    let pixels = {
        let bytes = (images.detach().clamp(0.0, 1.0) * 255.0)
            .round()
            .to_kind(Kind::Uint8)
            .to_device(Device::Cpu)
            .permute(&[0, 2, 3, 1])
            .contiguous();
        let numel = batch_size * height * width * 3;
        let mut buf = vec![0_u8; numel];
        bytes.f_copy_data(&mut buf, numel)?;
        buf
    };

    let ncols = nrow.clamp(1, batch_size);
    let nrows = (batch_size + ncols - 1) / ncols;
    let cell_w = width + PADDING;
    let cell_h = height + PADDING;
    let mut grid = RgbImage::new(
        (ncols * cell_w + PADDING) as u32,
        (nrows * cell_h + PADDING) as u32,
    );

    for (index, image) in pixels.chunks(height * width * 3).enumerate() {
        let left = (index % ncols) * cell_w + PADDING;
        let top = (index / ncols) * cell_h + PADDING;

        for (row, line) in image.chunks(width * 3).enumerate() {
            for (col, rgb) in line.chunks(3).enumerate() {
                grid.put_pixel(
                    (left + col) as u32,
                    (top + row) as u32,
                    Rgb([rgb[0], rgb[1], rgb[2]]),
                );
            }
        }
    }

    grid.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write image {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn write_gray(dir: &Path, name: &str, value: u8, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn mean_of_uniform_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let paths = (0..3)
            .map(|index| write_gray(dir.path(), &format!("{}.png", index), 128, 12, 9))
            .collect_vec();

        let mean = mean_pixel_value(&paths).unwrap();
        assert_abs_diff_eq!(mean, 128.0 / 255.0, epsilon = 1e-12);
    }

    #[test]
    fn mean_averages_per_image_means() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write_gray(dir.path(), "dark.png", 0, 4, 4),
            write_gray(dir.path(), "bright.png", 255, 16, 16),
        ];

        let mean = mean_pixel_value(&paths).unwrap();
        assert_abs_diff_eq!(mean, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn mean_ignores_alpha_and_scales_wide_samples() {
        let dir = tempfile::tempdir().unwrap();
        let rgba = dir.path().join("rgba.png");
        image::RgbaImage::from_pixel(5, 5, image::Rgba([60, 60, 60, 0]))
            .save(&rgba)
            .unwrap();
        let wide = dir.path().join("wide.png");
        let value = 180_u16 * 257;
        image::ImageBuffer::<image::Rgb<u16>, _>::from_pixel(5, 5, image::Rgb([value; 3]))
            .save(&wide)
            .unwrap();

        let mean = mean_pixel_value(&[rgba, wide]).unwrap();
        assert_abs_diff_eq!(mean, (60.0 + 180.0) / 2.0 / 255.0, epsilon = 1e-12);
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"not an image").unwrap();
        assert!(mean_pixel_value(&[path]).is_err());
    }

    #[test]
    fn masking_fills_holes_only() {
        let images = Tensor::ones(&[1, 3, 2, 2], (Kind::Float, Device::Cpu)) * 0.8;
        let mask = Tensor::of_slice(&[1_f32, 0., 0., 1.]).view([1, 1, 2, 2]);
        let masked = mask_images(&images, &mask, 0.25);

        assert_abs_diff_eq!(masked.double_value(&[0, 1, 0, 0]), 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(masked.double_value(&[0, 2, 0, 1]), 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(masked.double_value(&[0, 0, 1, 1]), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn grid_has_padded_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.png");
        let images = Tensor::ones(&[6, 3, 4, 5], (Kind::Float, Device::Cpu));

        save_image_grid(&images, 3, &path).unwrap();

        let grid = image::open(&path).unwrap().to_rgb8();
        assert_eq!(grid.dimensions(), (3 * 7 + 2, 2 * 6 + 2));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([255, 255, 255]));
    }
}
