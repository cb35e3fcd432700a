use crate::{common::*, config::TrainingConfig};

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// The rectangle seen by the local discriminator branch. Holes are confined to it.
pub type PatchRegion = Rect;

/// Per-image binary hole masks for one batch. Every hole lies inside `region`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoleMask {
    pub width: usize,
    pub height: usize,
    pub region: PatchRegion,
    pub holes: Vec<Vec<Rect>>,
}

impl HoleMask {
    pub fn batch_size(&self) -> usize {
        self.holes.len()
    }

    /// Renders the mask as a `[batch, 1, height, width]` float tensor with ones in
    /// the holes.
    ///
    /// `batch` may differ from the batch the mask was sampled for, in which case
    /// the per-image holes are reused cyclically.
    pub fn to_tensor(&self, batch: usize, device: Device) -> Tensor {
        let plane = self.width * self.height;
        let mut buf = vec![0_f32; batch * plane];

        if !self.holes.is_empty() {
            for (index, image) in buf.chunks_mut(plane).enumerate() {
                let holes = &self.holes[index % self.holes.len()];
                for hole in holes {
                    for row in hole.y..hole.bottom() {
                        let begin = row * self.width + hole.x;
                        image[begin..(begin + hole.width)].fill(1.0);
                    }
                }
            }
        }

        Tensor::of_slice(&buf)
            .view([batch as i64, 1, self.height as i64, self.width as i64])
            .to_device(device)
    }
}

/// Draws patch regions and hole masks within the configured size bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSampler {
    pub region_size: (usize, usize),
    pub hole_width: (usize, usize),
    pub hole_height: (usize, usize),
    pub max_holes: usize,
}

impl RegionSampler {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            region_size: (config.ptch_reg_w, config.ptch_reg_h),
            hole_width: (config.ptch_min_w, config.ptch_max_w),
            hole_height: (config.ptch_min_h, config.ptch_max_h),
            max_holes: config.max_patches,
        }
    }

    /// Places a region of the configured size uniformly inside a
    /// `width` x `height` image.
    pub fn patch_region<R>(
        &self,
        rng: &mut R,
        width: usize,
        height: usize,
    ) -> Fallible<PatchRegion>
    where
        R: Rng,
    {
        let (region_w, region_h) = self.region_size;
        ensure!(
            region_w >= 1 && region_h >= 1,
            "patch region size must be positive, got {}x{}",
            region_w,
            region_h
        );
        ensure!(
            region_w <= width && region_h <= height,
            "patch region {}x{} does not fit in a {}x{} image",
            region_w,
            region_h,
            width,
            height
        );

        Ok(Rect {
            x: rng.gen_range(0..=(width - region_w)),
            y: rng.gen_range(0..=(height - region_h)),
            width: region_w,
            height: region_h,
        })
    }

    /// Samples between 1 and `max_holes` holes per image, each sized within the
    /// configured ranges and placed inside `region`. Holes may overlap.
    pub fn hole_mask<R>(
        &self,
        rng: &mut R,
        batch: usize,
        width: usize,
        height: usize,
        region: &PatchRegion,
    ) -> Fallible<HoleMask>
    where
        R: Rng,
    {
        let (min_w, max_w) = self.hole_width;
        let (min_h, max_h) = self.hole_height;

        ensure!(self.max_holes >= 1, "max_patches must be at least 1");
        ensure!(
            min_w >= 1 && min_w <= max_w && min_h >= 1 && min_h <= max_h,
            "invalid hole size ranges: width [{}, {}], height [{}, {}]",
            min_w,
            max_w,
            min_h,
            max_h
        );
        ensure!(
            max_w <= region.width && max_h <= region.height,
            "hole size upper bound {}x{} exceeds the patch region {}x{}",
            max_w,
            max_h,
            region.width,
            region.height
        );
        ensure!(
            region.right() <= width && region.bottom() <= height,
            "patch region {:?} lies outside a {}x{} image",
            region,
            width,
            height
        );

        let holes = (0..batch)
            .map(|_| {
                let count = rng.gen_range(1..=self.max_holes);
                (0..count)
                    .map(|_| {
                        let hole_w = rng.gen_range(min_w..=max_w);
                        let hole_h = rng.gen_range(min_h..=max_h);
                        Rect {
                            x: rng.gen_range(region.x..=(region.right() - hole_w)),
                            y: rng.gen_range(region.y..=(region.bottom() - hole_h)),
                            width: hole_w,
                            height: hole_h,
                        }
                    })
                    .collect_vec()
            })
            .collect_vec();

        Ok(HoleMask {
            width,
            height,
            region: *region,
            holes,
        })
    }
}

/// Crops `region` out of a `[batch, channels, height, width]` tensor.
pub fn crop(images: &Tensor, region: &PatchRegion) -> Tensor {
    images
        .narrow(2, region.y as i64, region.height as i64)
        .narrow(3, region.x as i64, region.width as i64)
}
