pub use anyhow::{ensure, format_err, Context, Result as Fallible};
pub use argh::FromArgs;
pub use derivative::Derivative;
pub use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgb, RgbImage};
pub use itertools::Itertools;
pub use log::{debug, info, warn};
pub use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
pub use rayon::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Instant,
};
pub use tch::{
    nn::{self, ConvConfig, ConvTransposeConfig, ModuleT, VarStore},
    Device, Kind, Reduction, Tensor,
};
