//! Morphological cleanup of the occupancy grid.
//!
//! This is step 3 in the pipeline, in fixed order: dilation, erosion,
//! closing, then Gaussian blur and re-threshold. Dilation bridges
//! sampling gaps along walls, erosion removes the resulting bulk, closing
//! reconnects narrow breaks and the blur merges nearby blobs so a
//! single contour can be traced around them.
//!
//! Every operator treats cells outside the grid as empty. The grid is
//! temporarily padded with empty cells before each operator and cropped
//! back afterwards, so the output always has the input's dimensions.

use image::{GrayImage, Luma, imageops};
use imageproc::distance_transform::Norm;

use crate::raster::{OCCUPIED, OccupancyGrid};
use crate::types::PipelineConfig;

/// Iteration counts and blur settings for [`clean`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanupParams {
    pub dilate: u8,
    pub erode: u8,
    pub close: u8,
    pub blur_sigma: f32,
    pub threshold: f32,
}

impl From<&PipelineConfig> for CleanupParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            dilate: config.dilate_iterations,
            erode: config.erode_iterations,
            close: config.close_iterations,
            blur_sigma: config.blur_sigma,
            threshold: config.threshold,
        }
    }
}

/// Run the full cleanup sequence. Steps with a zero count or sigma are
/// skipped.
#[must_use = "returns the cleaned grid"]
pub fn clean(grid: &OccupancyGrid, params: CleanupParams) -> OccupancyGrid {
    let mut image = grid.image().clone();
    if params.dilate > 0 {
        image = dilate(&image, params.dilate);
    }
    if params.erode > 0 {
        image = erode(&image, params.erode);
    }
    if params.close > 0 {
        image = close(&image, params.close);
    }
    if params.blur_sigma > 0.0 {
        image = blur_threshold(&image, params.blur_sigma, params.threshold);
    }

    let cleaned = grid.with_image(image);
    tracing::info!(
        before = grid.occupied_count(),
        after = cleaned.occupied_count(),
        "cleaned occupancy grid"
    );
    cleaned
}

/// Binary dilation by `k` iterations of the 4-connected cross.
///
/// `k` iterations of the cross equal one pass with an L1 ball of
/// radius `k`.
#[must_use = "returns the dilated image"]
pub fn dilate(image: &GrayImage, k: u8) -> GrayImage {
    with_margin(image, u32::from(k), |padded| {
        imageproc::morphology::dilate(padded, Norm::L1, k)
    })
}

/// Binary erosion by `k` iterations of the 4-connected cross.
#[must_use = "returns the eroded image"]
pub fn erode(image: &GrayImage, k: u8) -> GrayImage {
    with_margin(image, u32::from(k), |padded| {
        imageproc::morphology::erode(padded, Norm::L1, k)
    })
}

/// Binary closing: dilation then erosion, both by `k` iterations.
#[must_use = "returns the closed image"]
pub fn close(image: &GrayImage, k: u8) -> GrayImage {
    with_margin(image, u32::from(k), |padded| {
        let dilated = imageproc::morphology::dilate(padded, Norm::L1, k);
        imageproc::morphology::erode(&dilated, Norm::L1, k)
    })
}

/// Gaussian blur of the 0/1 mask followed by a strict threshold.
///
/// A cell stays occupied iff its smoothed value is greater than
/// `threshold` (0..1). Non-positive sigma returns the image unchanged,
/// since `imageproc`'s blur panics on `sigma <= 0.0`.
#[must_use = "returns the re-thresholded image"]
pub fn blur_threshold(image: &GrayImage, sigma: f32, threshold: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let margin = (3.0 * sigma).ceil() as u32;
    with_margin(image, margin, |padded| {
        let mut blurred = imageproc::filter::gaussian_blur_f32(padded, sigma);
        let cutoff = threshold * f32::from(OCCUPIED);
        for px in blurred.pixels_mut() {
            *px = Luma([if f32::from(px.0[0]) > cutoff { OCCUPIED } else { 0 }]);
        }
        blurred
    })
}

/// Run `op` on `image` surrounded by `margin` empty cells, then crop the
/// margin away.
fn with_margin(
    image: &GrayImage,
    margin: u32,
    op: impl FnOnce(&GrayImage) -> GrayImage,
) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut padded = GrayImage::new(w + 2 * margin, h + 2 * margin);
    imageops::replace(&mut padded, image, i64::from(margin), i64::from(margin));
    let out = op(&padded);
    imageops::crop_imm(&out, margin, margin, w, h).to_image()
}
