//! Elevation band selection.
//!
//! This is step 1 in the pipeline: pick which 3D points take part in
//! the 2D projection. A horizontal slice through the walls gives a much
//! cleaner outline than projecting furniture, floor and ceiling together.

use serde::{Deserialize, Serialize};

use crate::types::{DataStage, PipelineConfig, PipelineError, PointCloud};

/// Fewest points a boundary or hull can be built from.
pub const MIN_POINTS: usize = 3;

/// How the elevation band is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HeightMode {
    /// Slice centred on a fixed height.
    Explicit { height: f64 },

    /// Slice centred `offset` metres above the estimated floor.
    AutoFromFloor { offset: f64 },

    /// No slicing: every point is projected.
    #[default]
    FullProjection,
}

impl HeightMode {
    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        match *self {
            Self::Explicit { height } if !height.is_finite() => Err(PipelineError::InvalidConfig(
                format!("explicit height must be finite, got {height}"),
            )),
            Self::AutoFromFloor { offset } if !offset.is_finite() => {
                Err(PipelineError::InvalidConfig(format!(
                    "floor offset must be finite, got {offset}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A half-open height interval `[z_lo, z_hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationBand {
    pub z_lo: f64,
    pub z_hi: f64,
}

impl ElevationBand {
    /// A band of `thickness` centred on `height`.
    #[must_use]
    pub fn centered(height: f64, thickness: f64) -> Self {
        Self {
            z_lo: height - thickness / 2.0,
            z_hi: height + thickness / 2.0,
        }
    }

    /// Returns `true` if `z` falls inside the band.
    #[must_use]
    pub fn contains(&self, z: f64) -> bool {
        self.z_lo <= z && z < self.z_hi
    }

    #[must_use]
    pub fn center(&self) -> f64 {
        f64::midpoint(self.z_lo, self.z_hi)
    }
}

/// The points chosen for projection, with the band that chose them.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// `None` when every point was projected.
    pub band: Option<ElevationBand>,
    pub cloud: PointCloud,
}

/// The `p`-th percentile (0..=100) of `values`, interpolating linearly
/// between the closest ranks.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - rank.floor();
    Some(frac.mul_add(sorted[hi] - sorted[lo], sorted[lo]))
}

/// Choose the elevation band for `cloud`.
///
/// Returns `Ok(None)` for [`HeightMode::FullProjection`].
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientData`] if the cloud is empty.
pub fn select_band(
    cloud: &PointCloud,
    mode: HeightMode,
    thickness: f64,
    floor_percentile: f64,
) -> Result<Option<ElevationBand>, PipelineError> {
    let heights = cloud.heights();
    let Some(floor) = percentile(&heights, floor_percentile) else {
        return Err(PipelineError::InsufficientData {
            stage: DataStage::PointCloud,
            found: 0,
            required: MIN_POINTS,
        });
    };

    let height = match mode {
        HeightMode::FullProjection => return Ok(None),
        HeightMode::Explicit { height } => height,
        HeightMode::AutoFromFloor { offset } => {
            tracing::info!(floor, slice_height = floor + offset, "estimated floor height");
            floor + offset
        }
    };
    Ok(Some(ElevationBand::centered(height, thickness)))
}

/// Apply the height-selection stage: ceiling cut, band choice and
/// filtering.
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientData`] if the cloud is empty or
/// fewer than [`MIN_POINTS`] points remain after filtering.
pub fn select_points(
    cloud: &PointCloud,
    config: &PipelineConfig,
) -> Result<Slice, PipelineError> {
    if cloud.is_empty() {
        return Err(PipelineError::InsufficientData {
            stage: DataStage::PointCloud,
            found: 0,
            required: MIN_POINTS,
        });
    }

    let without_ceiling;
    let cloud = match config.ceiling_percentile {
        Some(p) => {
            let cutoff = percentile(&cloud.heights(), p).unwrap_or(f64::INFINITY);
            without_ceiling = cloud.filter(|pt| pt.z < cutoff);
            tracing::debug!(
                cutoff,
                kept = without_ceiling.len(),
                dropped = cloud.len() - without_ceiling.len(),
                "removed ceiling points"
            );
            require(&without_ceiling, DataStage::CeilingCut)?;
            &without_ceiling
        }
        None => cloud,
    };

    let band = select_band(
        cloud,
        config.height_mode,
        config.slice_thickness,
        config.floor_percentile,
    )?;

    let selected = match band {
        Some(band) => {
            let sliced = cloud.filter(|pt| band.contains(pt.z));
            tracing::info!(
                z_lo = band.z_lo,
                z_hi = band.z_hi,
                points = sliced.len(),
                "sliced elevation band"
            );
            if sliced.len() < MIN_POINTS {
                for (z, count) in density_peaks(cloud, 100, 10, 50) {
                    tracing::warn!(height = z, count, "candidate slice height");
                }
            }
            require(&sliced, DataStage::ElevationBand)?;
            sliced
        }
        None => {
            require(cloud, DataStage::PointCloud)?;
            cloud.clone()
        }
    };

    Ok(Slice {
        band,
        cloud: selected,
    })
}

fn require(cloud: &PointCloud, stage: DataStage) -> Result<(), PipelineError> {
    if cloud.len() < MIN_POINTS {
        return Err(PipelineError::InsufficientData {
            stage,
            found: cloud.len(),
            required: MIN_POINTS,
        });
    }
    Ok(())
}

/// The most populated heights of `cloud`, as `(bin centre, count)` in
/// descending count order.
///
/// Builds a `bins`-bin histogram over the z range, keeps the `top`
/// fullest bins and drops those with `min_count` points or fewer. Useful
/// for suggesting an explicit slice height when a band came up empty.
#[must_use]
pub fn density_peaks(
    cloud: &PointCloud,
    bins: usize,
    top: usize,
    min_count: usize,
) -> Vec<(f64, usize)> {
    let heights = cloud.heights();
    if heights.is_empty() || bins == 0 {
        return Vec::new();
    }
    let lo = heights.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = heights.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    #[allow(clippy::cast_precision_loss)]
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counts = vec![0_usize; bins];
    for z in heights {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = (((z - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    let mut ranked: Vec<(usize, usize)> = counts.into_iter().enumerate().collect();
    // Stable sort keeps lower bins first among equal counts.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(top)
        .filter(|&(_, count)| count > min_count)
        .map(|(bin, count)| {
            #[allow(clippy::cast_precision_loss)]
            let center = (bin as f64 + 0.5).mul_add(width, lo);
            (center, count)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Point3;

    fn column(heights: &[f64]) -> PointCloud {
        PointCloud::new(
            heights
                .iter()
                .enumerate()
                .map(|(i, &z)| {
                    #[allow(clippy::cast_precision_loss)]
                    let x = i as f64;
                    Point3::new(x, 0.0, z)
                })
                .collect(),
        )
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!((percentile(&values, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 100.0).unwrap() - 4.0).abs() < 1e-12);
        assert!((percentile(&values, 50.0).unwrap() - 2.5).abs() < 1e-12);
        // rank 0.15 between 1.0 and 2.0
        assert!((percentile(&values, 5.0).unwrap() - 1.15).abs() < 1e-12);
    }

    #[test]
    fn percentile_of_empty_is_none() {
        assert!(percentile(&[], 5.0).is_none());
    }

    #[test]
    fn band_is_half_open() {
        let band = ElevationBand::centered(1.0, 0.1);
        assert!(band.contains(0.95));
        assert!(band.contains(1.0));
        assert!(!band.contains(1.05));
        assert!((band.center() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn full_projection_selects_no_band() {
        let cloud = column(&[0.0, 1.0, 2.0]);
        let band = select_band(&cloud, HeightMode::FullProjection, 0.1, 5.0).unwrap();
        assert!(band.is_none());
    }

    #[test]
    fn auto_mode_offsets_from_low_percentile() {
        // 100 floor points at z=0 plus a single low outlier.
        let mut heights = vec![0.0; 100];
        heights.push(-5.0);
        let cloud = column(&heights);
        let band = select_band(&cloud, HeightMode::AutoFromFloor { offset: 1.2 }, 0.1, 5.0)
            .unwrap()
            .unwrap();
        assert!((band.center() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn empty_cloud_is_insufficient() {
        let err = select_points(&PointCloud::default(), &PipelineConfig::default()).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InsufficientData {
                stage: DataStage::PointCloud,
                found: 0,
                required: 3,
            }
        );
    }

    #[test]
    fn sparse_band_is_insufficient() {
        let cloud = column(&[0.0, 0.0, 0.0, 1.0, 1.0, 2.0]);
        let config = PipelineConfig {
            height_mode: HeightMode::Explicit { height: 1.0 },
            ..PipelineConfig::default()
        };
        let err = select_points(&cloud, &config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                stage: DataStage::ElevationBand,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn explicit_band_keeps_only_slice_points() {
        let cloud = column(&[0.0, 0.97, 1.0, 1.03, 2.5]);
        let config = PipelineConfig {
            height_mode: HeightMode::Explicit { height: 1.0 },
            ..PipelineConfig::default()
        };
        let slice = select_points(&cloud, &config).unwrap();
        assert_eq!(slice.cloud.len(), 3);
        assert!(slice.band.is_some());
    }

    #[test]
    fn ceiling_cut_drops_upper_points() {
        let cloud = column(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let config = PipelineConfig {
            ceiling_percentile: Some(75.0),
            ..PipelineConfig::default()
        };
        let slice = select_points(&cloud, &config).unwrap();
        // 75th percentile is 3.0 and the cut keeps z < 3.0.
        assert_eq!(slice.cloud.len(), 3);
    }

    #[test]
    fn density_peaks_rank_fullest_bins() {
        let mut heights = vec![1.0; 80];
        heights.extend(vec![2.5; 60]);
        heights.extend(vec![0.0; 5]);
        let peaks = density_peaks(&column(&heights), 10, 10, 50);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].1, 80);
        assert_eq!(peaks[1].1, 60);
        assert!(peaks[0].0 < peaks[1].0);
    }
}
