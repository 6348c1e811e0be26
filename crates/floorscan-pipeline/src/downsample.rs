//! Voxel-grid downsampling of the input cloud.
//!
//! Runs before height selection. Dense scans often carry millions of
//! points per square metre of wall; one representative per voxel is
//! plenty for a grid a few centimetres across.

use std::collections::HashMap;

use crate::types::{Point3, PointCloud, Rgb};

#[derive(Default)]
struct Accumulator {
    sum: [f64; 3],
    color: [u64; 3],
    count: u32,
}

/// Replace the points in each occupied voxel of edge `voxel_size` by
/// their centroid (and mean color, when the cloud has colors).
///
/// Voxels appear in the output in the order their first point appears
/// in the input. A non-positive or non-finite size returns the cloud
/// unchanged.
#[must_use = "returns a new cloud; the original is unchanged"]
pub fn voxel_downsample(cloud: &PointCloud, voxel_size: f64) -> PointCloud {
    if !(voxel_size.is_finite() && voxel_size > 0.0) {
        return cloud.clone();
    }
    let inv = voxel_size.recip();

    let mut slots: HashMap<(i64, i64, i64), usize> = HashMap::new();
    let mut voxels: Vec<Accumulator> = Vec::new();

    for (i, p) in cloud.points().iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let key = (
            (p.x * inv).floor() as i64,
            (p.y * inv).floor() as i64,
            (p.z * inv).floor() as i64,
        );
        let slot = *slots.entry(key).or_insert_with(|| {
            voxels.push(Accumulator::default());
            voxels.len() - 1
        });
        let acc = &mut voxels[slot];
        acc.sum[0] += p.x;
        acc.sum[1] += p.y;
        acc.sum[2] += p.z;
        acc.count += 1;
        if let Some(colors) = cloud.colors() {
            for (total, channel) in acc.color.iter_mut().zip(colors[i]) {
                *total += u64::from(channel);
            }
        }
    }

    let points: Vec<Point3> = voxels
        .iter()
        .map(|acc| {
            let n = f64::from(acc.count);
            Point3::new(acc.sum[0] / n, acc.sum[1] / n, acc.sum[2] / n)
        })
        .collect();

    tracing::debug!(
        before = cloud.len(),
        after = points.len(),
        voxel_size,
        "voxel downsample"
    );

    if cloud.colors().is_none() {
        return PointCloud::new(points);
    }
    let colors: Vec<Rgb> = voxels
        .iter()
        .map(|acc| {
            let n = u64::from(acc.count);
            #[allow(clippy::cast_possible_truncation)]
            acc.color.map(|total| (total / n) as u8)
        })
        .collect();
    PointCloud::with_colors(points.clone(), colors).unwrap_or_else(|| PointCloud::new(points))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn points_in_one_voxel_collapse_to_centroid() {
        let cloud = PointCloud::new(vec![
            Point3::new(0.01, 0.01, 0.01),
            Point3::new(0.03, 0.05, 0.07),
            Point3::new(1.05, 0.0, 0.0),
        ]);
        let out = voxel_downsample(&cloud, 0.1);
        assert_eq!(out.len(), 2);
        let c = out.points()[0];
        assert!((c.x - 0.02).abs() < 1e-12);
        assert!((c.y - 0.03).abs() < 1e-12);
        assert!((c.z - 0.04).abs() < 1e-12);
        assert!((out.points()[1].x - 1.05).abs() < 1e-12);
    }

    #[test]
    fn negative_coordinates_use_floor() {
        let cloud = PointCloud::new(vec![Point3::new(-0.01, 0.0, 0.0), Point3::new(0.01, 0.0, 0.0)]);
        assert_eq!(voxel_downsample(&cloud, 0.1).len(), 2);
    }

    #[test]
    fn colors_are_averaged() {
        let cloud = PointCloud::with_colors(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.01, 0.0, 0.0)],
            vec![[100, 0, 255], [200, 10, 255]],
        )
        .unwrap();
        let out = voxel_downsample(&cloud, 0.1);
        assert_eq!(out.colors().unwrap(), &[[150, 5, 255]]);
    }

    #[test]
    fn zero_size_is_a_no_op() {
        let cloud = PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0); 4]);
        assert_eq!(voxel_downsample(&cloud, 0.0), cloud);
    }
}
