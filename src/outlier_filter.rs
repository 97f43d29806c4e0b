use kd_tree::KdTree;
use log::info;
use rayon::prelude::*;
use vek::Vec3;

use crate::error::{ConvertError, Result};

/// Removes points from a cloud. Implementations return the indices to keep,
/// ascending and within `[0, coordinates.len())`.
///
/// Filtering is blocking and CPU bound. There is no cancellation or timeout.
pub trait PointFilter: Sync {
    fn filter(
        &self,
        coordinates: &[Vec3<f32>],
        neighbor_count: usize,
        std_ratio: f32,
    ) -> Result<Vec<usize>>;
}

/// Statistical outlier removal: a point is kept when its mean distance to its
/// `neighbor_count` nearest neighbors is below the global mean of that quantity
/// plus `std_ratio` standard deviations.
///
/// The neighbor set includes the point itself at distance zero. When every mean
/// distance is equal the deviation is zero and all points are kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatisticalOutlierFilter;

impl StatisticalOutlierFilter {
    pub fn new() -> Self {
        Self
    }
}

fn mean_and_std(values: &[f32]) -> (f32, f32) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    if n == 1 {
        return (mean as f32, 0.0);
    }
    let squares: f64 = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
    (mean as f32, (squares / (n - 1) as f64).sqrt() as f32)
}

impl PointFilter for StatisticalOutlierFilter {
    fn filter(
        &self,
        coordinates: &[Vec3<f32>],
        neighbor_count: usize,
        std_ratio: f32,
    ) -> Result<Vec<usize>> {
        if !std_ratio.is_finite() || std_ratio < 0.0 {
            return Err(ConvertError::Filter(format!(
                "std_ratio must be a non-negative number, got {}",
                std_ratio
            )));
        }
        if coordinates.len() <= 1 || neighbor_count == 0 {
            return Ok((0..coordinates.len()).collect());
        }

        let points: Vec<[f32; 3]> = coordinates.iter().map(|p| p.into_array()).collect();
        let tree = KdTree::build_by_ordered_float(points.clone());

        let mean_distances: Vec<f32> = points
            .par_iter()
            .map(|query| {
                let neighbors = tree.nearests(query, neighbor_count);
                let total: f32 = neighbors.iter().map(|n| n.squared_distance.sqrt()).sum();
                total / neighbors.len().max(1) as f32
            })
            .collect();

        let (mean, std) = mean_and_std(&mean_distances);
        if std == 0.0 {
            return Ok((0..coordinates.len()).collect());
        }
        let threshold = mean + std_ratio * std;
        let kept: Vec<usize> = mean_distances
            .iter()
            .enumerate()
            .filter(|(_, &d)| d < threshold)
            .map(|(i, _)| i)
            .collect();

        info!(
            "Outlier removal kept {} of {} points (threshold {:.6})",
            kept.len(),
            coordinates.len(),
            threshold
        );
        Ok(kept)
    }
}
