use crate::volume::{Ensemble, Volume};

use ndarray::{Array3, Zip};
use rayon::prelude::*;

/// Per-voxel statistic fields derived from one ensemble.
///
/// Fields share the ensemble grid and are read-only once computed; they are
/// rebuilt only when the ensemble membership changes.
#[derive(Clone, Debug)]
pub struct EnsembleStatistics {
    pub mean: Volume,
    pub std: Volume,
    pub min: Volume,
    pub max: Volume,
}

/// Fold N aligned dose plans into mean/std/min/max fields.
///
/// Accumulation runs in f64 and the result is rounded back to the plan's
/// integer scale. Variance is the population variance (division by N), so a
/// single-member ensemble yields std == 0 and min == max == mean everywhere.
/// The fold is commutative: member order does not change the result beyond
/// floating rounding.
pub fn aggregate(ensemble: &Ensemble) -> EnsembleStatistics {
    let reference = ensemble.reference();
    let dim = reference.dim();
    let n = ensemble.len() as f64;

    let mut sum = Array3::<f64>::zeros(dim);
    for member in ensemble.members() {
        Zip::from(&mut sum)
            .and(&member.data)
            .par_for_each(|acc, &v| *acc += f64::from(v));
    }
    let mean_field = sum.mapv(|s| s / n);

    let mut squared_deviation = Array3::<f64>::zeros(dim);
    for member in ensemble.members() {
        Zip::from(&mut squared_deviation)
            .and(&member.data)
            .and(&mean_field)
            .par_for_each(|acc, &v, &mu| {
                let delta = f64::from(v) - mu;
                *acc += delta * delta;
            });
    }
    let std_field = squared_deviation.mapv(|s| (s / n).sqrt());

    let mut min_field = ensemble.reference().data.clone();
    let mut max_field = ensemble.reference().data.clone();
    for member in ensemble.members() {
        Zip::from(&mut min_field)
            .and(&member.data)
            .par_for_each(|acc, &v| *acc = (*acc).min(v));
        Zip::from(&mut max_field)
            .and(&member.data)
            .par_for_each(|acc, &v| *acc = (*acc).max(v));
    }

    EnsembleStatistics {
        mean: derived(reference, mean_field.mapv(|v| v.round() as i32)),
        std: derived(reference, std_field.mapv(|v| v.round() as i32)),
        min: derived(reference, min_field),
        max: derived(reference, max_field),
    }
}

fn derived(reference: &Volume, data: Array3<i32>) -> Volume {
    Volume {
        data,
        spacing: reference.spacing,
        origin: reference.origin,
        extent: reference.extent,
        aligned: reference.aligned,
    }
}

/// Scalar range over the non-zero voxels of a field.
///
/// Zero marks "outside the dose grid" in exported plans, so color tables are
/// scaled to the dosed region only. Returns `None` for an all-zero field.
pub fn scalar_range_nonzero(volume: &Volume) -> Option<(i32, i32)> {
    match volume.data.as_slice() {
        Some(values) => values
            .par_iter()
            .copied()
            .filter(|&v| v != 0)
            .map(|v| (v, v))
            .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1))),
        None => volume
            .data
            .iter()
            .copied()
            .filter(|&v| v != 0)
            .map(|v| (v, v))
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1))),
    }
}
