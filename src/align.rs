use crate::enums::Precision;
use crate::volume::Volume;

use ndarray::Axis;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Spacing {found:?} does not match the ensemble reference {expected:?}")]
    SpacingMismatch {
        expected: (f32, f32, f32),
        found: (f32, f32, f32),
    },

    #[error("Dimensions {found:?} do not match the ensemble reference {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

/// Normalize one dose plan onto the ensemble's shared coordinate frame.
///
/// The volume is translated so its lower-left extent corner maps to index
/// (0, 0, 0) with origin (0, 0, 0), scalars are retyped to the requested
/// precision, and the ingestion-time Y-axis flip is applied so all members
/// share orientation. The input is left unmodified; a member whose spacing
/// disagrees with the reference is rejected, not coerced.
///
/// Aligning an already aligned volume returns it unchanged.
pub fn align(
    volume: &Volume,
    reference_spacing: (f32, f32, f32),
    precision: Precision,
) -> Result<Volume, AlignError> {
    if volume.spacing != reference_spacing {
        return Err(AlignError::SpacingMismatch {
            expected: reference_spacing,
            found: volume.spacing,
        });
    }
    if volume.aligned {
        return Ok(volume.clone());
    }

    let mut data = volume.data.clone();
    // The exporter writes dose grids with the Y axis inverted.
    data.invert_axis(Axis(1));
    if matches!(precision, Precision::Byte) {
        data.mapv_inplace(|v| v.clamp(0, 255));
    }

    let (nz, ny, nx) = data.dim();
    Ok(Volume {
        data,
        spacing: volume.spacing,
        origin: (0.0, 0.0, 0.0),
        extent: [0, nx as i32 - 1, 0, ny as i32 - 1, 0, nz as i32 - 1],
        aligned: true,
    })
}

/// Align every member of a raw ensemble against the first member's grid.
///
/// # Errors
///
/// A member with mismatching spacing or dimensions fails the whole call;
/// the caller decides whether to drop the member and retry.
pub fn align_members(
    volumes: &[Volume],
    reference_spacing: (f32, f32, f32),
    precision: Precision,
) -> Result<Vec<Volume>, AlignError> {
    let mut aligned = Vec::with_capacity(volumes.len());
    let mut reference_dim = None;
    for volume in volumes {
        let expected = *reference_dim.get_or_insert(volume.dim());
        if volume.dim() != expected {
            return Err(AlignError::DimensionMismatch {
                expected,
                found: volume.dim(),
            });
        }
        aligned.push(align(volume, reference_spacing, precision)?);
    }
    Ok(aligned)
}
