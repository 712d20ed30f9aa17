use crate::enums::SortBy;
use crate::volume::Volume;

use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use log::info;
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanLoadError {
    #[error("No valid dose slices found")]
    NoValidImages,

    #[error("Inconsistent slice dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Decodes one grid-structured volume file set into a [`Volume`].
///
/// This is the seam between the analysis core and the storage format: the
/// engine loads agreement-band masks through it, and tests substitute an
/// in-memory implementation.
pub trait VolumeReader {
    fn read_volume(&self, path: &Path) -> Result<Volume, PlanLoadError>;
}

/// Loads a dose plan from a directory of single-frame `.dcm` slices.
pub struct PlanLoader;

impl PlanLoader {
    /// Load a dose-plan volume from DICOM objects.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid slices are found, dimensions disagree
    /// between slices, or spacing information is missing.
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, PlanLoadError> {
        let mut slices_with_order: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_slice_with_order(dicom_object, &sort_by))
            .collect();

        if slices_with_order.is_empty() {
            return Err(PlanLoadError::NoValidImages);
        }

        Self::sort_slices(&mut slices_with_order, sort_by);

        let slices: Vec<_> = slices_with_order
            .into_iter()
            .map(|(_, slice)| slice)
            .collect();

        Self::validate_dimensions(&slices)?;

        let data = Self::build_volume_array(&slices);
        let spacing = Self::get_spacing(dicom_objects).ok_or(PlanLoadError::MissingSpacing)?;
        let origin = Self::get_origin(dicom_objects).unwrap_or_default();

        let (nz, ny, nx) = data.dim();
        info!("loaded dose plan: {nx}x{ny}x{nz} voxels, spacing {spacing:?}");
        Ok(Volume::new(data, spacing).with_geometry(
            origin,
            [0, nx as i32 - 1, 0, ny as i32 - 1, 0, nz as i32 - 1],
        ))
    }

    /// Load a dose-plan volume from file paths.
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, PlanLoadError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a dose-plan volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, PlanLoadError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(PlanLoadError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice_with_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<(Option<f32>, Array2<i32>)> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let slice = Self::decode_slice(dicom_object)?;
        Some((order, slice))
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn decode_slice(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<i32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        pixel_data
            .to_ndarray::<u16>()
            .ok()
            .map(|arr| arr.slice(s![0, .., .., 0]).mapv(i32::from))
    }

    fn sort_slices(slices_with_order: &mut [(Option<f32>, Array2<i32>)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            slices_with_order.reverse();
        }
    }

    fn validate_dimensions(slices: &[Array2<i32>]) -> Result<(), PlanLoadError> {
        let first_dim = slices[0].dim();
        if slices.iter().any(|slice| slice.dim() != first_dim) {
            return Err(PlanLoadError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[Array2<i32>]) -> Array3<i32> {
        let (height, width) = slices[0].dim();
        let depth = slices.len();
        let mut volume = Array3::<i32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(slice);
        }

        volume
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            Some((pixel_spacing[0], pixel_spacing[1], slice_thickness))
        })
    }

    fn get_origin(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pos = dicom_object
                .element(tags::IMAGE_POSITION_PATIENT)
                .ok()?
                .to_multi_float32()
                .ok()?;
            Some((*pos.first()?, *pos.get(1)?, *pos.get(2)?))
        })
    }
}

impl VolumeReader for PlanLoader {
    fn read_volume(&self, path: &Path) -> Result<Volume, PlanLoadError> {
        PlanLoader::load_from_directory(path, SortBy::ImagePositionPatient)
    }
}
