use crate::enums::Orientation;

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("Ensemble must contain at least one dose plan")]
    Empty,

    #[error("Dose plan {index} does not share the ensemble grid")]
    GridMismatch { index: usize },
}

/// One dose plan on a regular 3D grid.
///
/// Scalars are stored in (z, y, x) order; `spacing` and `origin` are in
/// (x, y, z) world millimeters. `extent` is the index-space extent
/// (xmin, xmax, ymin, ymax, zmin, zmax). After alignment all members of an
/// ensemble share identical dimensions, spacing and origin, and `aligned`
/// is set so the ingestion-time axis flip is never applied twice.
#[derive(Clone, Debug, Default)]
pub struct Volume {
    pub data: Array3<i32>,
    pub spacing: (f32, f32, f32),
    pub origin: (f32, f32, f32),
    pub extent: [i32; 6],
    pub aligned: bool,
}

impl Volume {
    pub fn new(data: Array3<i32>, spacing: (f32, f32, f32)) -> Self {
        let (nz, ny, nx) = data.dim();
        Self {
            data,
            spacing,
            origin: (0.0, 0.0, 0.0),
            extent: [0, nx as i32 - 1, 0, ny as i32 - 1, 0, nz as i32 - 1],
            aligned: false,
        }
    }

    pub fn with_geometry(mut self, origin: (f32, f32, f32), extent: [i32; 6]) -> Self {
        self.origin = origin;
        self.extent = extent;
        self
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<i32> {
        &self.data
    }

    /// Extract the 2D sub-grid at `index` along the given orientation.
    ///
    /// Returns `None` when `index` lies outside the volume.
    pub fn slice_view(&self, index: usize, orientation: Orientation) -> Option<ArrayView2<'_, i32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let view = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(view)
    }

    /// Number of slices available along the given orientation.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        let dim = self.data.dim();
        match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        }
    }

    /// World spacing of a slice plane as (row spacing, column spacing).
    pub fn in_plane_spacing(&self, orientation: Orientation) -> (f32, f32) {
        let (sx, sy, sz) = self.spacing;
        match orientation {
            Orientation::Axial => (sy, sx),
            Orientation::Coronal => (sz, sx),
            Orientation::Sagittal => (sz, sy),
        }
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        index < self.slice_count(orientation)
    }
}

/// Ordered collection of one patient's aligned dose plans.
#[derive(Clone, Debug)]
pub struct Ensemble {
    members: Vec<Volume>,
}

impl Ensemble {
    /// Build an ensemble from aligned members.
    ///
    /// # Errors
    ///
    /// Returns an error when the collection is empty or a member disagrees
    /// with the first member's dimensions, spacing or origin.
    pub fn new(members: Vec<Volume>) -> Result<Self, EnsembleError> {
        let first = members.first().ok_or(EnsembleError::Empty)?;
        let (dim, spacing, origin) = (first.dim(), first.spacing, first.origin);
        for (index, member) in members.iter().enumerate() {
            if member.dim() != dim || member.spacing != spacing || member.origin != origin {
                return Err(EnsembleError::GridMismatch { index });
            }
        }
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[Volume] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&Volume> {
        self.members.get(index)
    }

    /// The shared grid all members were checked against.
    pub fn reference(&self) -> &Volume {
        &self.members[0]
    }
}
