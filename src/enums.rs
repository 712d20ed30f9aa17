#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Stable index used for per-plane geometry arrays.
    pub fn index(self) -> usize {
        match self {
            Orientation::Axial => 0,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 2,
        }
    }
}

/// Scalar precision a consumer needs after alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Precision {
    /// Full integer dose values, used for geometry extraction.
    #[default]
    Int,
    /// Values clamped to 0..=255, used for render volumes.
    Byte,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BandKind {
    Fifty,
    Hundred,
}

/// Visualization mode of one isodose slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxplotMode {
    Contours,
    Median,
    Outliers,
    Band50,
    Band100,
    FullBoxplot,
}

#[derive(Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}
