//! # dose-ensemble
//!
//! This crate analyzes variability across an ensemble of co-registered 3D
//! dose-distribution volumes belonging to one patient.

//!
//! Raw dose plans are aligned onto one shared coordinate grid and folded
//! into per-voxel mean/std/min/max statistic fields. For each of three
//! concurrent isodose slots the contour agreement engine extracts styled
//! per-member isolines on the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! and combines them with externally computed agreement rankings into a
//! contour boxplot: a median member, an outlier set, and 50%/100% consensus
//! bands. Color/opacity lookup tables for the statistic and band overlays
//! are built per ensemble load, and a view coordinator keeps the three
//! slice viewers and their overlay planes consistent under navigation.
//!
//! The crate computes; it does not render. Styled polylines, scene diffs,
//! band masks and lookup tables are handed to an external rendering layer,
//! and dose volumes arrive through a reader collaborator (a DICOM slice
//! loader is provided).
//!
//! # Examples
//!
//! ## Loading an ensemble and activating an isodose slot
//!
//! Align three dose plans, load the agreement ranking for isodose 80 into
//! slot 0 and switch the slot to the full contour boxplot.
//!
//! ```no_run
//! # use dose_ensemble::{BoxplotMode, PlanLoader, Session, SortBy};
//! # use std::path::Path;
//! let plans = ["plan0", "plan1", "plan2"]
//!     .iter()
//!     .map(|dir| PlanLoader::load_from_directory(dir, SortBy::ImagePositionPatient))
//!     .collect::<Result<Vec<_>, _>>()
//!     .expect("should have loaded the dose plans");
//! let mut session = Session::create(plans, Path::new("isovalues"), Box::new(PlanLoader))
//!     .expect("should have built the session");
//! session.engine_mut().load_ranking(0, 80).expect("ranking for isodose 80");
//! let change = session
//!     .engine_mut()
//!     .switch_mode(0, BoxplotMode::FullBoxplot)
//!     .expect("slot 0 is loaded");
//! println!("attach {} scene objects", change.diff.attach.len());
//! ```

pub mod align;
pub mod boxplot;
pub mod colormap;
pub mod contour;
pub mod enums;
pub mod plan_loader;
pub mod ranking;
pub mod session;
pub mod stats;
pub mod sync;
pub mod volume;

pub use align::{AlignError, align, align_members};
pub use boxplot::{
    ContourAgreementEngine, EngineError, LineStyle, ModeChange, ReportRow, SceneDiff, SceneObject,
    SlotState, SlotStyle, StyledContour,
};
pub use colormap::{Gradient, LookupTable, PaletteKind, band_table, build};
pub use contour::{Polyline, extract_contours};
pub use enums::{BandKind, BoxplotMode, Orientation, Precision, SortBy};
pub use plan_loader::{PlanLoadError, PlanLoader, VolumeReader};
pub use ranking::{IsovalueEntry, RankingError, RankingRecord, RankingStore};
pub use session::{Session, SessionError};
pub use stats::{EnsembleStatistics, aggregate, scalar_range_nonzero};
pub use sync::{
    CameraPose, OverlayKind, OverlayPlane, PlaneGeometry, SliceViewer, SyncError,
    ViewSyncCoordinator,
};
pub use volume::{Ensemble, EnsembleError, Volume};
