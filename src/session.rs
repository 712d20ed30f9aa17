//! One patient's analysis session.
//!
//! The session owns everything that was previously scattered process-wide
//! state: the aligned ensemble, its statistic fields, the statistic color
//! tables, the contour agreement engine and the view coordinator. It is
//! created when an ensemble is loaded and torn down by dropping it.

use crate::align::{AlignError, align_members};
use crate::boxplot::ContourAgreementEngine;
use crate::colormap::{self, LookupTable, PaletteKind};
use crate::enums::Precision;
use crate::plan_loader::VolumeReader;
use crate::ranking::{RankingError, RankingStore};
use crate::stats::{EnsembleStatistics, aggregate, scalar_range_nonzero};
use crate::sync::{SliceViewer, SyncError, ViewSyncCoordinator, VIEWER_COUNT};
use crate::volume::{Ensemble, EnsembleError, Volume};

use log::info;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),

    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Engine(#[from] crate::boxplot::EngineError),
}

pub struct Session {
    ensemble: Ensemble,
    statistics: EnsembleStatistics,
    lut_mean: LookupTable,
    lut_std: LookupTable,
    engine: ContourAgreementEngine,
    views: ViewSyncCoordinator,
}

impl Session {
    /// Build a session from raw dose plans.
    ///
    /// Members are aligned against the first plan's grid, folded into
    /// statistic fields, and the ranking root is scanned for boxplot data.
    /// Runs synchronously on the interaction thread; progress is logged
    /// before and after the long steps.
    pub fn create(
        plans: Vec<Volume>,
        ranking_root: &Path,
        reader: Box<dyn VolumeReader>,
    ) -> Result<Self, SessionError> {
        let reference_spacing = plans.first().ok_or(EnsembleError::Empty)?.spacing;

        info!("aligning {} dose plans onto the shared grid", plans.len());
        let aligned = align_members(&plans, reference_spacing, Precision::Int)?;
        let ensemble = Ensemble::new(aligned)?;

        info!("aggregating ensemble statistics");
        let statistics = aggregate(&ensemble);
        let (lut_mean, lut_std) = statistic_tables(&statistics);

        info!("scanning ranking root {}", ranking_root.display());
        let store = RankingStore::scan(ranking_root)?;
        let engine = ContourAgreementEngine::new(store, reader, reference_spacing);

        let mut views = ViewSyncCoordinator::new();
        for _ in 0..VIEWER_COUNT {
            views.register(SliceViewer::new(Default::default()))?;
        }

        info!("session ready: {} members", ensemble.len());
        Ok(Self {
            ensemble,
            statistics,
            lut_mean,
            lut_std,
            engine,
            views,
        })
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn statistics(&self) -> &EnsembleStatistics {
        &self.statistics
    }

    /// Heated-body table over the non-zero mean dose range.
    pub fn lut_mean(&self) -> &LookupTable {
        &self.lut_mean
    }

    /// Heated-body table over the non-zero standard-deviation range.
    pub fn lut_std(&self) -> &LookupTable {
        &self.lut_std
    }

    pub fn engine(&self) -> &ContourAgreementEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ContourAgreementEngine {
        &mut self.engine
    }

    pub fn views(&self) -> &ViewSyncCoordinator {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ViewSyncCoordinator {
        &mut self.views
    }

    /// Recompute a slot's isolines for the current slice indices and
    /// propagate the primary plane to the other viewers.
    pub fn refresh_slot(
        &mut self,
        slot: usize,
        primary_view: usize,
        slice_axial: usize,
        slice_sagittal: usize,
        slice_coronal: usize,
    ) -> Result<Vec<usize>, SessionError> {
        use crate::boxplot::EngineError;
        match self.engine.compute_contours(
            slot,
            &self.ensemble,
            slice_axial,
            slice_sagittal,
            slice_coronal,
        ) {
            Ok(()) => {}
            // No geometry to build yet; a status message is enough.
            Err(err @ (EngineError::EmptySelection | EngineError::SlotInactive(_))) => {
                info!("slot {slot} contours not refreshed: {err}");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(self.views.sync_all(primary_view)?)
    }
}

fn statistic_tables(statistics: &EnsembleStatistics) -> (LookupTable, LookupTable) {
    let (mean_min, mean_max) = scalar_range_nonzero(&statistics.mean).unwrap_or((0, 0));
    let (std_min, std_max) = scalar_range_nonzero(&statistics.std).unwrap_or((0, 0));
    (
        colormap::build(mean_min, mean_max, PaletteKind::HeatedBody),
        colormap::build(std_min, std_max, PaletteKind::HeatedBody),
    )
}
