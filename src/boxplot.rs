//! Contour agreement engine: the three isodose slots and their boxplot
//! geometry.
//!
//! Each slot pairs a reserved color with an active isodose threshold and a
//! visualization mode. Loading a ranking moves the slot from `Inactive` to
//! `Loaded`; switching a mode attaches/detaches geometry and moves it to
//! `Rendering`. Attach/detach sets are exact: a mode switch or reactivation
//! never leaves stale scene objects behind.

use crate::align::{AlignError, align};
use crate::colormap::{LookupTable, band_table};
use crate::contour::{Polyline, extract_contours};
use crate::enums::{BandKind, BoxplotMode, Orientation, Precision};
use crate::plan_loader::{PlanLoadError, VolumeReader};
use crate::ranking::{RankingError, RankingRecord, RankingStore};
use crate::volume::{Ensemble, Volume};

use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use thiserror::Error;

pub const SLOT_COUNT: usize = 3;

/// Opacity ramp for score-styled contours: 0.3 at score 0, 0.8 at score 1.
fn ramp_opacity(score: f32) -> f32 {
    0.3 + 0.5 * score.clamp(0.0, 1.0)
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error("No agreement band mask for isodose {0}")]
    BandMissing(u32),

    #[error("Slot {0} has no active isodose")]
    SlotInactive(usize),

    #[error("No dose plans loaded for the requested geometry")]
    EmptySelection,

    #[error("Ranking lists {ranking} members but the ensemble has {ensemble}")]
    MemberMismatch { ranking: usize, ensemble: usize },

    #[error("Band mask could not be read: {0}")]
    BandRead(#[from] PlanLoadError),

    #[error("Band mask does not fit the ensemble grid: {0}")]
    BandAlign(#[from] AlignError),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),
}

/// Reserved per-slot colors and band opacities. The 100% band is always
/// more transparent than the 50% band.
#[derive(Clone, Copy, Debug)]
pub struct SlotStyle {
    pub color: [f32; 3],
    pub median_color: [f32; 3],
    pub band50_alpha: f32,
    pub band100_alpha: f32,
}

const SLOT_STYLES: [SlotStyle; SLOT_COUNT] = [
    // yellow slot, purple median
    SlotStyle {
        color: [1.0, 1.0, 0.0],
        median_color: [1.0, 0.0, 0.8],
        band50_alpha: 0.82,
        band100_alpha: 0.6,
    },
    // red slot, green median
    SlotStyle {
        color: [0.98, 0.0, 0.0],
        median_color: [0.0, 1.0, 0.0],
        band50_alpha: 0.65,
        band100_alpha: 0.42,
    },
    // blue slot, orange median
    SlotStyle {
        color: [0.0, 0.643, 0.941],
        median_color: [1.0, 0.5, 0.0],
        band50_alpha: 0.75,
        band100_alpha: 0.5,
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Inactive,
    Loaded,
    Rendering(BoxplotMode),
}

/// A renderable object owned by one slot, identified for attach/detach
/// bookkeeping on the external scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneObject {
    Contour { member: usize, plane: Orientation },
    Band { kind: BandKind, plane: Orientation },
}

/// Exact scene mutation produced by a mode switch or (de)activation.
#[derive(Clone, Debug, Default)]
pub struct SceneDiff {
    pub detach: Vec<SceneObject>,
    pub attach: Vec<SceneObject>,
}

/// Outcome of a mode switch; `applied` differs from `requested` when a
/// missing band mask degraded the slot to contours-only.
#[derive(Clone, Debug)]
pub struct ModeChange {
    pub requested: BoxplotMode,
    pub applied: BoxplotMode,
    pub diff: SceneDiff,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineStyle {
    pub color: [f32; 3],
    pub opacity: f32,
    pub dashed: bool,
    pub line_width: f32,
}

/// Per-member styled isolines on the three orthogonal planes, indexed by
/// [`Orientation::index`].
#[derive(Clone, Debug)]
pub struct StyledContour {
    pub member: usize,
    pub lines: [Vec<Polyline>; 3],
    pub style: LineStyle,
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Isodose")]
    pub isodose: u32,
    #[serde(rename = "Doseplans")]
    pub doseplan: String,
    #[serde(rename = "Probabilities")]
    pub probability: f32,
}

#[derive(Debug)]
struct Slot {
    style: SlotStyle,
    state: SlotState,
    threshold: Option<u32>,
    ranking: Option<RankingRecord>,
    contours: Vec<StyledContour>,
    band50: Option<Volume>,
    band100: Option<Volume>,
    attached: Vec<SceneObject>,
}

impl Slot {
    fn new(style: SlotStyle) -> Self {
        Self {
            style,
            state: SlotState::Inactive,
            threshold: None,
            ranking: None,
            contours: Vec::new(),
            band50: None,
            band100: None,
            attached: Vec::new(),
        }
    }

    fn clear(&mut self) {
        self.state = SlotState::Inactive;
        self.threshold = None;
        self.ranking = None;
        self.contours.clear();
        self.band50 = None;
        self.band100 = None;
    }
}

pub struct ContourAgreementEngine {
    store: RankingStore,
    reader: Box<dyn VolumeReader>,
    grid_spacing: (f32, f32, f32),
    slots: [Slot; SLOT_COUNT],
    boxplot_thresholds: BTreeSet<u32>,
    report: Vec<ReportRow>,
}

impl ContourAgreementEngine {
    /// `grid_spacing` is the ensemble's shared spacing; band masks loaded
    /// through the reader are aligned against it before caching.
    pub fn new(
        store: RankingStore,
        reader: Box<dyn VolumeReader>,
        grid_spacing: (f32, f32, f32),
    ) -> Self {
        Self {
            store,
            reader,
            grid_spacing,
            slots: [
                Slot::new(SLOT_STYLES[0]),
                Slot::new(SLOT_STYLES[1]),
                Slot::new(SLOT_STYLES[2]),
            ],
            boxplot_thresholds: BTreeSet::new(),
            report: Vec::new(),
        }
    }

    pub fn store(&self) -> &RankingStore {
        &self.store
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.slots[slot].state
    }

    pub fn threshold(&self, slot: usize) -> Option<u32> {
        self.slots[slot].threshold
    }

    pub fn slot_style(&self, slot: usize) -> &SlotStyle {
        &self.slots[slot].style
    }

    pub fn contours(&self, slot: usize) -> &[StyledContour] {
        &self.slots[slot].contours
    }

    pub fn band(&self, slot: usize, kind: BandKind) -> Option<&Volume> {
        match kind {
            BandKind::Fifty => self.slots[slot].band50.as_ref(),
            BandKind::Hundred => self.slots[slot].band100.as_ref(),
        }
    }

    /// Lookup table for one of the slot's band overlays, in the slot color.
    pub fn band_lut(&self, slot: usize, kind: BandKind) -> LookupTable {
        let style = &self.slots[slot].style;
        match kind {
            BandKind::Fifty => band_table(style.color, style.band50_alpha),
            BandKind::Hundred => band_table(style.color, style.band100_alpha),
        }
    }

    pub fn attached(&self, slot: usize) -> &[SceneObject] {
        &self.slots[slot].attached
    }

    /// Thresholds for which boxplot data has been loaded so far.
    pub fn boxplot_thresholds(&self) -> impl Iterator<Item = u32> + '_ {
        self.boxplot_thresholds.iter().copied()
    }

    /// Activate a slot on `threshold` by loading its agreement ranking.
    ///
    /// Any geometry the slot had attached for a previous threshold is
    /// detached via the returned diff. On failure the slot's data state is
    /// cleared but its attached geometry is kept, so the caller can still
    /// detach it through [`deactivate`](Self::deactivate).
    pub fn load_ranking(&mut self, slot: usize, threshold: u32) -> Result<SceneDiff, EngineError> {
        let loaded = self.store.load_ranking(threshold);
        let slot_data = &mut self.slots[slot];

        match loaded {
            Ok(record) => {
                let detach = std::mem::take(&mut slot_data.attached);
                if self.boxplot_thresholds.insert(threshold) {
                    for (member, &score) in record.scores().iter().enumerate() {
                        self.report.push(ReportRow {
                            isodose: threshold,
                            doseplan: format!("DP {member}"),
                            probability: score,
                        });
                    }
                }
                debug!(
                    "slot {slot}: isodose {threshold} ranking loaded, median {}, {} outliers",
                    record.median(),
                    record.outliers().len()
                );
                slot_data.clear();
                slot_data.threshold = Some(threshold);
                slot_data.ranking = Some(record);
                slot_data.state = SlotState::Loaded;
                Ok(SceneDiff {
                    detach,
                    attach: Vec::new(),
                })
            }
            Err(err) => {
                slot_data.clear();
                Err(err.into())
            }
        }
    }

    /// Recompute the slot's styled isolines for the current slice indices.
    ///
    /// One polyline set per member and orthogonal plane, thresholded at the
    /// slot's isodose. Outlier members (score exactly 0) render dashed at
    /// the bottom of the opacity ramp, all other members solid with opacity
    /// mapped linearly from their score; the median member is overridden
    /// with the slot's reserved median color.
    pub fn compute_contours(
        &mut self,
        slot: usize,
        ensemble: &Ensemble,
        slice_axial: usize,
        slice_sagittal: usize,
        slice_coronal: usize,
    ) -> Result<(), EngineError> {
        let slot_data = &mut self.slots[slot];
        if slot_data.state == SlotState::Inactive {
            return Err(EngineError::SlotInactive(slot));
        }
        let (Some(threshold), Some(ranking)) = (slot_data.threshold, slot_data.ranking.as_ref())
        else {
            return Err(EngineError::SlotInactive(slot));
        };
        if ensemble.is_empty() || ranking.is_empty() {
            return Err(EngineError::EmptySelection);
        }
        if ranking.len() != ensemble.len() {
            return Err(EngineError::MemberMismatch {
                ranking: ranking.len(),
                ensemble: ensemble.len(),
            });
        }

        let median = ranking.median();
        let mut contours = Vec::with_capacity(ensemble.len());
        for (member, volume) in ensemble.members().iter().enumerate() {
            let score = ranking.scores()[member];
            let style = if member == median {
                LineStyle {
                    color: slot_data.style.median_color,
                    opacity: 0.99,
                    dashed: false,
                    line_width: 4.0,
                }
            } else if score == 0.0 {
                LineStyle {
                    color: slot_data.style.color,
                    opacity: ramp_opacity(0.0),
                    dashed: true,
                    line_width: 3.5,
                }
            } else {
                LineStyle {
                    color: slot_data.style.color,
                    opacity: ramp_opacity(score),
                    dashed: false,
                    line_width: 3.5,
                }
            };

            let mut lines: [Vec<Polyline>; 3] = [Vec::new(), Vec::new(), Vec::new()];
            for orientation in Orientation::ALL {
                let index = match orientation {
                    Orientation::Axial => slice_axial,
                    Orientation::Coronal => slice_coronal,
                    Orientation::Sagittal => slice_sagittal,
                };
                let Some(view) = volume.slice_view(index, orientation) else {
                    debug!("slot {slot}: slice {index} out of range on {orientation:?}");
                    continue;
                };
                lines[orientation.index()] = extract_contours(
                    &view,
                    threshold as f32,
                    volume.in_plane_spacing(orientation),
                );
            }

            contours.push(StyledContour {
                member,
                lines,
                style,
            });
        }
        slot_data.contours = contours;
        Ok(())
    }

    /// Switch the slot's visualization mode, producing the exact scene diff.
    ///
    /// Band modes lazily load the precomputed mask through the volume
    /// reader; when the mask is absent the slot degrades to contours-only
    /// (`applied` reports the degradation).
    pub fn switch_mode(
        &mut self,
        slot: usize,
        mode: BoxplotMode,
    ) -> Result<ModeChange, EngineError> {
        if self.slots[slot].state == SlotState::Inactive {
            return Err(EngineError::SlotInactive(slot));
        }

        let mut applied = mode;
        let needed_bands: &[BandKind] = match mode {
            BoxplotMode::Band50 => &[BandKind::Fifty],
            BoxplotMode::Band100 => &[BandKind::Hundred],
            BoxplotMode::FullBoxplot => &[BandKind::Fifty, BandKind::Hundred],
            _ => &[],
        };
        for &kind in needed_bands {
            match self.ensure_band(slot, kind) {
                Ok(()) => {}
                Err(EngineError::BandMissing(threshold)) => {
                    warn!(
                        "slot {slot}: no {kind:?} band for isodose {threshold}, \
                         falling back to contours"
                    );
                    applied = BoxplotMode::Contours;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let slot_data = &mut self.slots[slot];
        let ranking = slot_data
            .ranking
            .as_ref()
            .ok_or(EngineError::SlotInactive(slot))?;
        let desired = desired_objects(ranking, applied);

        let detach: Vec<SceneObject> = slot_data
            .attached
            .iter()
            .copied()
            .filter(|object| !desired.contains(object))
            .collect();
        let attach: Vec<SceneObject> = desired
            .iter()
            .copied()
            .filter(|object| !slot_data.attached.contains(object))
            .collect();

        slot_data.attached = desired;
        slot_data.state = SlotState::Rendering(applied);
        Ok(ModeChange {
            requested: mode,
            applied,
            diff: SceneDiff { detach, attach },
        })
    }

    /// Recolor all of the slot's member contours.
    pub fn retint(&mut self, slot: usize, color: [f32; 3]) {
        for contour in &mut self.slots[slot].contours {
            contour.style.color = color;
        }
    }

    /// Detach everything the slot owns and return it to `Inactive`.
    pub fn deactivate(&mut self, slot: usize) -> SceneDiff {
        let slot_data = &mut self.slots[slot];
        let detach = std::mem::take(&mut slot_data.attached);
        slot_data.clear();
        SceneDiff {
            detach,
            attach: Vec::new(),
        }
    }

    /// One row per computed (threshold, member) pair, for external plotting.
    pub fn report(&self) -> &[ReportRow] {
        &self.report
    }

    /// Emit the agreement report as CSV.
    pub fn write_report<W: Write>(&self, writer: W) -> Result<(), EngineError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.report {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Make sure the requested band mask is loaded and cached for the
    /// slot's active threshold.
    ///
    /// Masks come off disk in exporter orientation and get the same
    /// alignment pass as the dose plans before caching.
    ///
    /// # Errors
    ///
    /// `BandMissing` when the ranking directory lists no mask of this kind;
    /// read and alignment failures propagate as hard errors.
    pub fn ensure_band(&mut self, slot: usize, kind: BandKind) -> Result<(), EngineError> {
        let cached = match kind {
            BandKind::Fifty => self.slots[slot].band50.is_some(),
            BandKind::Hundred => self.slots[slot].band100.is_some(),
        };
        if cached {
            return Ok(());
        }

        let threshold = self.slots[slot]
            .threshold
            .ok_or(EngineError::SlotInactive(slot))?;
        let entry = self
            .store
            .entry(threshold)
            .ok_or(RankingError::RankingMissing(threshold))?;
        let path = match kind {
            BandKind::Fifty => entry.band50.clone(),
            BandKind::Hundred => entry.band100.clone(),
        }
        .ok_or(EngineError::BandMissing(threshold))?;

        let raw = self.reader.read_volume(&path)?;
        let volume = align(&raw, self.grid_spacing, Precision::Int)?;
        debug!("slot {slot}: {kind:?} band loaded for isodose {threshold}");
        match kind {
            BandKind::Fifty => self.slots[slot].band50 = Some(volume),
            BandKind::Hundred => self.slots[slot].band100 = Some(volume),
        }
        Ok(())
    }
}

fn desired_objects(ranking: &RankingRecord, mode: BoxplotMode) -> Vec<SceneObject> {
    let contour_members: Vec<usize> = match mode {
        BoxplotMode::Contours => (0..ranking.len()).collect(),
        BoxplotMode::Median => vec![ranking.median()],
        BoxplotMode::Outliers => ranking.outliers(),
        BoxplotMode::Band50 | BoxplotMode::Band100 => Vec::new(),
        BoxplotMode::FullBoxplot => {
            let mut members = vec![ranking.median()];
            members.extend(ranking.outliers());
            members
        }
    };
    let bands: &[BandKind] = match mode {
        BoxplotMode::Band50 => &[BandKind::Fifty],
        BoxplotMode::Band100 => &[BandKind::Hundred],
        BoxplotMode::FullBoxplot => &[BandKind::Fifty, BandKind::Hundred],
        _ => &[],
    };

    let mut objects = Vec::new();
    for member in contour_members {
        for plane in Orientation::ALL {
            objects.push(SceneObject::Contour { member, plane });
        }
    }
    for &kind in bands {
        for plane in Orientation::ALL {
            objects.push(SceneObject::Band { kind, plane });
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use ndarray::Array3;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};

    struct MapReader {
        volumes: HashMap<PathBuf, Volume>,
    }

    impl VolumeReader for MapReader {
        fn read_volume(&self, path: &Path) -> Result<Volume, PlanLoadError> {
            self.volumes
                .get(path)
                .cloned()
                .ok_or(PlanLoadError::NoValidImages)
        }
    }

    fn aligned_plan(hot: i32) -> Volume {
        let mut data = Array3::zeros((8, 8, 8));
        for z in 2..6 {
            for y in 2..6 {
                for x in 2..6 {
                    data[[z, y, x]] = hot;
                }
            }
        }
        let mut volume = Volume::new(data, (1.0, 1.0, 1.0));
        volume.aligned = true;
        volume
    }

    fn ensemble() -> Ensemble {
        Ensemble::new(vec![aligned_plan(100), aligned_plan(120), aligned_plan(90)]).unwrap()
    }

    struct Fixture {
        _root: tempfile::TempDir,
        engine: ContourAgreementEngine,
    }

    /// Ranking root with isodose 80 (full band set) and isodose 60
    /// (ranking only, no band masks).
    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let dir80 = root.path().join("isovalue80");
        fs::create_dir(&dir80).unwrap();
        write!(
            File::create(dir80.join("ranking.txt")).unwrap(),
            "1.0 0\n0.0 1\n0.0 2\n"
        )
        .unwrap();
        File::create(dir80.join("band50.dcmdir")).unwrap();
        File::create(dir80.join("band100.dcmdir")).unwrap();

        let dir60 = root.path().join("isovalue60");
        fs::create_dir(&dir60).unwrap();
        write!(
            File::create(dir60.join("ranking.txt")).unwrap(),
            "0.2 0\n0.9 1\n0.9 2\n"
        )
        .unwrap();

        let mut band = aligned_plan(1);
        band.data.mapv_inplace(|v| v.min(2));
        let volumes = HashMap::from([
            (dir80.join("band50.dcmdir"), band.clone()),
            (dir80.join("band100.dcmdir"), band),
        ]);

        let store = RankingStore::scan(root.path()).unwrap();
        let engine =
            ContourAgreementEngine::new(store, Box::new(MapReader { volumes }), (1.0, 1.0, 1.0));
        Fixture {
            _root: root,
            engine,
        }
    }

    #[test]
    fn ranking_example_median_and_outliers() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        let record = fx.engine.slots[0].ranking.as_ref().unwrap();
        assert_eq!(record.median(), 0);
        assert_eq!(record.outliers(), vec![1, 2]);
        assert_eq!(fx.engine.state(0), SlotState::Loaded);

        fx.engine.load_ranking(1, 60).unwrap();
        let record = fx.engine.slots[1].ranking.as_ref().unwrap();
        assert_eq!(record.median(), 1, "tie breaks to the lowest index");
    }

    #[test]
    fn ranking_missing_keeps_slot_inactive() {
        let mut fx = fixture();
        let err = fx.engine.load_ranking(0, 95).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ranking(RankingError::RankingMissing(95))
        ));
        assert_eq!(fx.engine.state(0), SlotState::Inactive);
        assert_eq!(fx.engine.threshold(0), None);
    }

    #[test]
    fn contours_styled_by_score_with_median_override() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 60).unwrap();
        fx.engine
            .compute_contours(0, &ensemble(), 3, 3, 3)
            .unwrap();

        let contours = fx.engine.contours(0);
        assert_eq!(contours.len(), 3);

        // member 1 is the median (score 0.9, tie to lowest index), drawn in
        // slot 0's reserved median purple
        assert_eq!(contours[1].style.color, [1.0, 0.0, 0.8]);
        assert!((contours[1].style.opacity - 0.99).abs() < 1e-5);
        assert!(!contours[1].style.dashed);

        // member 0 scored 0.2 -> solid, 0.3 + 0.5 * 0.2
        assert!((contours[0].style.opacity - 0.4).abs() < 1e-5);
        assert!(!contours[0].style.dashed);
        assert_eq!(contours[0].style.color, [1.0, 1.0, 0.0]);

        // every member has isolines on all three planes at slice 3
        for contour in contours {
            for plane in Orientation::ALL {
                assert!(!contour.lines[plane.index()].is_empty());
            }
        }
    }

    #[test]
    fn zero_score_members_render_dashed_and_dim() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        fx.engine
            .compute_contours(0, &ensemble(), 3, 3, 3)
            .unwrap();

        let contours = fx.engine.contours(0);
        for outlier in [1, 2] {
            assert!(contours[outlier].style.dashed);
            assert!((contours[outlier].style.opacity - 0.3).abs() < 1e-5);
        }
    }

    #[test]
    fn mode_switch_diffs_are_exact_and_reversible() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();

        let to_contours = fx.engine.switch_mode(0, BoxplotMode::Contours).unwrap();
        assert_eq!(to_contours.applied, BoxplotMode::Contours);
        assert!(to_contours.diff.detach.is_empty());
        assert_eq!(to_contours.diff.attach.len(), 9); // 3 members x 3 planes

        let to_band = fx.engine.switch_mode(0, BoxplotMode::Band50).unwrap();
        assert_eq!(to_band.applied, BoxplotMode::Band50);
        assert_eq!(to_band.diff.detach.len(), 9);
        assert_eq!(to_band.diff.attach.len(), 3);
        assert!(to_band.diff.attach.iter().all(|object| matches!(
            object,
            SceneObject::Band {
                kind: BandKind::Fifty,
                ..
            }
        )));

        let back = fx.engine.switch_mode(0, BoxplotMode::Contours).unwrap();
        let mut detached = back.diff.detach.clone();
        let mut attached_before = to_band.diff.attach.clone();
        detached.sort_by_key(|object| format!("{object:?}"));
        attached_before.sort_by_key(|object| format!("{object:?}"));
        assert_eq!(detached, attached_before);
        assert_eq!(back.diff.attach.len(), 9);
    }

    #[test]
    fn full_boxplot_attaches_median_outliers_and_both_bands() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        let change = fx.engine.switch_mode(0, BoxplotMode::FullBoxplot).unwrap();
        assert_eq!(change.applied, BoxplotMode::FullBoxplot);
        // median + 2 outliers on 3 planes, plus 2 bands on 3 planes
        assert_eq!(change.diff.attach.len(), 9 + 6);
        assert!(fx.engine.band(0, BandKind::Fifty).is_some());
        assert!(fx.engine.band(0, BandKind::Hundred).is_some());
    }

    #[test]
    fn missing_band_degrades_to_contours() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 60).unwrap();
        let change = fx.engine.switch_mode(0, BoxplotMode::Band50).unwrap();
        assert_eq!(change.requested, BoxplotMode::Band50);
        assert_eq!(change.applied, BoxplotMode::Contours);
        assert_eq!(fx.engine.state(0), SlotState::Rendering(BoxplotMode::Contours));
        assert!(change.diff.attach.iter().all(|object| matches!(
            object,
            SceneObject::Contour { .. }
        )));

        let err = fx.engine.ensure_band(0, BandKind::Fifty).unwrap_err();
        assert!(matches!(err, EngineError::BandMissing(60)));
    }

    #[test]
    fn band_masks_get_the_alignment_pass_before_caching() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("isovalue80");
        fs::create_dir(&dir).unwrap();
        write!(
            File::create(dir.join("ranking.txt")).unwrap(),
            "1.0 0\n0.0 1\n0.0 2\n"
        )
        .unwrap();
        File::create(dir.join("band50.dcmdir")).unwrap();

        // Exporter-raw mask: offset extent, non-zero origin, unflipped.
        let mut data = Array3::zeros((4, 4, 4));
        data[[0, 0, 0]] = 2;
        let raw = Volume::new(data, (1.0, 1.0, 1.0))
            .with_geometry((12.0, 34.0, 56.0), [4, 7, 4, 7, 4, 7]);
        let volumes = HashMap::from([(dir.join("band50.dcmdir"), raw)]);

        let store = RankingStore::scan(root.path()).unwrap();
        let mut engine =
            ContourAgreementEngine::new(store, Box::new(MapReader { volumes }), (1.0, 1.0, 1.0));
        engine.load_ranking(0, 80).unwrap();
        engine.ensure_band(0, BandKind::Fifty).unwrap();

        let band = engine.band(0, BandKind::Fifty).unwrap();
        assert!(band.aligned);
        assert_eq!(band.origin, (0.0, 0.0, 0.0));
        assert_eq!(band.extent, [0, 3, 0, 3, 0, 3]);
        // The ingestion-time Y flip moved row 0 to row 3.
        assert_eq!(band.data[[0, 3, 0]], 2);
        assert_eq!(band.data[[0, 0, 0]], 0);
    }

    #[test]
    fn failed_reactivation_keeps_geometry_detachable() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        fx.engine.switch_mode(0, BoxplotMode::Contours).unwrap();
        assert_eq!(fx.engine.attached(0).len(), 9);

        fx.engine.load_ranking(0, 95).unwrap_err();
        assert_eq!(fx.engine.state(0), SlotState::Inactive);
        assert_eq!(fx.engine.attached(0).len(), 9);

        let diff = fx.engine.deactivate(0);
        assert_eq!(diff.detach.len(), 9);
        assert!(fx.engine.attached(0).is_empty());
    }

    #[test]
    fn reactivation_detaches_previous_geometry() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        fx.engine.switch_mode(0, BoxplotMode::Contours).unwrap();
        assert_eq!(fx.engine.attached(0).len(), 9);

        let diff = fx.engine.load_ranking(0, 60).unwrap();
        assert_eq!(diff.detach.len(), 9);
        assert!(diff.attach.is_empty());
        assert!(fx.engine.attached(0).is_empty());
        assert_eq!(fx.engine.state(0), SlotState::Loaded);
    }

    #[test]
    fn switching_inactive_slot_is_an_error() {
        let mut fx = fixture();
        assert!(matches!(
            fx.engine.switch_mode(2, BoxplotMode::Contours),
            Err(EngineError::SlotInactive(2))
        ));
    }

    #[test]
    fn retint_recolors_every_member() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        fx.engine
            .compute_contours(0, &ensemble(), 3, 3, 3)
            .unwrap();
        fx.engine.retint(0, [0.1, 0.2, 0.3]);
        for contour in fx.engine.contours(0) {
            assert_eq!(contour.style.color, [0.1, 0.2, 0.3]);
        }
    }

    #[test]
    fn report_lists_each_threshold_member_pair_once() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        fx.engine.load_ranking(1, 80).unwrap();
        fx.engine.load_ranking(2, 60).unwrap();

        let report = fx.engine.report();
        assert_eq!(report.len(), 6);
        assert_eq!(report[0].doseplan, "DP 0");

        let mut out = Vec::new();
        fx.engine.write_report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Isodose,Doseplans,Probabilities"));
        assert!(text.contains("80,DP 1,0"));
    }

    #[test]
    fn member_count_mismatch_is_a_hard_error() {
        let mut fx = fixture();
        fx.engine.load_ranking(0, 80).unwrap();
        let small = Ensemble::new(vec![aligned_plan(100)]).unwrap();
        assert!(matches!(
            fx.engine.compute_contours(0, &small, 3, 3, 3),
            Err(EngineError::MemberMismatch {
                ranking: 3,
                ensemble: 1
            })
        ));
    }

    #[test]
    fn band_lut_uses_slot_color_and_alpha() {
        let fx = fixture();
        let lut = fx.engine.band_lut(1, BandKind::Hundred);
        assert_eq!(lut.entry(0), Some([0.0, 0.0, 0.0, 0.0]));
        let entry = lut.entry(1).unwrap();
        assert!((entry[0] - 0.98).abs() < 1e-5);
        assert!((entry[3] - 0.42).abs() < 1e-5);
    }
}
