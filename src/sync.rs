//! Cross-view synchronization of the three orthogonal slice viewers.
//!
//! Overlay planes (contours, bands, statistic colors, voxel selections) are
//! independent scene objects that do not follow the primary data plane on
//! their own, so every primary-plane interaction repositions every active
//! overlay on all viewers before the next render call. Propagation is one
//! explicit synchronous call; a suspend flag silences it during bulk scene
//! rebuilds.

use crate::enums::BandKind;

use log::debug;
use thiserror::Error;

pub const VIEWER_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Coordinator already has {VIEWER_COUNT} slice viewers")]
    ViewerLimit,

    #[error("All {VIEWER_COUNT} slice viewers must be registered before syncing")]
    NotReady,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: [f64; 3],
    pub focal_point: [f64; 3],
    pub view_up: [f64; 3],
    pub parallel_scale: f64,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.0],
            focal_point: [0.0, 0.0, 0.0],
            view_up: [0.0, 1.0, 0.0],
            parallel_scale: 1.0,
        }
    }
}

/// World-space geometry of one cutting plane: origin plus the two corner
/// points spanning the plane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaneGeometry {
    pub origin: [f64; 3],
    pub point1: [f64; 3],
    pub point2: [f64; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayKind {
    Statistic,
    Band(BandKind),
    Contour,
    VoxelSelection,
}

/// One overlay plane riding on a slice viewer.
#[derive(Clone, Debug)]
pub struct OverlayPlane {
    pub kind: OverlayKind,
    pub plane: PlaneGeometry,
    pub active: bool,
}

/// Mutable interaction state of one slice viewer.
#[derive(Clone, Debug)]
pub struct SliceViewer {
    pub slice_index: usize,
    pub camera: CameraPose,
    pub data_plane: PlaneGeometry,
    pub window: f64,
    pub level: f64,
    pub overlays: Vec<OverlayPlane>,
}

impl SliceViewer {
    pub fn new(data_plane: PlaneGeometry) -> Self {
        Self {
            slice_index: 0,
            camera: CameraPose::default(),
            data_plane,
            window: 1.0,
            level: 0.5,
            overlays: Vec::new(),
        }
    }

    pub fn add_overlay(&mut self, kind: OverlayKind) {
        self.overlays.push(OverlayPlane {
            kind,
            plane: self.data_plane,
            active: true,
        });
    }
}

/// Keeps the three slice viewers and their overlay planes mutually
/// consistent under interactive navigation.
#[derive(Debug, Default)]
pub struct ViewSyncCoordinator {
    viewers: Vec<SliceViewer>,
    suspended: bool,
}

impl ViewSyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slice viewer; exactly [`VIEWER_COUNT`] must be added.
    pub fn register(&mut self, viewer: SliceViewer) -> Result<usize, SyncError> {
        if self.viewers.len() == VIEWER_COUNT {
            return Err(SyncError::ViewerLimit);
        }
        self.viewers.push(viewer);
        Ok(self.viewers.len() - 1)
    }

    pub fn viewer(&self, index: usize) -> &SliceViewer {
        &self.viewers[index]
    }

    pub fn viewer_mut(&mut self, index: usize) -> &mut SliceViewer {
        &mut self.viewers[index]
    }

    /// Disable propagation during a bulk scene rebuild.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Sync all cameras to the primary viewer's camera.
    ///
    /// Returns the indices of viewers that changed (so the caller knows
    /// which ones to render).
    pub fn sync_cameras(&mut self, primary: usize) -> Vec<usize> {
        let pose = self.viewers[primary].camera;
        let mut changed = Vec::new();
        for (index, viewer) in self.viewers.iter_mut().enumerate() {
            if index != primary && viewer.camera != pose {
                viewer.camera = pose;
                changed.push(index);
            }
        }
        changed
    }

    /// Sync all data planes to the primary's cutting plane and reposition
    /// every active overlay plane on every viewer onto it.
    pub fn sync_planes(&mut self, primary: usize) -> Vec<usize> {
        let plane = self.viewers[primary].data_plane;
        let slice_index = self.viewers[primary].slice_index;
        let mut changed = Vec::new();
        for (index, viewer) in self.viewers.iter_mut().enumerate() {
            let mut touched = false;
            if index != primary && viewer.data_plane != plane {
                viewer.data_plane = plane;
                viewer.slice_index = slice_index;
                touched = true;
            }
            for overlay in viewer.overlays.iter_mut().filter(|overlay| overlay.active) {
                if overlay.plane != plane {
                    overlay.plane = plane;
                    touched = true;
                }
            }
            if touched && index != primary {
                changed.push(index);
            }
        }
        changed
    }

    /// Sync window/level to the primary viewer. Viewers touched here are
    /// rendered by the window-level pathway itself, so they are excluded
    /// from the caller's render set.
    pub fn sync_window_level(&mut self, primary: usize) -> Vec<usize> {
        let (window, level) = (self.viewers[primary].window, self.viewers[primary].level);
        let mut changed = Vec::new();
        for (index, viewer) in self.viewers.iter_mut().enumerate() {
            if index != primary && (viewer.window != window || viewer.level != level) {
                viewer.window = window;
                viewer.level = level;
                changed.push(index);
            }
        }
        changed
    }

    /// Propagate one primary-plane interaction to the dependent viewers.
    ///
    /// Returns the viewers that still need a render call; window-level
    /// changes have already been rendered on their own. Does nothing while
    /// suspended.
    pub fn sync_all(&mut self, primary: usize) -> Result<Vec<usize>, SyncError> {
        if self.viewers.len() != VIEWER_COUNT {
            return Err(SyncError::NotReady);
        }
        if self.suspended {
            debug!("view sync suspended, skipping propagation from viewer {primary}");
            return Ok(Vec::new());
        }

        let cameras = self.sync_cameras(primary);
        let planes = self.sync_planes(primary);
        let levels = self.sync_window_level(primary);

        let mut pending: Vec<usize> = cameras;
        for index in planes {
            if !pending.contains(&index) {
                pending.push(index);
            }
        }
        pending.retain(|index| !levels.contains(index));
        pending.sort_unstable();
        Ok(pending)
    }

    /// True when every active overlay plane on every viewer matches the
    /// primary data plane.
    pub fn overlays_consistent(&self, primary: usize) -> bool {
        let plane = self.viewers[primary].data_plane;
        self.viewers.iter().all(|viewer| {
            viewer
                .overlays
                .iter()
                .filter(|overlay| overlay.active)
                .all(|overlay| overlay.plane == plane)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(z: f64) -> PlaneGeometry {
        PlaneGeometry {
            origin: [0.0, 0.0, z],
            point1: [10.0, 0.0, z],
            point2: [0.0, 10.0, z],
        }
    }

    fn coordinator() -> ViewSyncCoordinator {
        let mut coordinator = ViewSyncCoordinator::new();
        for _ in 0..VIEWER_COUNT {
            let mut viewer = SliceViewer::new(plane(0.0));
            viewer.add_overlay(OverlayKind::Statistic);
            viewer.add_overlay(OverlayKind::Band(BandKind::Fifty));
            coordinator.register(viewer).unwrap();
        }
        coordinator
    }

    #[test]
    fn only_three_viewers_register() {
        let mut coordinator = coordinator();
        assert!(matches!(
            coordinator.register(SliceViewer::new(plane(0.0))),
            Err(SyncError::ViewerLimit)
        ));
    }

    #[test]
    fn slice_change_moves_all_overlays_before_render() {
        let mut coordinator = coordinator();
        coordinator.viewer_mut(0).data_plane = plane(5.0);
        coordinator.viewer_mut(0).slice_index = 5;

        let pending = coordinator.sync_all(0).unwrap();
        assert_eq!(pending, vec![1, 2]);
        assert!(coordinator.overlays_consistent(0));
        assert_eq!(coordinator.viewer(1).data_plane, plane(5.0));
        assert_eq!(coordinator.viewer(2).slice_index, 5);
    }

    #[test]
    fn window_level_changes_are_not_double_rendered() {
        let mut coordinator = coordinator();
        coordinator.viewer_mut(1).window = 250.0;
        coordinator.viewer_mut(1).level = 70.0;

        let pending = coordinator.sync_all(1).unwrap();
        assert!(pending.is_empty(), "window-level sync renders by itself");
        assert_eq!(coordinator.viewer(0).window, 250.0);
        assert_eq!(coordinator.viewer(2).level, 70.0);
    }

    #[test]
    fn suspended_coordinator_does_not_propagate() {
        let mut coordinator = coordinator();
        coordinator.suspend();
        coordinator.viewer_mut(0).data_plane = plane(3.0);

        assert!(coordinator.sync_all(0).unwrap().is_empty());
        assert_eq!(coordinator.viewer(1).data_plane, plane(0.0));

        coordinator.resume();
        assert_eq!(coordinator.sync_all(0).unwrap(), vec![1, 2]);
        assert!(coordinator.overlays_consistent(0));
    }

    #[test]
    fn inactive_overlays_are_left_alone() {
        let mut coordinator = coordinator();
        coordinator.viewer_mut(2).overlays[1].active = false;
        coordinator.viewer_mut(0).data_plane = plane(7.0);

        coordinator.sync_all(0).unwrap();
        assert_eq!(coordinator.viewer(2).overlays[1].plane, plane(0.0));
        assert!(coordinator.overlays_consistent(0));
    }

    #[test]
    fn sync_requires_all_viewers() {
        let mut coordinator = ViewSyncCoordinator::new();
        coordinator.register(SliceViewer::new(plane(0.0))).unwrap();
        assert!(matches!(coordinator.sync_all(0), Err(SyncError::NotReady)));
    }
}
