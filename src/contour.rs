//! Isocontour extraction on 2D dose slices.
//!
//! Marching squares over the slice grid: every cell contributes up to two
//! line segments with endpoints interpolated onto grid edges, and segments
//! sharing a grid edge are chained into polylines. Vertices are emitted in
//! world millimeters using the in-plane spacing of the slice.

use ndarray::ArrayView2;
use std::collections::HashMap;
use std::collections::VecDeque;

/// One open or closed isoline in slice-plane coordinates (x along columns,
/// y along rows, both in mm).
#[derive(Clone, Debug, PartialEq)]
pub struct Polyline {
    pub points: Vec<[f32; 2]>,
    pub closed: bool,
}

/// Grid edge holding one interpolated crossing; shared between the two
/// cells adjacent to the edge, which is what makes chaining exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EdgeKey {
    row: usize,
    col: usize,
    horizontal: bool,
}

enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Extract all isolines of `slice` at `threshold`.
///
/// A voxel with value >= threshold counts as inside. `spacing` is the
/// in-plane (row, column) spacing in mm.
pub fn extract_contours(
    slice: &ArrayView2<'_, i32>,
    threshold: f32,
    spacing: (f32, f32),
) -> Vec<Polyline> {
    let (rows, cols) = slice.dim();
    if rows < 2 || cols < 2 {
        return Vec::new();
    }

    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();
    let mut points: HashMap<EdgeKey, [f32; 2]> = HashMap::new();

    for row in 0..rows - 1 {
        for col in 0..cols - 1 {
            let tl = slice[[row, col]] as f32;
            let tr = slice[[row, col + 1]] as f32;
            let br = slice[[row + 1, col + 1]] as f32;
            let bl = slice[[row + 1, col]] as f32;

            let mut mask = 0u8;
            if tl >= threshold {
                mask |= 1;
            }
            if tr >= threshold {
                mask |= 2;
            }
            if br >= threshold {
                mask |= 4;
            }
            if bl >= threshold {
                mask |= 8;
            }
            if mask == 0 || mask == 15 {
                continue;
            }

            let center_inside = (tl + tr + br + bl) / 4.0 >= threshold;
            let pairs: &[(Edge, Edge)] = match mask {
                1 => &[(Edge::Top, Edge::Left)],
                2 => &[(Edge::Top, Edge::Right)],
                3 => &[(Edge::Left, Edge::Right)],
                4 => &[(Edge::Right, Edge::Bottom)],
                5 if center_inside => &[(Edge::Top, Edge::Right), (Edge::Left, Edge::Bottom)],
                5 => &[(Edge::Top, Edge::Left), (Edge::Right, Edge::Bottom)],
                6 => &[(Edge::Top, Edge::Bottom)],
                7 => &[(Edge::Left, Edge::Bottom)],
                8 => &[(Edge::Left, Edge::Bottom)],
                9 => &[(Edge::Top, Edge::Bottom)],
                10 if center_inside => &[(Edge::Top, Edge::Left), (Edge::Right, Edge::Bottom)],
                10 => &[(Edge::Top, Edge::Right), (Edge::Left, Edge::Bottom)],
                11 => &[(Edge::Right, Edge::Bottom)],
                12 => &[(Edge::Left, Edge::Right)],
                13 => &[(Edge::Top, Edge::Right)],
                14 => &[(Edge::Top, Edge::Left)],
                _ => &[],
            };

            for (a, b) in pairs {
                let ka = edge_point(a, row, col, tl, tr, br, bl, threshold, spacing, &mut points);
                let kb = edge_point(b, row, col, tl, tr, br, bl, threshold, spacing, &mut points);
                segments.push((ka, kb));
            }
        }
    }

    chain(&segments, &points)
}

#[allow(clippy::too_many_arguments)]
fn edge_point(
    edge: &Edge,
    row: usize,
    col: usize,
    tl: f32,
    tr: f32,
    br: f32,
    bl: f32,
    threshold: f32,
    spacing: (f32, f32),
    points: &mut HashMap<EdgeKey, [f32; 2]>,
) -> EdgeKey {
    let (key, fr, fc) = match edge {
        Edge::Top => (
            EdgeKey { row, col, horizontal: true },
            row as f32,
            col as f32 + crossing(tl, tr, threshold),
        ),
        Edge::Bottom => (
            EdgeKey { row: row + 1, col, horizontal: true },
            (row + 1) as f32,
            col as f32 + crossing(bl, br, threshold),
        ),
        Edge::Left => (
            EdgeKey { row, col, horizontal: false },
            row as f32 + crossing(tl, bl, threshold),
            col as f32,
        ),
        Edge::Right => (
            EdgeKey { row, col: col + 1, horizontal: false },
            row as f32 + crossing(tr, br, threshold),
            (col + 1) as f32,
        ),
    };
    let (row_spacing, col_spacing) = spacing;
    points.insert(key, [fc * col_spacing, fr * row_spacing]);
    key
}

fn crossing(a: f32, b: f32, threshold: f32) -> f32 {
    if (b - a).abs() < f32::EPSILON {
        0.5
    } else {
        ((threshold - a) / (b - a)).clamp(0.0, 1.0)
    }
}

fn chain(segments: &[(EdgeKey, EdgeKey)], points: &HashMap<EdgeKey, [f32; 2]>) -> Vec<Polyline> {
    let mut adjacency: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (index, (a, b)) in segments.iter().enumerate() {
        adjacency.entry(*a).or_default().push(index);
        adjacency.entry(*b).or_default().push(index);
    }

    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut keys: VecDeque<EdgeKey> = VecDeque::from([a, b]);

        extend(&mut keys, &adjacency, segments, &mut used, true);
        let closed = keys.len() > 2 && keys.front() == keys.back();
        if closed {
            keys.pop_back();
        } else {
            extend(&mut keys, &adjacency, segments, &mut used, false);
        }

        polylines.push(Polyline {
            points: keys.iter().map(|key| points[key]).collect(),
            closed,
        });
    }
    polylines
}

fn extend(
    keys: &mut VecDeque<EdgeKey>,
    adjacency: &HashMap<EdgeKey, Vec<usize>>,
    segments: &[(EdgeKey, EdgeKey)],
    used: &mut [bool],
    forward: bool,
) {
    loop {
        let tip = if forward { keys.back() } else { keys.front() };
        let Some(&tip) = tip else {
            break;
        };
        let Some(next) = adjacency
            .get(&tip)
            .and_then(|ids| ids.iter().copied().find(|&id| !used[id]))
        else {
            break;
        };
        used[next] = true;
        let (a, b) = segments[next];
        let other = if a == tip { b } else { a };
        if forward {
            keys.push_back(other);
        } else {
            keys.push_front(other);
        }
    }
}
