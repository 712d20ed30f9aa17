//! Integer-indexed color and opacity lookup tables for the render layer.
//!
//! Statistic overlays share one heated-body ramp; band overlays and slot
//! colors use fixed single-hue ramps. Tables are rebuilt whenever the scalar
//! range changes, i.e. on every ensemble reload.

/// Fixed multi-stop RGB gradient with linear interpolation between stops.
#[derive(Clone, Debug)]
pub struct Gradient {
    stops: Vec<(f32, [f32; 3])>,
}

impl Gradient {
    pub fn heated_body() -> Self {
        Self {
            stops: vec![
                (0.0, [0.0, 0.0, 0.0]),
                (0.2, [0.462, 0.0, 0.0]),
                (0.4, [0.902, 0.0, 0.0]),
                (0.6, [0.902, 0.443, 0.0]),
                (0.8, [0.902, 0.647, 0.0]),
                (1.0, [0.902, 0.902, 0.0]),
            ],
        }
    }

    pub fn single_hue(color: [f32; 3]) -> Self {
        Self {
            stops: vec![(0.0, color), (1.0, color)],
        }
    }

    /// Sample the gradient at `t` in [0, 1]; out-of-range values clamp to
    /// the first/last stop.
    pub fn sample(&self, t: f32) -> [f32; 3] {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        for window in self.stops.windows(2) {
            let (t0, c0) = window[0];
            let (t1, c1) = window[1];
            if t <= t1 {
                let frac = (t - t0) / (t1 - t0);
                return [
                    c0[0] + (c1[0] - c0[0]) * frac,
                    c0[1] + (c1[1] - c0[1]) * frac,
                    c0[2] + (c1[2] - c0[2]) * frac,
                ];
            }
        }
        last.1
    }
}

#[derive(Clone, Debug)]
pub enum PaletteKind {
    HeatedBody,
    SingleHue([f32; 3]),
}

impl PaletteKind {
    fn gradient(&self) -> Gradient {
        match self {
            PaletteKind::HeatedBody => Gradient::heated_body(),
            PaletteKind::SingleHue(color) => Gradient::single_hue(*color),
        }
    }
}

/// Per-integer-code RGBA table consumed by the external renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupTable {
    entries: Vec<[f32; 4]>,
}

impl LookupTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, code: usize) -> Option<[f32; 4]> {
        self.entries.get(code).copied()
    }

    pub fn entries(&self) -> &[[f32; 4]] {
        &self.entries
    }
}

/// Build an exact per-integer-code table of size `max_value + 1`.
///
/// Codes below `min_value` map to fully transparent black, code 0 is always
/// fully transparent, and `min_value..=max_value` walk the palette so that
/// `max_value` lands exactly on the last gradient stop.
pub fn build(min_value: i32, max_value: i32, palette: PaletteKind) -> LookupTable {
    let min = min_value.max(0);
    let max = max_value.max(min);
    let gradient = palette.gradient();
    let span = (max - min) as f32;

    let mut entries = Vec::with_capacity(max as usize + 1);
    for code in 0..=max {
        if code < min || code == 0 {
            entries.push([0.0, 0.0, 0.0, 0.0]);
            continue;
        }
        let t = if span > 0.0 {
            (code - min) as f32 / span
        } else {
            1.0
        };
        let [r, g, b] = gradient.sample(t);
        entries.push([r, g, b, 1.0]);
    }
    LookupTable { entries }
}

/// Three-entry table for a ternary agreement-band mask: code 0 is outside
/// (transparent), codes 1 and 2 render in the slot hue at the given alpha.
pub fn band_table(color: [f32; 3], alpha: f32) -> LookupTable {
    LookupTable {
        entries: vec![
            [0.0, 0.0, 0.0, 0.0],
            [color[0], color[1], color[2], alpha],
            [color[0], color[1], color[2], alpha],
        ],
    }
}
