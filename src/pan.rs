// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Single fader plus pan position to per-output gains.
//!
//! A mixer cell spanning several outputs (a coupled row pair) is driven by one fader.
//! An N-to-M [`Panner`] places the cell's inputs on a plane around its outputs and
//! yields one weight per (input, output) pair; [`pan_law`] turns that weight into a
//! gain factor.

/// Weights above this are treated as this.
pub const MAX_PAN_WEIGHT: f64 = 2.0;

/// Gain factor for a pan weight: `1 - (min(w, 2) / 2)^2`.
///
/// 0 gives full gain, 1 (centre) gives 0.75 and 2 silences the pair.
pub fn pan_law(weight: f64) -> f64 {
    let w = weight.min(MAX_PAN_WEIGHT);
    1.0 - (w / 2.0).powi(2)
}

/// Normalized position on the panning plane, both axes in -1.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanPosition {
    pub x: f64,
    pub y: f64,
}

impl PanPosition {
    pub const CENTER: PanPosition = PanPosition { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(-1.0, 1.0),
            y: y.clamp(-1.0, 1.0),
        }
    }

    fn distance(&self, other: &PanPosition) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// N-to-M panner: inputs are movable sources, outputs are fixed sinks on the unit circle.
#[derive(Debug, Clone, Default)]
pub struct Panner {
    sources: Vec<PanPosition>,
    sinks: Vec<PanPosition>,
}

impl Panner {
    pub fn new(sources: usize, sinks: usize) -> Self {
        let mut panner = Self::default();
        panner.set_number_of_sources(sources);
        panner.set_number_of_sinks(sinks);
        panner
    }

    /// Resize the source list; new sources start at the centre.
    pub fn set_number_of_sources(&mut self, count: usize) {
        self.sources.resize(count, PanPosition::CENTER);
    }

    /// Spread `count` sinks evenly on the unit circle, the first one hard left.
    pub fn set_number_of_sinks(&mut self, count: usize) {
        self.sinks = (0..count)
            .map(|j| {
                let angle =
                    std::f64::consts::PI + j as f64 * std::f64::consts::TAU / count as f64;
                PanPosition {
                    x: angle.cos(),
                    y: angle.sin(),
                }
            })
            .collect();
    }

    pub fn number_of_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn number_of_sinks(&self) -> usize {
        self.sinks.len()
    }

    pub fn source_position(&self, source: usize) -> Option<PanPosition> {
        self.sources.get(source).copied()
    }

    /// Move one source. Returns `false` for an unknown source.
    pub fn set_source_position(&mut self, source: usize, position: PanPosition) -> bool {
        match self.sources.get_mut(source) {
            Some(slot) => {
                *slot = position;
                true
            }
            None => false,
        }
    }

    /// Distance of every source to every sink, `weights[input][output]`.
    ///
    /// `None` while the panner has no sources or no sinks.
    pub fn weights(&self) -> Option<Vec<Vec<f64>>> {
        if self.sources.is_empty() || self.sinks.is_empty() {
            return None;
        }
        Some(
            self.sources
                .iter()
                .map(|src| self.sinks.iter().map(|sink| src.distance(sink)).collect())
                .collect(),
        )
    }
}

/// One matrix write produced by a fader move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainWrite {
    pub input: usize,
    pub output: usize,
    pub gain: f64,
}

/// Gains for every (input, output) pair of a cell.
///
/// A single output takes the fader as is. Several outputs are weighted through the
/// panner; `None` means the panner has nothing to offer yet and nothing should be
/// written.
pub fn compute(
    inputs: &[usize],
    outputs: &[usize],
    fader: u16,
    panner: &Panner,
) -> Option<Vec<GainWrite>> {
    let fader = f64::from(fader);

    if outputs.len() <= 1 {
        return Some(
            inputs
                .iter()
                .flat_map(|&input| {
                    outputs.iter().map(move |&output| GainWrite {
                        input,
                        output,
                        gain: fader,
                    })
                })
                .collect(),
        );
    }

    let weights = panner.weights()?;
    if weights.len() != inputs.len() || weights.iter().any(|row| row.len() != outputs.len()) {
        return None;
    }

    let mut writes = Vec::with_capacity(inputs.len() * outputs.len());
    for (i, &input) in inputs.iter().enumerate() {
        for (j, &output) in outputs.iter().enumerate() {
            writes.push(GainWrite {
                input,
                output,
                gain: pan_law(weights[i][j]) * fader,
            });
        }
    }
    Some(writes)
}
