// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Matrix mixer - gain grid with stereo coupling and channel hiding.
//!
//! Rows are mixer outputs, columns mixer inputs, matching the device's own
//! `getValue(row, col)` addressing. Coupling a channel with its successor folds the
//! successor into the channel's cells; a coupled-away channel disappears from the
//! visible grid exactly like a hidden one.

use crate::event::{ControlEvent, EventOutlet, EventSender};
use crate::pan::{self, PanPosition, Panner};
use crate::remote::MatrixService;
use fwmix_ipc::{ControlError, FADER_MAX};
use std::fmt;
use tracing::{debug, info, warn};

/// Which side of the grid a channel sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Outputs.
    Row,
    /// Inputs.
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Column => write!(f, "column"),
        }
    }
}

/// Pairing state of a channel. Independent of the hidden flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coupling {
    #[default]
    Normal,
    /// Starts a pair with the next channel.
    Primary,
    /// Folded into the previous channel.
    Secondary,
}

/// A row or column header.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    hidden: bool,
    coupling: Coupling,
}

impl Channel {
    fn new(name: String) -> Self {
        Self {
            name,
            hidden: false,
            coupling: Coupling::Normal,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn coupling(&self) -> Coupling {
        self.coupling
    }
}

/// Per-channel state of one axis, indexed by ordinal.
#[derive(Debug, Clone, Default)]
pub struct AxisState {
    channels: Vec<Channel>,
}

impl AxisState {
    fn new(names: Vec<String>) -> Self {
        Self {
            channels: names.into_iter().map(Channel::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn is_hidden(&self, index: usize) -> bool {
        self.channels.get(index).is_some_and(|c| c.hidden)
    }

    pub fn is_coupled(&self, index: usize) -> bool {
        self.coupling(index) == Coupling::Primary
    }

    pub fn is_coupled_away(&self, index: usize) -> bool {
        self.coupling(index) == Coupling::Secondary
    }

    /// Whether the couple control of `index` is enabled.
    ///
    /// It needs a successor and must not be folded into its predecessor. It is disabled
    /// while the successor starts a pair of its own and while the channel is hidden.
    pub fn can_couple(&self, index: usize) -> bool {
        index + 1 < self.len()
            && !self.is_hidden(index)
            && !self.is_coupled_away(index)
            && !self.is_coupled(index + 1)
    }

    /// Headers of coupled-away channels are not shown; hidden ones stay to be unhidden.
    pub fn header_visible(&self, index: usize) -> bool {
        index < self.len() && !self.is_coupled_away(index)
    }

    fn suppressed(&self, index: usize) -> bool {
        self.is_hidden(index) || self.is_coupled_away(index)
    }

    fn coupling(&self, index: usize) -> Coupling {
        self.channels
            .get(index)
            .map(|c| c.coupling)
            .unwrap_or_default()
    }
}

/// Visibility of a cell: neither its row nor its column is hidden or coupled away.
pub fn cell_visible(rows: &AxisState, cols: &AxisState, row: usize, col: usize) -> bool {
    !(rows.suppressed(row) || cols.suppressed(col))
}

/// One grid node: the physical inputs and outputs it drives and its fader.
#[derive(Debug, Clone)]
pub struct Cell {
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    fader: u16,
    visible: bool,
    panner: Panner,
}

impl Cell {
    fn new(input: usize, output: usize) -> Self {
        Self {
            inputs: vec![input],
            outputs: vec![output],
            fader: 0,
            visible: true,
            panner: Panner::new(1, 1),
        }
    }

    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    pub fn fader(&self) -> u16 {
        self.fader
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn panner(&self) -> &Panner {
        &self.panner
    }

    /// Whether the cell needs a panner to spread its fader.
    pub fn is_panned(&self) -> bool {
        self.outputs.len() > 1
    }

    fn members_mut(&mut self, axis: Axis) -> &mut Vec<usize> {
        match axis {
            Axis::Row => &mut self.outputs,
            Axis::Column => &mut self.inputs,
        }
    }

    fn update_members(&mut self, axis: Axis, index: usize, add: bool) {
        let members = self.members_mut(axis);
        match (members.binary_search(&index), add) {
            (Err(pos), true) => members.insert(pos, index),
            (Ok(pos), false) => {
                members.remove(pos);
            }
            _ => {}
        }
        self.panner.set_number_of_sources(self.inputs.len());
        self.panner.set_number_of_sinks(self.outputs.len());
    }
}

/// Gain grid of one matrix mixer.
pub struct MixMatrix<S> {
    service: S,
    rows: AxisState,
    cols: AxisState,
    cells: Vec<Cell>,
    events: EventOutlet,
}

impl<S: MatrixService> MixMatrix<S> {
    /// Build the grid from a snapshot of the service and read back every fader.
    pub fn new(service: S) -> Result<Self, ControlError> {
        let row_count = service.row_count()?;
        let col_count = service.col_count()?;
        info!("Mixer has {} rows and {} columns", row_count, col_count);

        let rows = AxisState::new(
            (0..row_count)
                .map(|i| service.row_name(i))
                .collect::<Result<_, _>>()?,
        );
        let cols = AxisState::new(
            (0..col_count)
                .map(|i| service.col_name(i))
                .collect::<Result<_, _>>()?,
        );

        let cells = (0..row_count)
            .flat_map(|row| (0..col_count).map(move |col| Cell::new(col, row)))
            .collect();

        let mut matrix = Self {
            service,
            rows,
            cols,
            cells,
            events: EventOutlet::default(),
        };
        for row in 0..row_count {
            for col in 0..col_count {
                matrix.refresh_cell(row, col)?;
            }
        }
        matrix.refresh_visibility();
        Ok(matrix)
    }

    pub fn set_event_sender(&mut self, tx: EventSender) {
        self.events.set_sender(tx);
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn rows(&self) -> &AxisState {
        &self.rows
    }

    pub fn cols(&self) -> &AxisState {
        &self.cols
    }

    pub fn axis(&self, axis: Axis) -> &AxisState {
        match axis {
            Axis::Row => &self.rows,
            Axis::Column => &self.cols,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.position(row, col).map(|pos| &self.cells[pos])
    }

    pub fn is_visible(&self, row: usize, col: usize) -> bool {
        self.cell(row, col).is_some_and(|c| c.visible)
    }

    pub fn visible_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.visible).count()
    }

    /// Hide or show a channel.
    pub fn hide(&mut self, axis: Axis, index: usize, hidden: bool) -> Result<(), ControlError> {
        let channel = self
            .axis_mut(axis)
            .channels
            .get_mut(index)
            .ok_or_else(|| ControlError::IndexOutOfRange(format!("{} {}", axis, index)))?;
        if channel.hidden == hidden {
            return Ok(());
        }
        channel.hidden = hidden;
        debug!("{} {} hidden: {}", axis, index, hidden);
        self.events.emit(ControlEvent::ChannelHidden {
            axis,
            index,
            hidden,
        });
        self.refresh_visibility();
        Ok(())
    }

    /// Pair `index` with `index + 1`, or dissolve that pair.
    ///
    /// Preconditions are checked before anything changes.
    pub fn couple(&mut self, axis: Axis, index: usize, couple: bool) -> Result<(), ControlError> {
        let state = self.axis(axis);
        if index >= state.len() {
            return Err(ControlError::IndexOutOfRange(format!("{} {}", axis, index)));
        }
        if index + 1 >= state.len() {
            return Err(ControlError::InconsistentState(format!(
                "{} {} has no successor to couple with",
                axis, index
            )));
        }
        if couple {
            if state.is_coupled(index) {
                return Err(ControlError::InconsistentState(format!(
                    "{} {} is already coupled",
                    axis, index
                )));
            }
            if state.is_hidden(index) {
                return Err(ControlError::InconsistentState(format!(
                    "{} {} is hidden",
                    axis, index
                )));
            }
            if !state.can_couple(index) {
                return Err(ControlError::InconsistentState(format!(
                    "{} {} or its successor is part of another pair",
                    axis, index
                )));
            }
        } else if !state.is_coupled(index) {
            return Err(ControlError::InconsistentState(format!(
                "{} {} is not coupled",
                axis, index
            )));
        }

        let partner = index + 1;
        let (primary, secondary) = if couple {
            (Coupling::Primary, Coupling::Secondary)
        } else {
            (Coupling::Normal, Coupling::Normal)
        };
        let channels = &mut self.axis_mut(axis).channels;
        channels[index].coupling = primary;
        channels[partner].coupling = secondary;
        debug!("{} {} coupled with {}: {}", axis, index, partner, couple);

        // The partner joins every cell along `index` and leaves the cells along itself.
        let mut touched = Vec::new();
        for other in 0..self.axis(other_axis(axis)).len() {
            let (a, b) = match axis {
                Axis::Row => ((index, other), (partner, other)),
                Axis::Column => ((other, index), (other, partner)),
            };
            for ((row, col), add) in [(a, couple), (b, !couple)] {
                if let Some(pos) = self.position(row, col) {
                    self.cells[pos].update_members(axis, partner, add);
                    touched.push((row, col));
                }
            }
        }
        for (row, col) in touched {
            if let Err(e) = self.refresh_cell(row, col) {
                warn!("Could not read back cell ({}, {}): {}", row, col, e);
            }
        }

        self.events.emit(ControlEvent::ChannelCoupled {
            axis,
            index,
            coupled: couple,
        });
        self.refresh_visibility();
        Ok(())
    }

    /// Move the fader of a cell and write the resulting gains to the device.
    ///
    /// Returns the number of matrix writes issued.
    pub fn set_fader(&mut self, row: usize, col: usize, value: u16) -> Result<usize, ControlError> {
        let pos = self.driven_position(row, col)?;
        if self.cells[pos].fader != value {
            self.cells[pos].fader = value;
            self.events.emit(ControlEvent::CellGainChanged {
                row,
                col,
                fader: value,
            });
        }

        let cell = &self.cells[pos];
        let Some(writes) = pan::compute(&cell.inputs, &cell.outputs, value, &cell.panner) else {
            debug!("Cell ({}, {}) has no pan data yet, nothing written", row, col);
            return Ok(0);
        };

        for write in &writes {
            if let Err(e) = self.service.set_value(write.output, write.input, write.gain) {
                warn!(
                    "Failed to set gain of input {} to output {}: {}",
                    write.input, write.output, e
                );
                if let Err(e) = self.refresh_cell(row, col) {
                    warn!("Could not read back cell ({}, {}): {}", row, col, e);
                }
                return Err(e);
            }
        }
        Ok(writes.len())
    }

    /// Move one input of a panned cell and re-apply its fader.
    pub fn set_pan(
        &mut self,
        row: usize,
        col: usize,
        input: usize,
        position: PanPosition,
    ) -> Result<usize, ControlError> {
        let pos = self.driven_position(row, col)?;
        if !self.cells[pos].panner.set_source_position(input, position) {
            return Err(ControlError::IndexOutOfRange(format!(
                "pan source {} of cell ({}, {})",
                input, row, col
            )));
        }
        let fader = self.cells[pos].fader;
        self.set_fader(row, col, fader)
    }

    /// Re-derive the displayed fader of a cell from the device.
    ///
    /// Shows the loudest (output, input) pair of the cell; the pan position is not
    /// reconstructed.
    pub fn refresh_cell(&mut self, row: usize, col: usize) -> Result<u16, ControlError> {
        let pos = self
            .position(row, col)
            .ok_or_else(|| ControlError::IndexOutOfRange(format!("cell ({}, {})", row, col)))?;
        let cell = &self.cells[pos];
        if cell.inputs.is_empty() || cell.outputs.is_empty() {
            return Ok(cell.fader);
        }

        let mut loudest = f64::MIN;
        for &output in &cell.outputs {
            for &input in &cell.inputs {
                loudest = loudest.max(self.service.value(output, input)?);
            }
        }
        let fader = loudest.round().clamp(0.0, f64::from(FADER_MAX)) as u16;

        if self.cells[pos].fader != fader {
            self.cells[pos].fader = fader;
            self.events
                .emit(ControlEvent::CellGainChanged { row, col, fader });
        }
        Ok(fader)
    }

    /// Recompute visibility of every cell.
    fn refresh_visibility(&mut self) {
        let col_count = self.cols.len();
        for (pos, cell) in self.cells.iter_mut().enumerate() {
            cell.visible = cell_visible(&self.rows, &self.cols, pos / col_count, pos % col_count);
        }
        let visible_cells = self.visible_cell_count();
        debug!("{} of {} cells visible", visible_cells, self.cells.len());
        self.events
            .emit(ControlEvent::GridRefreshed { visible_cells });
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisState {
        match axis {
            Axis::Row => &mut self.rows,
            Axis::Column => &mut self.cols,
        }
    }

    /// Position of a cell that still drives at least one (output, input) pair.
    fn driven_position(&self, row: usize, col: usize) -> Result<usize, ControlError> {
        let pos = self
            .position(row, col)
            .ok_or_else(|| ControlError::IndexOutOfRange(format!("cell ({}, {})", row, col)))?;
        let cell = &self.cells[pos];
        if cell.inputs.is_empty() || cell.outputs.is_empty() {
            return Err(ControlError::InconsistentState(format!(
                "cell ({}, {}) is folded into a coupled pair",
                row, col
            )));
        }
        Ok(pos)
    }

    fn position(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows.len() && col < self.cols.len()).then(|| row * self.cols.len() + col)
    }
}

fn other_axis(axis: Axis) -> Axis {
    match axis {
        Axis::Row => Axis::Column,
        Axis::Column => Axis::Row,
    }
}
