// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Events pushed from the controllers up to the presentation layer.

use crate::mixer::Axis;
use crate::router::Selection;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// A state change the presentation layer should reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// New peak level cached for a destination.
    PeakUpdated { destination: usize, level: i32 },
    /// The active source of a destination changed (user action or refresh).
    SelectionChanged {
        destination: usize,
        selection: Selection,
    },
    /// A mixer channel was hidden or shown by the user.
    ChannelHidden {
        axis: Axis,
        index: usize,
        hidden: bool,
    },
    /// A mixer channel started or ended a pair with its successor.
    ChannelCoupled {
        axis: Axis,
        index: usize,
        coupled: bool,
    },
    /// The displayed fader of a cell changed.
    CellGainChanged { row: usize, col: usize, fader: u16 },
    /// Cell visibility was recomputed for the whole grid.
    GridRefreshed { visible_cells: usize },
}

pub type EventSender = UnboundedSender<ControlEvent>;
pub type EventReceiver = UnboundedReceiver<ControlEvent>;

/// Create a new event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Optional event outlet shared by the controllers.
#[derive(Debug, Default, Clone)]
pub(crate) struct EventOutlet {
    tx: Option<EventSender>,
}

impl EventOutlet {
    pub(crate) fn set_sender(&mut self, tx: EventSender) {
        self.tx = Some(tx);
    }

    pub(crate) fn emit(&self, event: ControlEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching any more.
            let _ = tx.send(event);
        }
    }
}
