// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared IPC types and D-Bus interface definitions for fwmix.
//!
//! This crate defines the vocabulary spoken between the fwmix control core and the
//! device control service (the FFADO D-Bus server).

use serde::{Deserialize, Serialize};
use zbus::zvariant::Type;

/// Default D-Bus service name of the device control server.
pub const DBUS_NAME: &str = "org.ffado.Control";

/// Source index reported for a destination with nothing connected.
pub const NO_SOURCE: i32 = -1;

/// Separator between a port group and the port number in router names ("ADAT:03").
pub const GROUP_SEPARATOR: char = ':';

/// Largest value a matrix fader can take.
pub const FADER_MAX: u16 = u16::MAX;

/// One entry of a peak-meter poll.
///
/// Entries with a negative destination are placeholders and carry no level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Type)]
pub struct PeakValue {
    /// Destination index, negative when the slot is unused.
    pub destination: i32,
    /// Peak level in device units.
    pub level: f64,
}

impl PeakValue {
    pub fn new(destination: i32, level: f64) -> Self {
        Self { destination, level }
    }

    /// Destination index for entries that refer to a real destination.
    pub fn destination_index(&self) -> Option<usize> {
        usize::try_from(self.destination).ok()
    }
}

/// How the reply of `setConnectionStateNamed` is to be read.
///
/// The observed protocol answers `false` on success, which is easy to get backwards,
/// so the reading is kept explicit and configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPolarity {
    /// A truthy reply reports a failure (observed behavior).
    #[default]
    TrueIsFailure,
    /// A truthy reply reports success.
    TrueIsSuccess,
}

impl ReplyPolarity {
    /// Interpret a raw reply flag as "the command was applied".
    pub fn succeeded(self, reply: bool) -> bool {
        match self {
            ReplyPolarity::TrueIsFailure => !reply,
            ReplyPolarity::TrueIsSuccess => reply,
        }
    }
}

/// Error types for control operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("Command rejected by device: {0}")]
    CommandRejected(String),
    #[error("Method call failed: {0}")]
    MethodCallFailed(String),
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),
    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),
    #[error("Failed to connect to D-Bus: {0}")]
    ConnectionFailed(String),
}

impl From<zbus::Error> for ControlError {
    fn from(e: zbus::Error) -> Self {
        ControlError::MethodCallFailed(e.to_string())
    }
}
