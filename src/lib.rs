// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! fwmix - control core for the router and mixer of firewire audio devices.
//!
//! Talks to the device control service over D-Bus and keeps a local, observable model
//! of the crossbar routing table and the matrix mixer.

pub mod config;
pub mod event;
pub mod meter;
pub mod mixer;
pub mod pan;
pub mod remote;
pub mod router;
pub mod session;

pub use event::ControlEvent;
pub use fwmix_ipc::{ControlError, ReplyPolarity};
pub use meter::MeterPoller;
pub use mixer::{Axis, MixMatrix};
pub use router::{RoutingTable, Selection};
pub use session::{DeviceSession, Session};
