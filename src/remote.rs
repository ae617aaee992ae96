// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! D-Bus client side of the device control service.
//!
//! The controllers only see the [`RouterService`] and [`MatrixService`] traits; the
//! blocking zbus proxies below are the production implementations.

use fwmix_ipc::{ControlError, PeakValue};
use tracing::{debug, info};
use zbus::blocking::Connection;
use zbus::{proxy, Result as ZbusResult};

/// D-Bus proxy for a crossbar router element.
#[proxy(
    interface = "org.ffado.Control.Element.CrossbarRouter",
    default_service = "org.ffado.Control"
)]
trait CrossbarRouter {
    #[zbus(name = "getDestinationNames")]
    fn get_destination_names(&self) -> ZbusResult<Vec<String>>;
    #[zbus(name = "getSourceNames")]
    fn get_source_names(&self) -> ZbusResult<Vec<String>>;
    #[zbus(name = "getDestinationIndex")]
    fn get_destination_index(&self, name: &str) -> ZbusResult<i32>;
    #[zbus(name = "getSourceName")]
    fn get_source_name(&self, index: i32) -> ZbusResult<String>;
    #[zbus(name = "getSourceForDestination")]
    fn get_source_for_destination(&self, destination: i32) -> ZbusResult<i32>;
    #[zbus(name = "setConnectionStateNamed")]
    fn set_connection_state_named(
        &self,
        source: &str,
        destination: &str,
        connect: bool,
    ) -> ZbusResult<bool>;
    #[zbus(name = "canConnectNamed")]
    fn can_connect_named(&self, source: &str, destination: &str) -> ZbusResult<bool>;
    #[zbus(name = "getPeakValues")]
    fn get_peak_values(&self) -> ZbusResult<Vec<PeakValue>>;
}

/// D-Bus proxy for a matrix mixer element.
#[proxy(
    interface = "org.ffado.Control.Element.MatrixMixer",
    default_service = "org.ffado.Control"
)]
trait MatrixMixer {
    #[zbus(name = "getRowCount")]
    fn get_row_count(&self) -> ZbusResult<i32>;
    #[zbus(name = "getColCount")]
    fn get_col_count(&self) -> ZbusResult<i32>;
    #[zbus(name = "getRowName")]
    fn get_row_name(&self, row: i32) -> ZbusResult<String>;
    #[zbus(name = "getColName")]
    fn get_col_name(&self, col: i32) -> ZbusResult<String>;
    #[zbus(name = "getValue")]
    fn get_value(&self, row: i32, col: i32) -> ZbusResult<f64>;
    #[zbus(name = "setValue")]
    fn set_value(&self, row: i32, col: i32, value: f64) -> ZbusResult<f64>;
}

/// Query/command surface of a crossbar router.
pub trait RouterService {
    fn destination_names(&self) -> Result<Vec<String>, ControlError>;
    fn source_names(&self) -> Result<Vec<String>, ControlError>;
    fn destination_index(&self, name: &str) -> Result<i32, ControlError>;
    fn source_name(&self, index: i32) -> Result<String, ControlError>;
    /// Active source of a destination, [`fwmix_ipc::NO_SOURCE`] when disconnected.
    fn source_for_destination(&self, destination: i32) -> Result<i32, ControlError>;
    /// Raw reply flag; its meaning depends on [`fwmix_ipc::ReplyPolarity`].
    fn set_connection_state_named(
        &self,
        source: &str,
        destination: &str,
        connect: bool,
    ) -> Result<bool, ControlError>;
    fn can_connect_named(&self, source: &str, destination: &str) -> Result<bool, ControlError>;
    fn peak_values(&self) -> Result<Vec<PeakValue>, ControlError>;
}

/// Query/command surface of a matrix mixer. Rows are outputs, columns inputs.
pub trait MatrixService {
    fn row_count(&self) -> Result<usize, ControlError>;
    fn col_count(&self) -> Result<usize, ControlError>;
    fn row_name(&self, row: usize) -> Result<String, ControlError>;
    fn col_name(&self, col: usize) -> Result<String, ControlError>;
    fn value(&self, row: usize, col: usize) -> Result<f64, ControlError>;
    fn set_value(&self, row: usize, col: usize, value: f64) -> Result<(), ControlError>;
}

fn wire_index(index: usize) -> Result<i32, ControlError> {
    i32::try_from(index).map_err(|_| ControlError::IndexOutOfRange(index.to_string()))
}

fn wire_count(count: i32) -> Result<usize, ControlError> {
    usize::try_from(count)
        .map_err(|_| ControlError::MethodCallFailed(format!("negative count {}", count)))
}

impl RouterService for CrossbarRouterProxyBlocking<'_> {
    fn destination_names(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.get_destination_names()?)
    }

    fn source_names(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.get_source_names()?)
    }

    fn destination_index(&self, name: &str) -> Result<i32, ControlError> {
        Ok(self.get_destination_index(name)?)
    }

    fn source_name(&self, index: i32) -> Result<String, ControlError> {
        Ok(self.get_source_name(index)?)
    }

    fn source_for_destination(&self, destination: i32) -> Result<i32, ControlError> {
        Ok(self.get_source_for_destination(destination)?)
    }

    fn set_connection_state_named(
        &self,
        source: &str,
        destination: &str,
        connect: bool,
    ) -> Result<bool, ControlError> {
        debug!("setConnectionStateNamed({}, {}, {})", source, destination, connect);
        Ok(CrossbarRouterProxyBlocking::set_connection_state_named(
            self,
            source,
            destination,
            connect,
        )?)
    }

    fn can_connect_named(&self, source: &str, destination: &str) -> Result<bool, ControlError> {
        Ok(CrossbarRouterProxyBlocking::can_connect_named(
            self,
            source,
            destination,
        )?)
    }

    fn peak_values(&self) -> Result<Vec<PeakValue>, ControlError> {
        Ok(self.get_peak_values()?)
    }
}

impl MatrixService for MatrixMixerProxyBlocking<'_> {
    fn row_count(&self) -> Result<usize, ControlError> {
        wire_count(self.get_row_count()?)
    }

    fn col_count(&self) -> Result<usize, ControlError> {
        wire_count(self.get_col_count()?)
    }

    fn row_name(&self, row: usize) -> Result<String, ControlError> {
        Ok(self.get_row_name(wire_index(row)?)?)
    }

    fn col_name(&self, col: usize) -> Result<String, ControlError> {
        Ok(self.get_col_name(wire_index(col)?)?)
    }

    fn value(&self, row: usize, col: usize) -> Result<f64, ControlError> {
        Ok(self.get_value(wire_index(row)?, wire_index(col)?)?)
    }

    fn set_value(&self, row: usize, col: usize, value: f64) -> Result<(), ControlError> {
        MatrixMixerProxyBlocking::set_value(self, wire_index(row)?, wire_index(col)?, value)?;
        Ok(())
    }
}

/// Connection to the device control service on the session bus.
pub struct DeviceClient {
    connection: Connection,
    service: String,
}

impl DeviceClient {
    /// Connect to the session bus, addressing `service`.
    pub fn connect(service: &str) -> Result<Self, ControlError> {
        info!("Connecting to device control service {}...", service);
        let connection =
            Connection::session().map_err(|e| ControlError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            connection,
            service: service.to_string(),
        })
    }

    /// Proxy for the crossbar router element at `path`.
    pub fn router(&self, path: &str) -> Result<CrossbarRouterProxyBlocking<'static>, ControlError> {
        debug!("Creating router proxy at {}", path);
        Ok(CrossbarRouterProxyBlocking::builder(&self.connection)
            .destination(self.service.clone())?
            .path(path.to_string())?
            .build()?)
    }

    /// Proxy for the matrix mixer element at `path`.
    pub fn mixer(&self, path: &str) -> Result<MatrixMixerProxyBlocking<'static>, ControlError> {
        debug!("Creating mixer proxy at {}", path);
        Ok(MatrixMixerProxyBlocking::builder(&self.connection)
            .destination(self.service.clone())?
            .path(path.to_string())?
            .build()?)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory services that record every command they receive.

    use super::{MatrixService, RouterService};
    use fwmix_ipc::{ControlError, PeakValue, NO_SOURCE};
    use std::cell::{Cell, RefCell};

    /// Crossbar router double. Replies use the observed polarity (`false` = applied).
    pub struct FakeRouter {
        pub destinations: Vec<String>,
        pub sources: Vec<String>,
        pub routes: RefCell<Vec<i32>>,
        pub peaks: RefCell<Vec<PeakValue>>,
        pub commands: RefCell<Vec<(String, String, bool)>>,
        pub reject: Cell<bool>,
        pub offline: Cell<bool>,
    }

    impl FakeRouter {
        pub fn new(destinations: &[&str], sources: &[&str]) -> Self {
            Self {
                destinations: destinations.iter().map(|s| s.to_string()).collect(),
                sources: sources.iter().map(|s| s.to_string()).collect(),
                routes: RefCell::new(vec![NO_SOURCE; destinations.len()]),
                peaks: RefCell::new(Vec::new()),
                commands: RefCell::new(Vec::new()),
                reject: Cell::new(false),
                offline: Cell::new(false),
            }
        }

        fn check_online(&self) -> Result<(), ControlError> {
            if self.offline.get() {
                Err(ControlError::MethodCallFailed("service gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl RouterService for FakeRouter {
        fn destination_names(&self) -> Result<Vec<String>, ControlError> {
            Ok(self.destinations.clone())
        }

        fn source_names(&self) -> Result<Vec<String>, ControlError> {
            Ok(self.sources.clone())
        }

        fn destination_index(&self, name: &str) -> Result<i32, ControlError> {
            Ok(self
                .destinations
                .iter()
                .position(|d| d == name)
                .map(|i| i as i32)
                .unwrap_or(-1))
        }

        fn source_name(&self, index: i32) -> Result<String, ControlError> {
            Ok(usize::try_from(index)
                .ok()
                .and_then(|i| self.sources.get(i).cloned())
                .unwrap_or_default())
        }

        fn source_for_destination(&self, destination: i32) -> Result<i32, ControlError> {
            self.check_online()?;
            Ok(self.routes.borrow()[destination as usize])
        }

        fn set_connection_state_named(
            &self,
            source: &str,
            destination: &str,
            connect: bool,
        ) -> Result<bool, ControlError> {
            self.check_online()?;
            self.commands
                .borrow_mut()
                .push((source.to_string(), destination.to_string(), connect));
            if self.reject.get() {
                return Ok(true);
            }
            let dst = self.destinations.iter().position(|d| d == destination);
            let src = self.sources.iter().position(|s| s == source);
            match (dst, src) {
                (Some(d), Some(s)) => {
                    let mut routes = self.routes.borrow_mut();
                    if connect {
                        routes[d] = s as i32;
                    } else if routes[d] == s as i32 {
                        routes[d] = NO_SOURCE;
                    }
                    Ok(false)
                }
                _ => Ok(true),
            }
        }

        fn can_connect_named(&self, source: &str, _destination: &str) -> Result<bool, ControlError> {
            Ok(self.sources.iter().any(|s| s == source))
        }

        fn peak_values(&self) -> Result<Vec<PeakValue>, ControlError> {
            self.check_online()?;
            Ok(self.peaks.borrow().clone())
        }
    }

    /// Matrix mixer double backed by a dense row-major value grid.
    pub struct FakeMatrix {
        pub rows: Vec<String>,
        pub cols: Vec<String>,
        pub values: RefCell<Vec<f64>>,
        pub writes: RefCell<Vec<(usize, usize, f64)>>,
        pub fail_writes: Cell<bool>,
    }

    impl FakeMatrix {
        pub fn new(rows: usize, cols: usize) -> Self {
            Self {
                rows: (0..rows).map(|i| format!("Mix {}", i)).collect(),
                cols: (0..cols).map(|i| format!("In {}", i)).collect(),
                values: RefCell::new(vec![0.0; rows * cols]),
                writes: RefCell::new(Vec::new()),
                fail_writes: Cell::new(false),
            }
        }

        pub fn get(&self, row: usize, col: usize) -> f64 {
            self.values.borrow()[row * self.cols.len() + col]
        }

        pub fn put(&self, row: usize, col: usize, value: f64) {
            let cols = self.cols.len();
            self.values.borrow_mut()[row * cols + col] = value;
        }
    }

    impl MatrixService for FakeMatrix {
        fn row_count(&self) -> Result<usize, ControlError> {
            Ok(self.rows.len())
        }

        fn col_count(&self) -> Result<usize, ControlError> {
            Ok(self.cols.len())
        }

        fn row_name(&self, row: usize) -> Result<String, ControlError> {
            Ok(self.rows[row].clone())
        }

        fn col_name(&self, col: usize) -> Result<String, ControlError> {
            Ok(self.cols[col].clone())
        }

        fn value(&self, row: usize, col: usize) -> Result<f64, ControlError> {
            Ok(self.get(row, col))
        }

        fn set_value(&self, row: usize, col: usize, value: f64) -> Result<(), ControlError> {
            if self.fail_writes.get() {
                return Err(ControlError::MethodCallFailed("write refused".to_string()));
            }
            self.writes.borrow_mut().push((row, col, value));
            self.put(row, col, value);
            Ok(())
        }
    }
}
