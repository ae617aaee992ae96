// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Peak metering for router destinations.
//!
//! The poller only decides *what* a tick does; the session drives it from a timer so
//! that a tick is never issued while another one is still running.

use crate::remote::RouterService;
use crate::router::RoutingTable;
use fwmix_ipc::ControlError;
use std::time::Duration;
use tracing::{debug, trace};

/// Default polling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// Start/stop controlled peak poller.
#[derive(Debug, Clone)]
pub struct MeterPoller {
    interval: Duration,
    running: bool,
}

impl Default for MeterPoller {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl MeterPoller {
    /// Create a stopped poller ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start or stop polling.
    ///
    /// Stopping always zeroes the cached peaks so a halted meter never shows a stale level.
    pub fn set_running<S: RouterService>(&mut self, table: &mut RoutingTable<S>, run: bool) {
        debug!("Meter polling {}", if run { "started" } else { "stopped" });
        self.running = run;
        if !run {
            table.reset_peaks();
        }
    }

    /// Poll the service once and cache every valid peak.
    ///
    /// Returns the number of destinations updated. Does nothing while stopped.
    pub fn tick<S: RouterService>(&self, table: &mut RoutingTable<S>) -> Result<usize, ControlError> {
        if !self.running {
            return Ok(0);
        }
        let peaks = table.service().peak_values()?;
        trace!("Got {} peaks", peaks.len());

        let mut applied = 0;
        for peak in peaks {
            if let Some(destination) = peak.destination_index() {
                if table.apply_peak(destination, peak.level.round() as i32) {
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, ControlEvent};
    use crate::remote::fake::FakeRouter;
    use fwmix_ipc::{PeakValue, ReplyPolarity};

    fn table() -> RoutingTable<FakeRouter> {
        RoutingTable::new(
            FakeRouter::new(&["Out:00", "Out:01", "Out:02"], &["In:00"]),
            ReplyPolarity::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_interval() {
        let poller = MeterPoller::default();
        assert_eq!(poller.interval(), Duration::from_millis(200));
        assert!(!poller.is_running());
    }

    #[test]
    fn test_tick_skips_sentinels() {
        let mut t = table();
        *t.service().peaks.borrow_mut() = vec![
            PeakValue::new(0, 1000.0),
            PeakValue::new(-1, 4000.0),
            PeakValue::new(2, 3071.6),
        ];
        let mut poller = MeterPoller::default();
        poller.set_running(&mut t, true);

        assert_eq!(poller.tick(&mut t).unwrap(), 2);
        assert_eq!(t.peak(0), Some(1000));
        assert_eq!(t.peak(1), Some(0));
        assert_eq!(t.peak(2), Some(3072));
    }

    #[test]
    fn test_stopped_poller_does_not_poll() {
        let mut t = table();
        *t.service().peaks.borrow_mut() = vec![PeakValue::new(1, 500.0)];
        let poller = MeterPoller::default();
        assert_eq!(poller.tick(&mut t).unwrap(), 0);
        assert_eq!(t.peak(1), Some(0));
    }

    #[test]
    fn test_stop_resets_all_peaks() {
        let mut t = table();
        *t.service().peaks.borrow_mut() = vec![
            PeakValue::new(0, 4096.0),
            PeakValue::new(1, 12.0),
            PeakValue::new(2, 700.0),
        ];
        let mut poller = MeterPoller::default();
        poller.set_running(&mut t, true);
        poller.tick(&mut t).unwrap();

        poller.set_running(&mut t, false);
        assert!(t.destinations().iter().all(|d| d.peak() == 0));

        // Stopping an already stopped poller still clears.
        t.apply_peak(1, 99);
        poller.set_running(&mut t, false);
        assert_eq!(t.peak(1), Some(0));
    }

    #[test]
    fn test_stop_emits_zero_peak_per_destination() {
        let mut t = table();
        let (tx, mut rx) = event::channel();
        t.set_event_sender(tx);
        let mut poller = MeterPoller::default();
        poller.set_running(&mut t, true);

        poller.set_running(&mut t, false);
        for destination in 0..3 {
            assert_eq!(
                rx.try_recv().unwrap(),
                ControlEvent::PeakUpdated {
                    destination,
                    level: 0
                }
            );
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_destination_not_counted() {
        let mut t = table();
        *t.service().peaks.borrow_mut() =
            vec![PeakValue::new(1, 250.0), PeakValue::new(5, 900.0)];
        let mut poller = MeterPoller::default();
        poller.set_running(&mut t, true);

        assert_eq!(poller.tick(&mut t).unwrap(), 1);
        assert_eq!(t.peak(1), Some(250));
        assert!(!t.apply_peak(5, 10));
    }

    #[test]
    fn test_failed_poll_leaves_peaks() {
        let mut t = table();
        let mut poller = MeterPoller::default();
        poller.set_running(&mut t, true);
        t.apply_peak(0, 300);
        t.service().offline.set(true);

        assert!(poller.tick(&mut t).is_err());
        assert_eq!(t.peak(0), Some(300));
    }
}
