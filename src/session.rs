// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A control session: the controllers of one device and the meter poller.

use crate::config::AppConfig;
use crate::event::EventSender;
use crate::meter::MeterPoller;
use crate::mixer::MixMatrix;
use crate::remote::{
    CrossbarRouterProxyBlocking, DeviceClient, MatrixMixerProxyBlocking, MatrixService,
    RouterService,
};
use crate::router::RoutingTable;
use fwmix_ipc::ControlError;
use tracing::{debug, info, warn};

pub type DeviceSession =
    Session<CrossbarRouterProxyBlocking<'static>, MatrixMixerProxyBlocking<'static>>;

/// Controllers of one device, whichever of them the device offers.
pub struct Session<R, M> {
    router: Option<RoutingTable<R>>,
    mixer: Option<MixMatrix<M>>,
    poller: MeterPoller,
}

impl DeviceSession {
    /// Connect to the configured service and snapshot every configured element.
    pub fn open(config: &AppConfig, events: EventSender) -> Result<Self, ControlError> {
        let client = DeviceClient::connect(&config.service.name)?;

        let router = match &config.service.router_path {
            Some(path) => {
                let mut table =
                    RoutingTable::new(client.router(path)?, config.router.reply_polarity)?;
                table.set_peak_scale(config.meter.peak_scale);
                Some(table)
            }
            None => None,
        };
        let mixer = match &config.service.mixer_path {
            Some(path) => Some(MixMatrix::new(client.mixer(path)?)?),
            None => None,
        };

        let mut session = Session::from_parts(
            router,
            mixer,
            MeterPoller::new(config.meter.interval()),
        );
        session.set_event_sender(events);
        Ok(session)
    }
}

impl<R: RouterService, M: MatrixService> Session<R, M> {
    pub fn from_parts(
        router: Option<RoutingTable<R>>,
        mixer: Option<MixMatrix<M>>,
        poller: MeterPoller,
    ) -> Self {
        Self {
            router,
            mixer,
            poller,
        }
    }

    pub fn set_event_sender(&mut self, tx: EventSender) {
        if let Some(router) = &mut self.router {
            router.set_event_sender(tx.clone());
        }
        if let Some(mixer) = &mut self.mixer {
            mixer.set_event_sender(tx);
        }
    }

    pub fn router(&self) -> Option<&RoutingTable<R>> {
        self.router.as_ref()
    }

    pub fn router_mut(&mut self) -> Option<&mut RoutingTable<R>> {
        self.router.as_mut()
    }

    pub fn mixer(&self) -> Option<&MixMatrix<M>> {
        self.mixer.as_ref()
    }

    pub fn mixer_mut(&mut self) -> Option<&mut MixMatrix<M>> {
        self.mixer.as_mut()
    }

    pub fn poller(&self) -> &MeterPoller {
        &self.poller
    }

    /// The single metering toggle. Without a router there is nothing to meter.
    pub fn set_metering(&mut self, run: bool) {
        match &mut self.router {
            Some(router) => self.poller.set_running(router, run),
            None => debug!("No router, metering stays off"),
        }
    }

    /// One timer tick. Poll failures are logged and leave the cached peaks alone.
    pub fn poll(&mut self) {
        if let Some(router) = &mut self.router {
            if let Err(e) = self.poller.tick(router) {
                warn!("Peak poll failed: {}", e);
            }
        }
    }

    /// Log what the device looks like right now.
    pub fn log_snapshot(&self) {
        if let Some(router) = &self.router {
            for dest in router.destinations() {
                let source = dest
                    .selection()
                    .source()
                    .and_then(|s| router.sources().get(s))
                    .map(|s| s.name.as_str())
                    .unwrap_or("-");
                info!("Route {} <- {}", dest.name, source);
            }
        }
        if let Some(mixer) = &self.mixer {
            info!(
                "Mixer {}x{}, {} cells visible",
                mixer.rows().len(),
                mixer.cols().len(),
                mixer.visible_cell_count()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, ControlEvent};
    use crate::remote::fake::{FakeMatrix, FakeRouter};
    use fwmix_ipc::{PeakValue, ReplyPolarity};
    use std::time::Duration;

    fn session() -> Session<FakeRouter, FakeMatrix> {
        let router = RoutingTable::new(
            FakeRouter::new(&["Out:00", "Out:01"], &["In:00"]),
            ReplyPolarity::default(),
        )
        .unwrap();
        let mixer = MixMatrix::new(FakeMatrix::new(2, 2)).unwrap();
        Session::from_parts(
            Some(router),
            Some(mixer),
            MeterPoller::new(Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_metering_toggle() {
        let mut s = session();
        let (tx, mut rx) = event::channel();
        s.set_event_sender(tx);
        *s.router().unwrap().service().peaks.borrow_mut() = vec![PeakValue::new(1, 640.0)];

        s.poll();
        assert_eq!(s.router().unwrap().peak(1), Some(0));

        s.set_metering(true);
        s.poll();
        assert_eq!(s.router().unwrap().peak(1), Some(640));
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlEvent::PeakUpdated {
                destination: 1,
                level: 640
            }
        );

        s.set_metering(false);
        assert_eq!(s.router().unwrap().peak(1), Some(0));
        assert!(!s.poller().is_running());
    }

    #[test]
    fn test_poll_failure_is_not_fatal() {
        let mut s = session();
        s.set_metering(true);
        s.router().unwrap().service().offline.set(true);
        s.poll();
        s.log_snapshot();
    }

    #[test]
    fn test_mixer_only_session() {
        let mut s: Session<FakeRouter, FakeMatrix> = Session::from_parts(
            None,
            Some(MixMatrix::new(FakeMatrix::new(1, 2)).unwrap()),
            MeterPoller::default(),
        );
        s.set_metering(true);
        assert!(!s.poller().is_running());
        s.mixer_mut().unwrap().set_fader(0, 1, 10).unwrap();
        assert_eq!(s.mixer().unwrap().cell(0, 1).unwrap().fader(), 10);
    }
}
