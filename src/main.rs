// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! fwmix - router and mixer control session for firewire audio devices.

use fwmix::config::{AppConfig, ConfigManager};
use fwmix::event::{self, ControlEvent};
use fwmix::DeviceSession;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;

fn log_event(event: &ControlEvent) {
    match event {
        ControlEvent::PeakUpdated { destination, level } => {
            trace!("Peak of destination {}: {}", destination, level)
        }
        ControlEvent::GridRefreshed { visible_cells } => {
            debug!("{} mixer cells visible", visible_cells)
        }
        other => info!("{:?}", other),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fwmix=debug".parse()?)
                .add_directive("zbus=warn".parse()?),
        )
        .init();

    info!("Starting fwmix");

    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    if config.service.router_path.is_none() && config.service.mixer_path.is_none() {
        if !config_manager.config_path().exists() {
            config_manager.save_config(&config)?;
        }
        warn!(
            "Neither service.router_path nor service.mixer_path is set in {}",
            config_manager.config_path().display()
        );
        return Ok(());
    }

    let (tx, mut rx) = event::channel();
    let mut session = DeviceSession::open(&config, tx)?;
    session.log_snapshot();
    session.set_metering(config.meter.start_running);

    let mut ticker = tokio::time::interval(session.poller().interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => session.poll(),
            Some(event) = rx.recv() => log_event(&event),
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    session.set_metering(false);
    while let Ok(event) = rx.try_recv() {
        log_event(&event);
    }

    info!("fwmix stopped");
    Ok(())
}
