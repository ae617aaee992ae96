// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Session configuration (service addressing, metering, protocol quirks).

use crate::meter::DEFAULT_INTERVAL;
use crate::router::DEFAULT_PEAK_SCALE;
use fwmix_ipc::{ReplyPolarity, DBUS_NAME};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the device control service lives on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// D-Bus service name.
    pub name: String,
    /// Object path of the crossbar router element, if the device has one.
    pub router_path: Option<String>,
    /// Object path of the matrix mixer element, if the device has one.
    pub mixer_path: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: DBUS_NAME.to_string(),
            router_path: None,
            mixer_path: None,
        }
    }
}

/// Peak meter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Polling period in milliseconds.
    pub interval_ms: u64,
    /// Level shown as a full meter.
    pub peak_scale: i32,
    /// Start polling as soon as the session is up.
    pub start_running: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
            peak_scale: DEFAULT_PEAK_SCALE,
            start_running: true,
        }
    }
}

impl MeterConfig {
    /// Polling period, never shorter than 10 ms.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(10))
    }
}

/// Router protocol settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// How to read the reply of a connection change.
    #[serde(default)]
    pub reply_polarity: ReplyPolarity,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub meter: MeterConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

impl AppConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.service.name, "org.ffado.Control");
        assert_eq!(config.meter.interval(), Duration::from_millis(200));
        assert_eq!(config.meter.peak_scale, 4096);
        assert_eq!(config.router.reply_polarity, ReplyPolarity::TrueIsFailure);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [service]
            name = "org.ffado.Control"
            mixer_path = "/org/ffado/Control/DeviceManager/0012345678/Mixer"

            [router]
            reply_polarity = "true_is_success"
            "#,
        )
        .unwrap();
        assert!(config.service.router_path.is_none());
        assert!(config.service.mixer_path.is_some());
        assert_eq!(config.meter.interval_ms, 200);
        assert_eq!(config.router.reply_polarity, ReplyPolarity::TrueIsSuccess);
    }

    #[test]
    fn test_interval_floor() {
        let meter = MeterConfig {
            interval_ms: 0,
            ..MeterConfig::default()
        };
        assert_eq!(meter.interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_toml_round_trip_keeps_polarity() {
        let mut config = AppConfig::default();
        config.router.reply_polarity = ReplyPolarity::TrueIsSuccess;
        let parsed = AppConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.router.reply_polarity, ReplyPolarity::TrueIsSuccess);
    }
}
