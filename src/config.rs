//! Deployment configuration.
//!
//! The launch monitor ships one JSON document (`golf_sim_config.json`) for all
//! of its processes. The monitor reads the broker endpoint from
//! `gs_config.ipc_interface` and its display settings from
//! `gs_config.user_interface`; every other key is ignored.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::display::DisplayAssets;
use crate::error::ConfigError;
use crate::state::{DEFAULT_STALE_AFTER_SECS, DEFAULT_TICK_SECS};

pub const DEFAULT_TOPIC: &str = "Golf.Sim";
pub const DEFAULT_SYSTEM_ID: &str = "LM_GUI";
/// Byte messages above this size are dropped before decode.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

const IMAGE_SUFFIX: &str = ".png";

#[derive(Deserialize)]
struct ConfigFile {
    gs_config: GsConfig,
}

#[derive(Deserialize)]
struct GsConfig {
    ipc_interface: IpcInterface,
    #[serde(default)]
    user_interface: UserInterface,
}

#[derive(Deserialize)]
struct IpcInterface {
    #[serde(rename = "kWebActiveMQHostAddress", default)]
    host_address: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct UserInterface {
    #[serde(rename = "kWebServerTomcatShareDirectory")]
    share_directory: Option<String>,
    #[serde(rename = "kWebServerResultBallExposureCandidates")]
    exposure_candidates: Option<String>,
    #[serde(rename = "kWebServerResultSpinBall1Image")]
    spin_ball_1: Option<String>,
    #[serde(rename = "kWebServerResultSpinBall2Image")]
    spin_ball_2: Option<String>,
    #[serde(rename = "kWebServerResultBallRotatedByBestAngles")]
    ball_rotated: Option<String>,
    #[serde(rename = "kWebServerErrorExposuresImage")]
    error_exposures: Option<String>,
    #[serde(rename = "kWebServerBallSearchAreaImage")]
    ball_search_area: Option<String>,
    #[serde(rename = "kRefreshTimeSeconds")]
    refresh_secs: Option<u32>,
}

/// Everything the monitor needs at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Broker endpoint, e.g. `tcp://10.0.0.41:61613`. Opaque to the core.
    pub endpoint: String,
    pub topic: String,
    /// Value of the `LM_System_ID` property on outbound messages.
    pub system_id: String,
    /// Render refresh period; also the staleness tick size.
    pub refresh_secs: u32,
    pub stale_after_secs: u32,
    pub poll_interval: Duration,
    pub max_payload_bytes: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub assets: DisplayAssets,
}

impl MonitorConfig {
    /// Defaults for everything except the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            topic: DEFAULT_TOPIC.to_owned(),
            system_id: DEFAULT_SYSTEM_ID.to_owned(),
            refresh_secs: DEFAULT_TICK_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            assets: DisplayAssets::default(),
        }
    }

    /// Read and parse the deployment config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            endpoint = %config.endpoint,
            share_directory = %config.assets.share_directory,
            refresh_secs = config.refresh_secs,
            "loaded monitor config"
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)?;
        let endpoint = file
            .gs_config
            .ipc_interface
            .host_address
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;

        let ui = file.gs_config.user_interface;
        let mut config = Self::new(endpoint);
        if let Some(secs) = ui.refresh_secs.filter(|&s| s > 0) {
            config.refresh_secs = secs;
        }
        config.assets = DisplayAssets {
            share_directory: ui.share_directory.unwrap_or_default(),
            exposure_candidates: image_name(ui.exposure_candidates),
            spin_ball_1: image_name(ui.spin_ball_1),
            spin_ball_2: image_name(ui.spin_ball_2),
            ball_rotated: image_name(ui.ball_rotated),
            error_exposures: image_name(ui.error_exposures),
            ball_search_area: image_name(ui.ball_search_area),
        };
        Ok(config)
    }
}

/// Image base names are configured without their extension.
fn image_name(base: Option<String>) -> String {
    match base {
        Some(b) if !b.is_empty() => format!("{b}{IMAGE_SUFFIX}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "gs_config": {
            "ipc_interface": {
                "kWebActiveMQHostAddress": "tcp://10.0.0.41:61613",
                "kOtherProcessSetting": 3
            },
            "user_interface": {
                "kWebServerTomcatShareDirectory": "/golfsim/share",
                "kWebServerResultBallExposureCandidates": "log_ball_exposure_candidates",
                "kWebServerResultSpinBall1Image": "spin_ball_1",
                "kWebServerResultSpinBall2Image": "spin_ball_2",
                "kWebServerResultBallRotatedByBestAngles": "ball_rotated",
                "kWebServerErrorExposuresImage": "error_exposures",
                "kWebServerBallSearchAreaImage": "ball_search_area",
                "kRefreshTimeSeconds": 3
            },
            "cameras": { "kCamera1Gain": 1.5 }
        }
    }"#;

    #[test]
    fn parses_deployment_document() {
        let c = MonitorConfig::from_json(SAMPLE).unwrap();
        assert_eq!(c.endpoint, "tcp://10.0.0.41:61613");
        assert_eq!(c.refresh_secs, 3);
        assert_eq!(c.stale_after_secs, DEFAULT_STALE_AFTER_SECS);
        assert_eq!(c.topic, "Golf.Sim");
        assert_eq!(c.max_payload_bytes, 10_000);
        assert_eq!(c.assets.share_directory, "/golfsim/share");
        assert_eq!(c.assets.exposure_candidates, "log_ball_exposure_candidates.png");
        assert_eq!(c.assets.ball_search_area, "ball_search_area.png");
    }

    #[test]
    fn user_interface_is_optional() {
        let c = MonitorConfig::from_json(
            r#"{"gs_config": {"ipc_interface": {"kWebActiveMQHostAddress": "host:61613"}}}"#,
        )
        .unwrap();
        assert_eq!(c.refresh_secs, DEFAULT_TICK_SECS);
        assert_eq!(c.assets, DisplayAssets::default());
    }

    #[test]
    fn missing_endpoint_fails() {
        let err = MonitorConfig::from_json(r#"{"gs_config": {"ipc_interface": {}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));

        let err = MonitorConfig::from_json(
            r#"{"gs_config": {"ipc_interface": {"kWebActiveMQHostAddress": "  "}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));
    }

    #[test]
    fn missing_sections_and_bad_json() {
        assert!(matches!(
            MonitorConfig::from_json(r#"{"gs_config": {}}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            MonitorConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn unreadable_file() {
        let err = MonitorConfig::load("/nonexistent/golf_sim_config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn zero_refresh_keeps_default() {
        let c = MonitorConfig::from_json(
            r#"{"gs_config": {"ipc_interface": {"kWebActiveMQHostAddress": "h:1"},
                "user_interface": {"kRefreshTimeSeconds": 0}}}"#,
        )
        .unwrap();
        assert_eq!(c.refresh_secs, DEFAULT_TICK_SECS);
    }
}
