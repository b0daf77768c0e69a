use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use serde::Deserialize;

lazy_static! {
    pub static ref CHANNELS_PARSED: IntCounter = register_int_counter!(
        "m3uedit_channels_parsed_total",
        "Channel records extracted from loaded playlists"
    )
    .unwrap();
    pub static ref PLAYLIST_LOADS: IntCounterVec = register_int_counter_vec!(
        "m3uedit_playlist_loads_total",
        "Playlist loads by source (url, file) and outcome (ok, error)",
        &["source", "outcome"]
    )
    .unwrap();
    pub static ref WORKSPACE_ROWS: IntGauge = register_int_gauge!(
        "m3uedit_workspace_rows",
        "Rows currently in the editing workspace"
    )
    .unwrap();
}

pub fn gather_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_monitoring_enabled")]
    pub enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitoring_enabled(),
        }
    }
}

fn default_monitoring_enabled() -> bool {
    true
}
