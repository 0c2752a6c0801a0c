/// Runtime configuration, loaded from TOML.
///
/// Every key is optional; a missing key takes the default listed in
/// `mod defaults`. `IngestConfig::default()` is the same as loading an empty
/// file.
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// `[region]`
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// Names tried in order; the first that opens wins.
    #[serde(default = "defaults::region_names")]
    pub names: Vec<String>,
    /// Where names resolve on POSIX.
    #[serde(default = "defaults::shm_dir")]
    pub shm_dir: PathBuf,
}

/// `[consistency]`
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyConfig {
    #[serde(default = "defaults::retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "defaults::retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// `[poller]`
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PollerConfig {
    #[serde(default = "defaults::poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
}

/// `[diagnostics]`
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Bare name (`SysMonDiag`) or a full pipe/socket path.
    ///
    /// A bare name becomes `\\.\pipe\<name>` on Windows and `/tmp/<name>`
    /// on POSIX. The POSIX producer listens on `/tmp/tcmt_diag.sock`, which
    /// differs from the default and has to be configured explicitly.
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,
    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "defaults::reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "defaults::max_frame_bytes")]
    pub max_frame_bytes: u32,
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
}

mod defaults {
    use std::path::PathBuf;

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn region_names() -> Vec<String> {
        crate::region::DEFAULT_REGION_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn shm_dir() -> PathBuf {
        PathBuf::from(crate::region::DEFAULT_SHM_DIR)
    }

    pub fn retry_budget() -> u32 {
        1
    }

    pub fn retry_delay_ms() -> u64 {
        2
    }

    pub fn poll_interval_ms() -> u64 {
        1000
    }

    pub fn channel_capacity() -> usize {
        64
    }

    pub fn endpoint() -> String {
        crate::platform::DEFAULT_DIAGNOSTICS_ENDPOINT.into()
    }

    pub fn connect_timeout_ms() -> u64 {
        3000
    }

    pub fn reconnect_delay_ms() -> u64 {
        2000
    }

    pub fn max_frame_bytes() -> u32 {
        1 << 20
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            region: RegionConfig::default(),
            consistency: ConsistencyConfig::default(),
            poller: PollerConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            names: defaults::region_names(),
            shm_dir: defaults::shm_dir(),
        }
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            retry_budget: defaults::retry_budget(),
            retry_delay_ms: defaults::retry_delay_ms(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: defaults::poll_interval_ms(),
            channel_capacity: defaults::channel_capacity(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::endpoint(),
            connect_timeout_ms: defaults::connect_timeout_ms(),
            reconnect_delay_ms: defaults::reconnect_delay_ms(),
            max_frame_bytes: defaults::max_frame_bytes(),
            channel_capacity: defaults::channel_capacity(),
        }
    }
}

impl IngestConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

impl ConsistencyConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl PollerConfig {
    /// Poll interval, never below 1 ms.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl DiagnosticsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_matches_default() {
        assert_eq!(IngestConfig::from_toml("").unwrap(), IngestConfig::default());
    }

    #[test]
    fn defaults_match_producer_contract() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.region.names[0], r"Global\SystemMonitorSharedMemory");
        assert_eq!(cfg.region.names.len(), 3);
        assert_eq!(cfg.consistency.retry_budget, 1);
        assert_eq!(cfg.consistency.retry_delay(), Duration::from_millis(2));
        assert_eq!(cfg.diagnostics.endpoint, "SysMonDiag");
        assert_eq!(cfg.diagnostics.connect_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.diagnostics.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(cfg.diagnostics.max_frame_bytes, 1_048_576);
    }

    #[test]
    fn overrides_apply_per_key() {
        let cfg = IngestConfig::from_toml(
            r#"
            log_level = "debug"

            [region]
            shm_dir = "/run/sysmon"

            [consistency]
            retry_budget = 3

            [diagnostics]
            endpoint = "/tmp/diag.sock"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.region.shm_dir, PathBuf::from("/run/sysmon"));
        assert_eq!(cfg.region.names.len(), 3);
        assert_eq!(cfg.consistency.retry_budget, 3);
        assert_eq!(cfg.consistency.retry_delay_ms, 2);
        assert_eq!(cfg.diagnostics.endpoint, "/tmp/diag.sock");
        assert_eq!(cfg.poller.interval_ms, 1000);
    }

    #[test]
    fn posix_producer_socket_is_used_verbatim() {
        let cfg = IngestConfig::from_toml(
            "[diagnostics]\nendpoint = \"/tmp/tcmt_diag.sock\"\n",
        )
        .unwrap();
        let connector = crate::PipeConnector::new(&cfg.diagnostics.endpoint);
        assert_eq!(
            crate::diagnostics::Connector::endpoint(&connector),
            "/tmp/tcmt_diag.sock"
        );
    }

    #[test]
    fn zero_poll_interval_is_raised_to_one_millisecond() {
        let cfg = IngestConfig::from_toml("[poller]\ninterval_ms = 0\n").unwrap();
        assert_eq!(cfg.poller.interval(), Duration::from_millis(1));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            IngestConfig::from_toml("[poller]\nintervall_ms = 5\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(IngestConfig::load(&path), Err(ConfigError::Read { .. })));

        let path = dir.path().join("sysmon.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[poller]\ninterval_ms = 250").unwrap();
        assert_eq!(IngestConfig::load(&path).unwrap().poller.interval_ms, 250);
    }
}
