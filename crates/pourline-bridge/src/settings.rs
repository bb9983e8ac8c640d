use anyhow::{bail, Context, Result};
use pourline_core::config::{BackendKind, BridgeConfig, WarnLevel};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "pourline.yaml";

/// Command-line and environment overrides applied on top of the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub api_base: Option<String>,
    pub simulate: bool,
}

/// Build the effective configuration: file (or defaults), then overrides,
/// then validation. Error-level findings abort.
pub fn resolve(overrides: &Overrides, cwd: &Path) -> Result<BridgeConfig> {
    let mut config = match &overrides.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let implicit = cwd.join(DEFAULT_CONFIG_FILE);
            if implicit.exists() {
                BridgeConfig::load(&implicit)
                    .with_context(|| format!("loading config {}", implicit.display()))?
            } else {
                BridgeConfig::default()
            }
        }
    };

    if let Some(base) = &overrides.api_base {
        config.api.base_url = base.clone();
    }
    if overrides.simulate {
        config.hardware.backend = BackendKind::Simulation;
    }

    let mut errors = Vec::new();
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Warning => tracing::warn!(warning = %warning.message, "config warning"),
            WarnLevel::Error => {
                tracing::error!(error = %warning.message, "config error");
                errors.push(warning.message);
            }
        }
    }
    if !errors.is_empty() {
        bail!("invalid configuration: {}", errors.join("; "));
    }

    Ok(config)
}

pub fn log_effective(config: &BridgeConfig) {
    tracing::info!(
        api = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        poll_secs = config.polling.interval_secs,
        backoff_secs = config.polling.error_backoff_secs,
        unit_secs = config.dispense.unit_seconds,
        max_pour_secs = config.dispense.max_pour_secs,
        backend = ?config.hardware.backend,
        "configuration"
    );
    for (name, pin) in &config.hardware.valves {
        tracing::info!(channel = %name, pin, "valve channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_file_present() {
        let dir = TempDir::new().unwrap();
        let cfg = resolve(&Overrides::default(), dir.path()).unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:5000/api");
        assert_eq!(cfg.hardware.backend, BackendKind::Auto);
    }

    #[test]
    fn implicit_file_in_working_directory_is_used() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "polling:\n  interval_secs: 3\n  error_backoff_secs: 10\n",
        )
        .unwrap();
        let cfg = resolve(&Overrides::default(), dir.path()).unwrap();
        assert_eq!(cfg.polling.interval_secs, 3.0);
        assert_eq!(cfg.polling.error_backoff_secs, 10.0);
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.yaml");
        std::fs::write(&path, "api:\n  base_url: http://file.example/api\n").unwrap();
        let overrides = Overrides {
            config: Some(path),
            api_base: Some("http://flag.example/api".into()),
            simulate: true,
        };
        let cfg = resolve(&overrides, dir.path()).unwrap();
        assert_eq!(cfg.api.base_url, "http://flag.example/api");
        assert_eq!(cfg.hardware.backend, BackendKind::Simulation);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let overrides = Overrides {
            config: Some(dir.path().join("absent.yaml")),
            ..Overrides::default()
        };
        let err = resolve(&overrides, dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("absent.yaml"));
    }

    #[test]
    fn error_level_findings_abort() {
        let dir = TempDir::new().unwrap();
        let overrides = Overrides {
            api_base: Some("ftp://kiosk/api".into()),
            ..Overrides::default()
        };
        let err = resolve(&overrides, dir.path()).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn oversized_backoff_in_file_aborts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "polling:\n  error_backoff_secs: 1.0e30\n",
        )
        .unwrap();
        let err = resolve(&Overrides::default(), dir.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("polling.error_backoff_secs"));
        assert!(msg.contains("exceeds"));
    }
}
