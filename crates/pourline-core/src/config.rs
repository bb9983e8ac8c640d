use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout_secs() -> f64 {
    5.0
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// PollingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: f64,
}

fn default_interval_secs() -> f64 {
    2.0
}

fn default_error_backoff_secs() -> f64 {
    5.0
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        secs(self.error_backoff_secs)
    }
}

// ---------------------------------------------------------------------------
// DispenseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseConfig {
    /// Valve-open time per dispensing unit (one cup).
    #[serde(default = "default_unit_seconds")]
    pub unit_seconds: f64,
    /// Longest single valve pulse; items asking for more are refused.
    #[serde(default = "default_max_pour_secs")]
    pub max_pour_secs: f64,
}

fn default_unit_seconds() -> f64 {
    5.0
}

fn default_max_pour_secs() -> f64 {
    300.0
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            unit_seconds: default_unit_seconds(),
            max_pour_secs: default_max_pour_secs(),
        }
    }
}

impl DispenseConfig {
    /// `quantity × unit_seconds`, with non-positive quantities pouring nothing.
    /// Saturates instead of overflowing for absurd quantities.
    pub fn duration_for(&self, quantity: i64) -> Duration {
        let units = quantity.max(0) as f64;
        secs(units * self.unit_seconds)
    }

    pub fn max_pour(&self) -> Duration {
        secs(self.max_pour_secs)
    }
}

// ---------------------------------------------------------------------------
// HardwareConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Use GPIO when the sysfs interface is present, otherwise simulate.
    Auto,
    Gpio,
    Simulation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
    /// Channel name → BCM pin of each output valve.
    #[serde(default = "default_valves")]
    pub valves: BTreeMap<String, u32>,
    /// Channel name → BCM pin of each flow sensor input.
    #[serde(default = "default_flow_sensors")]
    pub flow_sensors: BTreeMap<String, u32>,
}

fn default_backend() -> BackendKind {
    BackendKind::Auto
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_valves() -> BTreeMap<String, u32> {
    (1..=4u32)
        .map(|n| (format!("valve_{n}"), 17 + n))
        .collect()
}

fn default_flow_sensors() -> BTreeMap<String, u32> {
    (1..=4u32)
        .map(|n| (format!("flow_sensor_{n}"), 21 + n))
        .collect()
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            gpio_root: default_gpio_root(),
            valves: default_valves(),
            flow_sensors: default_flow_sensors(),
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub dispense: DispenseConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BridgeError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    /// Parse YAML; an empty document yields the defaults.
    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: BridgeConfig = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("api.base_url '{base}' must start with http:// or https://"),
            });
        }

        if !is_positive(self.api.timeout_secs) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api.timeout_secs must be positive".to_string(),
            });
        }

        if !is_positive(self.polling.interval_secs) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "polling.interval_secs={} busy-polls the API",
                    self.polling.interval_secs
                ),
            });
        }

        if self.polling.error_backoff_secs < self.polling.interval_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "polling.error_backoff_secs={} is shorter than interval_secs={}",
                    self.polling.error_backoff_secs, self.polling.interval_secs
                ),
            });
        }

        let bounded = [
            ("api.timeout_secs", self.api.timeout_secs),
            ("polling.interval_secs", self.polling.interval_secs),
            ("polling.error_backoff_secs", self.polling.error_backoff_secs),
            ("dispense.unit_seconds", self.dispense.unit_seconds),
            ("dispense.max_pour_secs", self.dispense.max_pour_secs),
        ];
        for (field, value) in bounded {
            if value > MAX_CONFIG_SECS {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{field}={value} exceeds {MAX_CONFIG_SECS} seconds"),
                });
            }
        }

        if !(self.dispense.unit_seconds == 0.0 || is_positive(self.dispense.unit_seconds)) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "dispense.unit_seconds must be zero or positive".to_string(),
            });
        }

        if !is_positive(self.dispense.max_pour_secs) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "dispense.max_pour_secs must be positive".to_string(),
            });
        }

        if self.hardware.valves.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "hardware.valves is empty: nothing can be dispensed".to_string(),
            });
        }

        let mut seen: HashMap<u32, &str> = HashMap::new();
        let channels = self
            .hardware
            .valves
            .iter()
            .chain(self.hardware.flow_sensors.iter());
        for (name, pin) in channels {
            if let Some(prev) = seen.insert(*pin, name) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("pin {pin} is assigned to both '{prev}' and '{name}'"),
                });
            }
        }

        warnings
    }
}

/// Upper bound for every duration field in the file (one day).
pub const MAX_CONFIG_SECS: f64 = 86_400.0;

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Seconds → `Duration`, clamping negatives and NaN to zero and values too
/// large for `Duration` to `Duration::MAX`.
pub fn secs(value: f64) -> Duration {
    if is_positive(value) {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
