use anyhow::Result;
use chrono::Duration;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::orders::OrderStatus;
use crate::sla::{SlaPolicy, SlaThresholds, ThresholdError};
use crate::workers::SkillAliases;

/// Longest accepted reminder cool-down: one year.
pub const MAX_REMINDER_COOLDOWN_HOURS: f64 = 24.0 * 365.0;

/// Settings that parse but cannot drive an engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Thresholds(#[from] ThresholdError),
    #[error("notifications.reminder_cooldown_hours must be between 0 and 8760 (one year), got {0}")]
    ReminderCooldown(f64),
}

/// Main configuration structure for field dispatch
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// SLA threshold table
    pub sla: SlaConfig,
    /// Worker matching settings
    pub assignment: AssignmentConfig,
    /// Worker notification settings
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Hour boundaries for one status: NORMAL up to `attention`, ATTENTION up to
/// `overdue`, OVERDUE up to `critical`, CRITICAL beyond.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ThresholdHours {
    pub attention: f64,
    pub overdue: f64,
    pub critical: f64,
}

impl ThresholdHours {
    pub const fn new(attention: f64, overdue: f64, critical: f64) -> Self {
        Self {
            attention,
            overdue,
            critical,
        }
    }
}

/// Per-status thresholds, one table per open status. A status left unset
/// classifies as NORMAL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SlaConfig {
    pub pending_assignment: Option<ThresholdHours>,
    pub assigning: Option<ThresholdHours>,
    /// Measured from the scheduled visit time when one is set.
    pub pending_visit: Option<ThresholdHours>,
    pub visiting: Option<ThresholdHours>,
    pub pending_confirmation: Option<ThresholdHours>,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            pending_assignment: Some(ThresholdHours::new(6.0, 12.0, 24.0)),
            assigning: Some(ThresholdHours::new(4.0, 12.0, 24.0)),
            pending_visit: Some(ThresholdHours::new(1.0, 4.0, 24.0)),
            visiting: Some(ThresholdHours::new(4.0, 8.0, 12.0)),
            pending_confirmation: Some(ThresholdHours::new(24.0, 48.0, 72.0)),
        }
    }
}

impl SlaConfig {
    pub fn get(&self, status: OrderStatus) -> Option<ThresholdHours> {
        match status {
            OrderStatus::PendingAssignment => self.pending_assignment,
            OrderStatus::Assigning => self.assigning,
            OrderStatus::PendingVisit => self.pending_visit,
            OrderStatus::Visiting => self.visiting,
            OrderStatus::PendingConfirmation => self.pending_confirmation,
            OrderStatus::Completed | OrderStatus::Cancelled => None,
        }
    }

    /// Configured (status, thresholds) pairs in lifecycle order.
    pub fn configured(&self) -> impl Iterator<Item = (OrderStatus, ThresholdHours)> + '_ {
        OrderStatus::ALL
            .into_iter()
            .filter_map(|status| self.get(status).map(|hours| (status, hours)))
    }

    /// Builds the classification policy, rejecting malformed triples.
    pub fn policy(&self) -> Result<SlaPolicy, ThresholdError> {
        self.configured()
            .try_fold(SlaPolicy::new(), |policy, (status, hours)| {
                let thresholds = SlaThresholds::new(hours.attention, hours.overdue, hours.critical)?;
                Ok(policy.with(status, thresholds))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Offer work to OFFLINE workers when nobody ONLINE or BUSY qualifies
    pub allow_offline_fallback: bool,
    /// Refuse to re-offer an order to the worker it was just taken from,
    /// even when that worker is the only candidate
    pub strict_cooldown: bool,
    /// Order category → skill family workers declare, e.g.
    /// `curtain_fabric = "curtain"`
    pub skill_aliases: SkillAliases,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            allow_offline_fallback: true,
            strict_cooldown: false,
            skill_aliases: SkillAliases::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Send worker notifications at all
    pub enabled: bool,
    /// Suppress repeat visit reminders for the same order within this window
    pub reminder_cooldown_hours: f64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_cooldown_hours: 24.0,
        }
    }
}

impl NotificationConfig {
    /// The reminder window as a duration, rounded to the minute.
    pub fn reminder_cooldown(&self) -> Result<Duration, ConfigError> {
        let hours = self.reminder_cooldown_hours;
        if !(0.0..=MAX_REMINDER_COOLDOWN_HOURS).contains(&hours) {
            return Err(ConfigError::ReminderCooldown(hours));
        }
        Duration::try_minutes((hours * 60.0).round() as i64)
            .ok_or(ConfigError::ReminderCooldown(hours))
    }
}

impl DispatchConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (field-dispatch.toml, .field-dispatch-rc)
    /// 3. Environment variables (prefixed with FIELD_DISPATCH__)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&DispatchConfig::default())?);

        if Path::new("field-dispatch.toml").exists() {
            builder = builder.add_source(File::with_name("field-dispatch"));
        }

        if Path::new(".field-dispatch-rc").exists() {
            builder = builder.add_source(
                File::with_name(".field-dispatch-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("FIELD_DISPATCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let dispatch_config: DispatchConfig = builder.build()?.try_deserialize()?;

        // Fail at load time rather than on the first classification.
        dispatch_config.validate()?;

        Ok(dispatch_config)
    }

    /// Load from an explicit TOML file on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let dispatch_config: DispatchConfig = toml::from_str(&content)?;
        dispatch_config.validate()?;
        Ok(dispatch_config)
    }

    /// Checks every section an engine depends on and returns the SLA policy.
    pub fn validate(&self) -> Result<SlaPolicy, ConfigError> {
        self.notifications.reminder_cooldown()?;
        Ok(self.sla.policy()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<DispatchConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = DispatchConfig::load_env_file();
        DispatchConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static DispatchConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
