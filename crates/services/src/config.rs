use std::env;
use std::str::FromStr;

use pagemark_core::model::UserId;
use pagemark_core::settings::TrackerSettings;

use crate::error::ConfigError;
use crate::http_gateway::SessionContext;

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, raw }),
    }
}

/// Tracker tunables, overridable from the environment.
pub struct TrackerConfig;

impl TrackerConfig {
    /// Read `PAGEMARK_*` overrides on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unparsable values or settings that fail validation.
    pub fn from_env() -> Result<TrackerSettings, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// # Errors
    ///
    /// See [`TrackerConfig::from_env`].
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<TrackerSettings, ConfigError> {
        let mut settings = TrackerSettings::default();
        if let Some(v) = parse_var(&lookup, "PAGEMARK_MIN_INTERVAL_MS")? {
            settings.min_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PAGEMARK_CHANGE_THRESHOLD")? {
            settings.change_threshold_percent = v;
        }
        if let Some(v) = parse_var(&lookup, "PAGEMARK_BOUNDARY_TOLERANCE")? {
            settings.boundary_tolerance = v;
        }
        if let Some(v) = parse_var(&lookup, "PAGEMARK_RESUME_SETTLE_MS")? {
            settings.resume_settle_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PAGEMARK_RESTART_SETTLE_MS")? {
            settings.restart_settle_ms = v;
        }
        Ok(settings.validate()?)
    }
}

/// Remote gateway settings. No `PAGEMARK_API_URL` means local storage.
pub struct GatewayConfig;

impl GatewayConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` when the URL is set but the user id is missing,
    /// or either value is invalid.
    pub fn from_env() -> Result<Option<SessionContext>, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// # Errors
    ///
    /// See [`GatewayConfig::from_env`].
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<SessionContext>, ConfigError> {
        let Some(base_url) = lookup("PAGEMARK_API_URL").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let user_id = lookup("PAGEMARK_USER_ID").ok_or(ConfigError::Missing {
            var: "PAGEMARK_USER_ID",
            requires: "PAGEMARK_API_URL",
        })?;
        let user_id = UserId::new(user_id)?;
        let token = lookup("PAGEMARK_API_TOKEN");
        Ok(Some(SessionContext::new(base_url.trim(), user_id, token)?))
    }
}
