//! Engine configuration from environment variables.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use medstock_auth::{Capability, RolePolicy};
use medstock_inventory::ForecastParams;

pub const LOOKBACK_DAYS: &str = "MEDSTOCK_LOOKBACK_DAYS";
pub const LEAD_TIME_DAYS: &str = "MEDSTOCK_LEAD_TIME_DAYS";
pub const REVIEW_DAYS: &str = "MEDSTOCK_REVIEW_DAYS";
pub const SAFETY_FACTOR: &str = "MEDSTOCK_SAFETY_FACTOR";
pub const EXPIRY_WINDOW_DAYS: &str = "MEDSTOCK_EXPIRY_WINDOW_DAYS";
pub const APPROVER_ROLES: &str = "MEDSTOCK_APPROVER_ROLES";
pub const REQUESTER_ROLES: &str = "MEDSTOCK_REQUESTER_ROLES";
pub const CATALOG_ROLES: &str = "MEDSTOCK_CATALOG_ROLES";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub forecast: ForecastParams,
    pub approver_roles: Vec<String>,
    pub requester_roles: Vec<String>,
    pub catalog_roles: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastParams::default(),
            approver_roles: vec!["MANAGER".to_string(), "ADMIN".to_string()],
            requester_roles: vec!["STAFF".to_string()],
            catalog_roles: vec!["ADMIN".to_string()],
        }
    }
}

fn parse<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn days(var: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    let value = parse(var, raw, default)?;
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            var,
            reason: "must be at least one day",
        });
    }
    Ok(value)
}

fn roles(raw: Option<String>, default: &[String]) -> Vec<String> {
    match raw {
        None => default.to_vec(),
        Some(list) => list
            .split(',')
            .map(|r| r.trim().to_ascii_uppercase())
            .filter(|r| !r.is_empty())
            .collect(),
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let d = &defaults.forecast;

        let safety_factor: Decimal = parse(SAFETY_FACTOR, lookup(SAFETY_FACTOR), d.safety_factor)?;
        if safety_factor <= Decimal::ZERO {
            return Err(ConfigError::OutOfRange {
                var: SAFETY_FACTOR,
                reason: "must be positive",
            });
        }
        // Zero review days is allowed.
        let review_days = parse(REVIEW_DAYS, lookup(REVIEW_DAYS), d.review_days)?;

        let forecast = ForecastParams {
            lookback_days: days(LOOKBACK_DAYS, lookup(LOOKBACK_DAYS), d.lookback_days)?,
            lead_time_days: days(LEAD_TIME_DAYS, lookup(LEAD_TIME_DAYS), d.lead_time_days)?,
            review_days,
            safety_factor,
            expiry_window_days: days(
                EXPIRY_WINDOW_DAYS,
                lookup(EXPIRY_WINDOW_DAYS),
                d.expiry_window_days,
            )?,
        };

        Ok(Self {
            forecast,
            approver_roles: roles(lookup(APPROVER_ROLES), &defaults.approver_roles),
            requester_roles: roles(lookup(REQUESTER_ROLES), &defaults.requester_roles),
            catalog_roles: roles(lookup(CATALOG_ROLES), &defaults.catalog_roles),
        })
    }

    /// Role → capability mapping described by this configuration. Requesters
    /// and approvers can both count.
    pub fn role_policy(&self) -> RolePolicy {
        RolePolicy::empty()
            .grant(&self.requester_roles, Capability::RequestStock)
            .grant(&self.requester_roles, Capability::CountStock)
            .grant(&self.approver_roles, Capability::ApproveStock)
            .grant(&self.approver_roles, Capability::CountStock)
            .grant(&self.catalog_roles, Capability::ManageCatalog)
    }
}
