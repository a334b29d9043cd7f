//! Configuration management for Lambda functions.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Application configuration loaded from environment variables.
///
/// Credentials never live here; they come from [`crate::Settings`], which is
/// read from Secrets Manager.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// AWS region
    pub aws_region: String,
    /// ARN of the secret holding the provider settings bundle
    pub settings_secret_arn: String,
    /// How long generated insights stay cached
    pub cache_ttl: Duration,
    /// Overall deadline for one query
    pub query_deadline: Duration,
    /// Recipient of scheduled report emails
    pub report_email: Option<String>,
    /// Sender address for scheduled report emails
    pub from_email: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cache_ttl_hours: u64 = parse_or("CACHE_TTL_HOURS", 24)?;
        let deadline_secs: u64 = parse_or("QUERY_DEADLINE_SECS", 90)?;

        Ok(Self {
            db_host: required("DATABASE_HOST")?,
            db_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "marketing_insights".to_string()),
            db_secret_arn: required("DATABASE_URL_SECRET_ARN")?,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            settings_secret_arn: required("SETTINGS_SECRET_ARN")?,
            cache_ttl: cache_ttl_from_hours(cache_ttl_hours)?,
            query_deadline: Duration::from_secs(deadline_secs),
            report_email: env::var("REPORT_EMAIL").ok().filter(|v| !v.trim().is_empty()),
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "reports@marketing-insights.app".to_string()),
        })
    }
}

fn cache_ttl_from_hours(hours: u64) -> Result<Duration> {
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::Config(format!("CACHE_TTL_HOURS out of range: {}", hours)))
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("{} not set", name)))
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_ttl_hours_are_bounded() {
        assert_eq!(cache_ttl_from_hours(24).unwrap(), Duration::from_secs(86_400));
        let err = cache_ttl_from_hours(u64::MAX).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_or_default_and_override() {
        assert_eq!(parse_or::<u64>("INSIGHTS_TEST_UNSET_VAR", 24).unwrap(), 24);

        env::set_var("INSIGHTS_TEST_TTL_HOURS", "6");
        assert_eq!(parse_or::<u64>("INSIGHTS_TEST_TTL_HOURS", 24).unwrap(), 6);

        env::set_var("INSIGHTS_TEST_BAD_NUMBER", "soon");
        let err = parse_or::<u64>("INSIGHTS_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("INSIGHTS_TEST_BAD_NUMBER"));
    }

    #[test]
    fn test_required_reports_variable_name() {
        let err = required("INSIGHTS_TEST_MISSING_VAR").unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: INSIGHTS_TEST_MISSING_VAR not set");
    }
}
