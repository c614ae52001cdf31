use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// Name of one cache generation, e.g. `pagcorp-v1718000000000`.
///
/// Each deployment gets its own version; activating it deletes every
/// region carrying another name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// `<prefix>-v<millis>` from a build timestamp
    pub fn from_build_timestamp(prefix: &str, built_at: DateTime<Utc>) -> Self {
        Self(format!("{}-v{}", prefix, built_at.timestamp_millis()))
    }

    /// Explicit version if configured, else the compile-time build stamp
    /// (`PEDIDOS_BUILD_TIMESTAMP`, epoch millis), else the current time.
    pub fn resolve(prefix: &str, explicit: Option<&str>) -> Self {
        if let Some(explicit) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
            return Self(format!("{}-{}", prefix, explicit));
        }

        let built_at = option_env!("PEDIDOS_BUILD_TIMESTAMP")
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or_else(Utc::now);

        Self::from_build_timestamp(prefix, built_at)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
