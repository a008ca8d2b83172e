use std::path::Path;

use serde::Deserialize;

use crate::error::PersistenceError;

/// Pool size used when the configuration does not name one.
pub const DEFAULT_CONNECTION_POOL_SIZE: usize = 10;

/// Read access to the connection settings the runtime consumes.
pub trait ConfigProvider {
    fn url(&self) -> &str;
    fn username(&self) -> Option<&str>;
    fn password(&self) -> Option<&str>;
    fn connection_pool_size(&self) -> usize;
    fn show_sql(&self) -> bool;
}

/// Connection settings for a [`SessionFactory`](crate::session::SessionFactory).
///
/// ```rust
/// use sql_persistence::config::DatabaseConfig;
///
/// let cfg = DatabaseConfig::from_json_str(r#"{ "url": "app.db", "show_sql": true }"#).unwrap();
/// assert_eq!(cfg.pool_size, 10);
/// assert!(cfg.show_sql);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_pool_size", alias = "connection_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub show_sql: bool,
}

fn default_pool_size() -> usize {
    DEFAULT_CONNECTION_POOL_SIZE
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            pool_size: DEFAULT_CONNECTION_POOL_SIZE,
            show_sql: false,
        }
    }

    #[must_use]
    pub fn builder(url: impl Into<String>) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new(url)
    }

    /// Parse settings from a JSON document.
    ///
    /// # Errors
    /// Returns `PersistenceError::Config` if the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, PersistenceError> {
        let cfg: DatabaseConfig = serde_json::from_str(json)
            .map_err(|e| PersistenceError::Config(format!("invalid configuration: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON settings file.
    ///
    /// # Errors
    /// Returns `PersistenceError::Config` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PersistenceError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Check that the settings can open a pool.
    ///
    /// # Errors
    /// Returns `PersistenceError::Config` for an empty url or a zero pool size.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.url.trim().is_empty() {
            return Err(PersistenceError::Config("Property url must be set".into()));
        }
        if self.pool_size == 0 {
            return Err(PersistenceError::Config(
                "Property pool_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl ConfigProvider for DatabaseConfig {
    fn url(&self) -> &str {
        &self.url
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn connection_pool_size(&self) -> usize {
        self.pool_size
    }

    fn show_sql(&self) -> bool {
        self.show_sql
    }
}

/// Fluent builder for [`DatabaseConfig`].
#[derive(Debug, Clone)]
pub struct DatabaseConfigBuilder {
    cfg: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            cfg: DatabaseConfig::new(url),
        }
    }

    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.cfg.username = Some(username.into());
        self.cfg.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.cfg.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn show_sql(mut self, show_sql: bool) -> Self {
        self.cfg.show_sql = show_sql;
        self
    }

    #[must_use]
    pub fn finish(self) -> DatabaseConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_and_alias() {
        let cfg =
            DatabaseConfig::from_json_str(r#"{"url":"x.db","connection_pool_size":3}"#).unwrap();
        assert_eq!(cfg.pool_size, 3);
        assert!(!cfg.show_sql);
        assert_eq!(cfg.username(), None);
    }

    #[test]
    fn validation_rejects_missing_url_and_empty_pool() {
        assert!(matches!(
            DatabaseConfig::from_json_str(r#"{"url":"  "}"#),
            Err(PersistenceError::Config(_))
        ));
        let cfg = DatabaseConfig::builder("a.db").pool_size(0).finish();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builder_sets_every_field() {
        let cfg = DatabaseConfig::builder("a.db")
            .credentials("sa", "secret")
            .pool_size(2)
            .show_sql(true)
            .finish();
        assert_eq!(cfg.password(), Some("secret"));
        assert_eq!(cfg.connection_pool_size(), 2);
        assert!(cfg.show_sql());
    }
}
