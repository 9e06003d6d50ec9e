use crate::dialect::Dialect;
use crate::error::{LoadError, Result};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Connection settings for one database.
///
/// Deserialized from JSON such as:
///
/// ```json
/// {
///   "type": "postgres",
///   "host": "db.internal",
///   "port": 5432,
///   "user_name": "loader",
///   "password": "...",
///   "database_name": "warehouse",
///   "default_schema": "staging",
///   "ownership": "etl_owner"
/// }
/// ```
///
/// The dialect is kept as written and only checked when a connection is
/// opened, so a config for an unsupported database still loads.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "type")]
    pub dialect: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(alias = "user")]
    pub user_name: String,
    #[serde(default = "empty_secret", deserialize_with = "deserialize_password")]
    pub password: SecretString,
    #[serde(alias = "database")]
    pub database_name: String,
    #[serde(default)]
    pub default_schema: Option<String>,
    /// Role that should own tables created by an upload.
    #[serde(default)]
    pub ownership: Option<String>,
    /// `host[:port]` that replaces `host`/`port` when set (tunnels, proxies).
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new().into())
}

fn deserialize_password<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::new(s.into()))
}

impl ConnectionConfig {
    pub fn new(
        dialect: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            dialect: dialect.into(),
            host: host.into(),
            port: None,
            user_name: String::new(),
            password: empty_secret(),
            database_name: database.into(),
            default_schema: None,
            ownership: None,
            endpoint: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password: String = password.into();
        self.user_name = user.into();
        self.password = SecretString::new(password.into());
        self
    }

    #[must_use]
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_ownership(mut self, role: impl Into<String>) -> Self {
        self.ownership = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content).map_err(|e| {
            LoadError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    pub fn dialect(&self) -> Result<Dialect> {
        self.dialect.parse()
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    pub fn ownership(&self) -> Option<&str> {
        self.ownership.as_deref()
    }

    /// Host and port to connect to, after applying the endpoint override.
    pub fn resolved_endpoint(&self, default_port: u16) -> Result<(String, u16)> {
        let port = self.port.unwrap_or(default_port);
        let Some(endpoint) = self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty())
        else {
            return Ok((self.host.clone(), port));
        };

        match endpoint.rsplit_once(':') {
            Some((host, p)) if !host.is_empty() => {
                let p = p.parse::<u16>().map_err(|_| {
                    LoadError::Config(format!("Invalid port in endpoint '{endpoint}'"))
                })?;
                Ok((host.to_owned(), p))
            }
            Some(_) => Err(LoadError::Config(format!(
                "Invalid endpoint '{endpoint}', expected host[:port]"
            ))),
            None => Ok((endpoint.to_owned(), port)),
        }
    }
}
