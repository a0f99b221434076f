use crate::servicenow::model::Credentials;
use bon::Builder;
use std::env;
use std::fmt::{self, Display};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://alokshrotritr.github.io";
pub const DEFAULT_INSTANCE_URL: &str = "https://your-instance.service-now.com";
pub const DEFAULT_SCOPE_ID: &str = "1813479";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";
pub const TABLE_API: &str = "/api/now/table";
const DEFAULT_TIMEOUT_SECS: &str = "30";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

#[derive(Clone, Debug, Builder)]
pub struct Config {
    #[builder(default = default_bind_addr())]
    pub bind_addr: SocketAddr,
    #[builder(default = DEFAULT_ALLOWED_ORIGIN.to_string(), into)]
    pub allowed_origin: String,
    #[builder(default = Duration::from_secs(30))]
    pub upstream_timeout: Duration,
    /// Hosts the forwarder may reach; empty means any.
    #[builder(default)]
    pub upstream_hosts: Vec<String>,
    pub servicenow: ServiceNowConfig,
    pub oauth: Option<OAuthConfig>,
}

#[derive(Clone, Debug, Builder)]
pub struct ServiceNowConfig {
    #[builder(default = DEFAULT_INSTANCE_URL.to_string(), into)]
    pub instance_url: String,
    #[builder(default = DEFAULT_SCOPE_ID.to_string(), into)]
    pub scope_id: String,
    #[builder(default = TABLE_API.to_string(), into)]
    pub table_api: String,
    #[builder(default)]
    pub credentials: Credentials,
    #[builder(default = false)]
    pub demo_fallback: bool,
}

#[derive(Clone, Builder)]
pub struct OAuthConfig {
    #[builder(into)]
    pub client_id: String,
    #[builder(into)]
    pub client_secret: String,
    #[builder(default = DEFAULT_REDIRECT_URI.to_string(), into)]
    pub redirect_uri: String,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = try_load("RELAY_BIND_ADDR", var("RELAY_BIND_ADDR"), DEFAULT_BIND_ADDR)?;
        let allowed_origin = var("RELAY_ALLOWED_ORIGIN").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string());
        let timeout_secs: u64 = try_load(
            "RELAY_UPSTREAM_TIMEOUT_SECS",
            var("RELAY_UPSTREAM_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RELAY_UPSTREAM_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        let upstream_hosts = var("RELAY_UPSTREAM_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(|host| host.trim().to_ascii_lowercase())
                    .filter(|host| !host.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let instance_url = var("SERVICENOW_INSTANCE")
            .or_else(|| var("REACT_APP_SERVICENOW_INSTANCE"))
            .unwrap_or_else(|| {
                info!("SERVICENOW_INSTANCE not set, using default: {DEFAULT_INSTANCE_URL}");
                DEFAULT_INSTANCE_URL.to_string()
            })
            .trim_end_matches('/')
            .to_string();

        let credentials = match pair(
            ("SERVICENOW_USERNAME", var("SERVICENOW_USERNAME")),
            ("SERVICENOW_PASSWORD", var("SERVICENOW_PASSWORD")),
        )? {
            Some((username, password)) => Credentials::Basic { username, password },
            None => match pair(
                ("SERVICENOW_CLIENT_ID", var("SERVICENOW_CLIENT_ID")),
                ("SERVICENOW_CLIENT_SECRET", var("SERVICENOW_CLIENT_SECRET")),
            )? {
                Some((client_id, client_secret)) => Credentials::ClientHeaders {
                    client_id,
                    client_secret,
                },
                None => Credentials::None,
            },
        };

        let servicenow = ServiceNowConfig {
            instance_url,
            scope_id: var("SERVICENOW_API_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE_ID.to_string()),
            table_api: TABLE_API.to_string(),
            credentials,
            demo_fallback: try_load(
                "SERVICENOW_DEMO_FALLBACK",
                var("SERVICENOW_DEMO_FALLBACK"),
                "false",
            )?,
        };

        let oauth = pair(
            (
                "SERVICENOW_OAUTH_CLIENT_ID",
                var("SERVICENOW_OAUTH_CLIENT_ID").or_else(|| var("REACT_APP_SERVICENOW_CLIENT_ID")),
            ),
            (
                "SERVICENOW_OAUTH_CLIENT_SECRET",
                var("SERVICENOW_OAUTH_CLIENT_SECRET")
                    .or_else(|| var("REACT_APP_SERVICENOW_CLIENT_SECRET")),
            ),
        )?
        .map(|(client_id, client_secret)| OAuthConfig {
            client_id,
            client_secret,
            redirect_uri: var("SERVICENOW_OAUTH_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        });

        Ok(Config {
            bind_addr,
            allowed_origin,
            upstream_timeout: Duration::from_secs(timeout_secs),
            upstream_hosts,
            servicenow,
            oauth,
        })
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn try_load<T: FromStr>(key: &'static str, value: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = value.unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn pair(
    first: (&'static str, Option<String>),
    second: (&'static str, Option<String>),
) -> Result<Option<(String, String)>, ConfigError> {
    match (first.1, second.1) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Incomplete {
            present: first.0,
            missing: second.0,
        }),
        (None, Some(_)) => Err(ConfigError::Incomplete {
            present: second.0,
            missing: first.0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, default_bind_addr());
        assert_eq!(config.allowed_origin, DEFAULT_ALLOWED_ORIGIN);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert!(config.upstream_hosts.is_empty());
        assert_eq!(config.servicenow.instance_url, DEFAULT_INSTANCE_URL);
        assert_eq!(config.servicenow.scope_id, DEFAULT_SCOPE_ID);
        assert_eq!(config.servicenow.credentials, Credentials::None);
        assert!(!config.servicenow.demo_fallback);
        assert!(config.oauth.is_none());
    }

    #[test]
    fn basic_credentials_take_precedence_over_client_headers() {
        let config = load(&[
            ("SERVICENOW_USERNAME", "admin"),
            ("SERVICENOW_PASSWORD", "secret"),
            ("SERVICENOW_CLIENT_ID", "id"),
            ("SERVICENOW_CLIENT_SECRET", "shh"),
        ])
        .unwrap();
        assert_eq!(
            config.servicenow.credentials,
            Credentials::Basic {
                username: "admin".to_string(),
                password: "secret".to_string()
            }
        );
    }

    #[test]
    fn client_headers_are_used_without_basic_credentials() {
        let config = load(&[("SERVICENOW_CLIENT_ID", "id"), ("SERVICENOW_CLIENT_SECRET", "shh")]).unwrap();
        assert_eq!(
            config.servicenow.credentials,
            Credentials::ClientHeaders {
                client_id: "id".to_string(),
                client_secret: "shh".to_string()
            }
        );
    }

    #[test]
    fn half_specified_credentials_are_rejected() {
        let error = load(&[("SERVICENOW_USERNAME", "admin")]).unwrap_err();
        assert_eq!(
            error,
            ConfigError::Incomplete {
                present: "SERVICENOW_USERNAME",
                missing: "SERVICENOW_PASSWORD"
            }
        );
    }

    #[test]
    fn legacy_instance_and_oauth_names_are_honoured() {
        let config = load(&[
            ("REACT_APP_SERVICENOW_INSTANCE", "https://dev279775.service-now.com/"),
            ("REACT_APP_SERVICENOW_CLIENT_ID", "client"),
            ("REACT_APP_SERVICENOW_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert_eq!(config.servicenow.instance_url, "https://dev279775.service-now.com");
        let oauth = config.oauth.unwrap();
        assert_eq!(oauth.client_id, "client");
        assert_eq!(oauth.redirect_uri, DEFAULT_REDIRECT_URI);
        assert!(!format!("{:?}", oauth).contains("secret\""));
    }

    #[test]
    fn invalid_values_name_their_key() {
        let error = load(&[("RELAY_UPSTREAM_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { key: "RELAY_UPSTREAM_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let error = load(&[("RELAY_UPSTREAM_TIMEOUT_SECS", "0")]).unwrap_err();
        assert_eq!(
            error,
            ConfigError::Invalid {
                key: "RELAY_UPSTREAM_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            }
        );
    }

    #[test]
    fn upstream_hosts_are_normalised() {
        let config = load(&[
            ("RELAY_UPSTREAM_HOSTS", "Dev279775.service-now.com, ,other.example.com"),
            ("SERVICENOW_DEMO_FALLBACK", "true"),
        ])
        .unwrap();
        assert_eq!(
            config.upstream_hosts,
            vec!["dev279775.service-now.com".to_string(), "other.example.com".to_string()]
        );
        assert!(config.servicenow.demo_fallback);
    }
}
