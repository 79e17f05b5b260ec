//! Pre-flight server status check against the JupyterHub REST API

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::config::ProxyConfig;
use crate::error::ProbeError;

#[derive(Debug, Deserialize)]
struct UserModel {
    #[serde(default)]
    servers: Option<BTreeMap<String, ServerModel>>,
}

#[derive(Debug, Deserialize)]
struct ServerModel {
    #[serde(default)]
    started: Option<serde_json::Value>,
    #[serde(default)]
    last_activity: Option<String>,
}

/// Outcome of a successful probe
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatusRecord {
    pub user: String,
    pub base_url: String,
    /// Server name; the default server has an empty name
    pub server_name: String,
    pub started: bool,
    pub last_activity: Option<String>,
}

impl ServerStatusRecord {
    pub fn last_activity_time(&self) -> Option<DateTime<Utc>> {
        self.last_activity
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

pub struct LivenessProber {
    client: reqwest::Client,
    user: Option<String>,
    base_url: String,
    token: String,
    target: String,
}

impl LivenessProber {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            user: user_from_target(config.target()),
            base_url: config.upstream_origin().to_string(),
            token: config.token().to_string(),
            target: config.target().to_string(),
        }
    }

    /// `<base>/hub/api/users/<user>`
    pub fn status_url(&self) -> Result<String, ProbeError> {
        let user = self.user()?;
        Ok(format!("{}/hub/api/users/{}", self.base_url, user))
    }

    fn user(&self) -> Result<&str, ProbeError> {
        self.user.as_deref().ok_or_else(|| ProbeError::MissingUser {
            url: self.target.clone(),
        })
    }

    /// Ask the hub whether the user's server is running.
    ///
    /// A server that exists but has not started is only a warning; the
    /// returned record then has `started == false`.
    pub async fn check(&self) -> Result<ServerStatusRecord, ProbeError> {
        let user = self.user()?.to_string();
        let url = self.status_url()?;
        let base = self.base_url.clone();

        tracing::debug!("Checking server status at {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| ProbeError::Request {
                user: user.clone(),
                base: base.clone(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(ProbeError::Status {
                user,
                base,
                status: response.status(),
            });
        }

        let model: UserModel = response.json().await.map_err(|source| ProbeError::Request {
            user: user.clone(),
            base: base.clone(),
            source,
        })?;

        let servers = match model.servers {
            Some(servers) => servers,
            None => return Err(ProbeError::MissingServers { user, base }),
        };

        let server_count = servers.len();
        let (server_name, server) = match servers.into_iter().next() {
            Some(entry) => entry,
            None => return Err(ProbeError::NoActiveServers { user, base }),
        };

        if server_count > 1 {
            tracing::warn!(
                "User {} has {} servers, checking '{}'",
                user,
                server_count,
                display_name(&server_name)
            );
        }

        let record = ServerStatusRecord {
            user,
            base_url: base,
            server_name,
            started: server.started.as_ref().map_or(false, is_truthy),
            last_activity: server.last_activity,
        };

        report(&record);
        Ok(record)
    }
}

fn report(record: &ServerStatusRecord) {
    if !record.started {
        tracing::warn!(
            "Server '{}' for user {} at {} is not started. The proxy will start anyway.",
            display_name(&record.server_name),
            record.user,
            record.base_url
        );
        return;
    }

    match (&record.last_activity, record.last_activity_time()) {
        (_, Some(time)) => {
            let idle = Utc::now().signed_duration_since(time);
            tracing::info!(
                "Server for user {} is running (last activity {}, {} min ago)",
                record.user,
                time.to_rfc3339(),
                idle.num_minutes().max(0)
            );
        }
        (Some(raw), None) => {
            tracing::info!("Server for user {} is running (last activity {})", record.user, raw);
        }
        (None, None) => {
            tracing::info!("Server for user {} is running", record.user);
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "default"
    } else {
        name
    }
}

// JupyterHub reports `started` as a timestamp, null while stopped; plain bools are accepted too
fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Second path segment of the target, e.g. `alice` in `/user/alice/lab`
pub fn user_from_target(target: &Url) -> Option<String> {
    target
        .path_segments()?
        .nth(1)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_is_second_path_segment() {
        let url = Url::parse("https://hub.dandiarchive.org/user/alice/lab/tree").unwrap();
        assert_eq!(user_from_target(&url).as_deref(), Some("alice"));
    }

    #[test]
    fn target_without_user_segment_has_no_user() {
        for target in ["https://hub.dandiarchive.org", "https://hub.dandiarchive.org/user/"] {
            let url = Url::parse(target).unwrap();
            assert_eq!(user_from_target(&url), None);
        }
    }

    #[test]
    fn servers_are_ordered_by_name() {
        let model: UserModel = serde_json::from_str(
            r#"{"servers": {"zeta": {"started": true}, "": {"started": false}}}"#,
        )
        .unwrap();
        let first = model.servers.unwrap().into_keys().next().unwrap();
        assert_eq!(first, "");
    }

    #[test]
    fn started_accepts_bool_or_timestamp() {
        assert!(is_truthy(&serde_json::json!(true)));
        assert!(is_truthy(&serde_json::json!("2024-05-01T10:00:00Z")));
        assert!(!is_truthy(&serde_json::json!(false)));
        assert!(!is_truthy(&serde_json::Value::Null));
    }

    #[test]
    fn last_activity_parses_rfc3339() {
        let record = ServerStatusRecord {
            user: "alice".into(),
            base_url: "https://hub.example.org".into(),
            server_name: String::new(),
            started: true,
            last_activity: Some("2024-05-01T10:00:00.123456Z".into()),
        };
        let time = record.last_activity_time().unwrap();
        assert_eq!(time.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");
    }
}
