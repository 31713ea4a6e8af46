use config::{Config, ConfigError, Environment, File};
use convoy_client::SyncConfig;
use convoy_transport_websocket::WebSocketLinkConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub ws_url: String,
    pub application_id: String,
    pub user_credential: String,
    pub auth_endpoint: String,
    #[serde(with = "humantime_serde")]
    pub auth_timeout: Duration,
    pub cluster: String,
    pub reconnect: bool,
    #[serde(with = "humantime_serde")]
    pub reconnect_initial: Duration,
    #[serde(with = "humantime_serde")]
    pub reconnect_max: Duration,
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl MonitorConfig {
    /// Defaults, then the optional TOML file, then `CONVOY_*` variables.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("ws_url", "ws://127.0.0.1:8080/dispatch")?
            .set_default("application_id", "")?
            .set_default("user_credential", "")?
            .set_default("auth_endpoint", "http://127.0.0.1:8080/authenticate")?
            .set_default("auth_timeout", "10s")?
            .set_default("cluster", "/root")?
            .set_default("reconnect", true)?
            .set_default("reconnect_initial", "250ms")?
            .set_default("reconnect_max", "10s")?
            .set_default("stats_interval", "60s")?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("CONVOY").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            application_id: self.application_id.clone(),
            user_credential: self.user_credential.clone(),
            auth_endpoint: self.auth_endpoint.clone(),
            auth_timeout: self.auth_timeout,
        }
    }

    pub fn link_config(&self) -> WebSocketLinkConfig {
        WebSocketLinkConfig {
            reconnect: self.reconnect,
            reconnect_initial: self.reconnect_initial,
            reconnect_max: self.reconnect_max,
            ..WebSocketLinkConfig::new(self.ws_url.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;
    use std::time::Duration;

    fn with_env<F>(vars: &[(&str, &str)], test: F)
    where
        F: FnOnce(),
    {
        let mut old = Vec::new();
        for (k, v) in vars {
            old.push((k.to_string(), env::var(k).ok()));
            env::set_var(k, v);
        }

        test();

        for (k, maybe_old) in old {
            match maybe_old {
                Some(val) => env::set_var(k, val),
                None => env::remove_var(k),
            }
        }
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = MonitorConfig::new(None).expect("failed to build config");

        assert_eq!(cfg.ws_url, "ws://127.0.0.1:8080/dispatch");
        assert_eq!(cfg.cluster, "/root");
        assert_eq!(cfg.auth_timeout, Duration::from_secs(10));
        assert!(cfg.reconnect);
        assert_eq!(cfg.reconnect_initial, Duration::from_millis(250));
        assert_eq!(cfg.stats_interval, Duration::from_secs(60));
    }

    #[test]
    fn env_vars_override_defaults() {
        with_env(
            &[
                ("CONVOY_APPLICATION_ID", "fleet-app"),
                ("CONVOY_RECONNECT_MAX", "1m30s"),
            ],
            || {
                let cfg = MonitorConfig::new(None).expect("failed to build config");
                assert_eq!(cfg.application_id, "fleet-app");
                assert_eq!(cfg.reconnect_max, Duration::from_secs(90));
                assert_eq!(cfg.sync_config().application_id, "fleet-app");
            },
        );
    }

    #[test]
    fn file_values_feed_client_and_link_configs() {
        use std::io::Write;

        let mut tmp = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            tmp,
            r#"
ws_url = "wss://dispatch.convoy.test/ws"
user_credential = "h.p.s"
auth_endpoint = "https://dispatch.convoy.test/auth"
cluster = "/fleet/north"
reconnect = false
"#
        )
        .expect("write to temp file");

        let cfg = MonitorConfig::new(Some(PathBuf::from(tmp.path()))).expect("load config");
        let link = cfg.link_config();
        assert_eq!(link.url, "wss://dispatch.convoy.test/ws");
        assert!(!link.reconnect);
        assert_eq!(link.outbound_queue_capacity, 1024);

        let sync = cfg.sync_config();
        assert_eq!(sync.user_credential, "h.p.s");
        assert_eq!(sync.auth_endpoint, "https://dispatch.convoy.test/auth");
        assert_eq!(cfg.cluster, "/fleet/north");
    }
}
