use std::time::Duration;

/// Identity and handshake settings for one [`crate::service::SyncClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Application identifier sent as `application_id` during the handshake.
    pub application_id: String,
    /// Three-segment identity token; sent as `id_token` and decoded locally
    /// for the `email` claim.
    pub user_credential: String,
    /// Full URL of the HTTP handshake endpoint.
    pub auth_endpoint: String,
    /// Connect + read timeout for the handshake request.
    pub auth_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            user_credential: String::new(),
            auth_endpoint: "http://127.0.0.1:8080/authenticate".to_string(),
            auth_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    pub fn new(application_id: impl Into<String>, user_credential: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            user_credential: user_credential.into(),
            ..Self::default()
        }
    }

    /// Query parameters for the handshake POST, in wire order.
    pub fn handshake_query<'a>(&'a self, connection_id: &'a str) -> [(&'static str, &'a str); 3] {
        [
            ("connection_id", connection_id),
            ("application_id", self.application_id.as_str()),
            ("id_token", self.user_credential.as_str()),
        ]
    }
}
