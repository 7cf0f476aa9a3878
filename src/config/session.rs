use {
    crate::{Error, Result},
    serde::Deserialize,
    std::time::Duration,
};

/// Where session records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    /// Process-local store; sessions are lost on restart.
    #[default]
    Memory,
    /// The `session(id, data)` table of the application database.
    Database,
}

///
/// Configuration for cookie-backed sessions.
///
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub store: SessionStoreKind,

    /// Name of the session cookie. Defaults to "GENESIS_APP".
    #[serde(default = "SessionConfig::default_cookie_name")]
    pub cookie_name: String,

    /// Sessions expire after this much inactivity. Defaults to 1 hour.
    #[serde(default = "SessionConfig::default_expiry", with = "humantime_serde")]
    pub expiry: Duration,

    /// Marks the cookie `Secure`. Enable behind HTTPS.
    #[serde(default)]
    pub secure: bool,
}

impl SessionConfig {
    fn default_cookie_name() -> String {
        "GENESIS_APP".into()
    }

    fn default_expiry() -> Duration {
        Duration::from_secs(60 * 60)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cookie_name.trim().is_empty() {
            return Err(Error::config("[session] cookie_name must not be empty"));
        }
        if self.expiry.is_zero() {
            return Err(Error::config("[session] expiry must be > 0"));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            store: SessionStoreKind::default(),
            cookie_name: Self::default_cookie_name(),
            expiry: Self::default_expiry(),
            secure: false,
        }
    }
}
