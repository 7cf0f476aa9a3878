use {
    crate::{Error, Result},
    serde::Deserialize,
};

///
/// Authorization settings.
///
/// `permissions` lists the boolean columns of the role table. When non-empty,
/// every endpoint permission is checked against it while the router is built,
/// so a misspelled permission fails at startup instead of on first request.
///
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AuthConfig {
    pub fn is_known(&self, permission: &str) -> bool {
        self.permissions.is_empty() || self.permissions.iter().any(|p| p == permission)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.permissions.iter().find(|p| {
            p.is_empty() || !p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }) {
            return Err(Error::config(format!(
                "[auth] permission '{bad}' is not a valid column name"
            )));
        }
        Ok(())
    }
}
