use {
    crate::{Error, Result},
    serde::Deserialize,
    std::path::PathBuf,
};

/// Where page templates are loaded from.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// Root directory of the templates. Defaults to "templates".
    #[serde(default = "TemplatesConfig::default_directory")]
    pub directory: PathBuf,
}

impl TemplatesConfig {
    fn default_directory() -> PathBuf {
        PathBuf::from("templates")
    }

    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::config("[templates] directory must not be empty"));
        }
        Ok(())
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        TemplatesConfig {
            directory: Self::default_directory(),
        }
    }
}
