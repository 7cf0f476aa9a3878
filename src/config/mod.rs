//!
//! Configuration structures and utilities for wiring up the application.
//!
//! A configuration can be created in many ways:
//! - From an environment-specific TOML file via `Config::from_rust_env` or `Config::from_toml_file`
//! - From a TOML string via `Config::from_toml`
//! - Constructed programmatically via the builder methods on `Config`
//!
//! In both TOML-based methods, environment variables can be referenced in the TOML
//! using the {{ VAR_NAME }} syntax, and they will be substituted with the corresponding
//! environment variable value. This keeps credentials such as the database password
//! out of the TOML files.
//!
//! Configuration is split into logical sections, each represented by their own struct:
//!
//! - `HttpConfig` for HTTP server settings and the access-gate redirect routes
//! - `DatabaseConfig` for database connection pool settings
//! - `LoggingConfig` for logging settings
//! - `SessionConfig` for the session cookie and store
//! - `TemplatesConfig` for the page template directory
//! - `AuthConfig` for the known permission names
//!
mod auth;
mod database;
mod http;
mod logging;
mod session;
mod templates;

pub use auth::*;
pub use database::*;
pub use http::*;
pub use logging::*;
pub use session::*;
pub use templates::*;

pub use byte_unit::Byte;

use {
    crate::{Error, Result, utils::replace_handlebars_with_env},
    serde::Deserialize,
    sqlx_postgres::{PgConnectOptions, PgPool, PgPoolOptions},
    std::{env, fs, path::PathBuf, str::FromStr, time::Duration},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for Config {
    ///
    /// Creates a default configuration.
    /// This will attempt to load configuration from the file based on the RUST_ENV
    /// environment variable falling back to a default configuration if the environment
    /// variable is not set. Configuration files should be located in the "config/"
    /// directory of your project.
    ///
    fn default() -> Self {
        match Self::from_rust_env() {
            Ok(config) => config,
            Err(_) => Config {
                http: HttpConfig::default(),
                database: DatabaseConfig::default(),
                logging: LoggingConfig::default(),
                session: SessionConfig::default(),
                templates: TemplatesConfig::default(),
                auth: AuthConfig::default(),
            },
        }
    }
}

impl Config {
    ///
    /// Loads the configuration from a file based on the RUST_ENV environment variable.
    ///
    pub fn from_rust_env() -> Result<Config> {
        Self::from_toml_file(env::var("RUST_ENV")?)
    }

    ///
    /// Given an environment name, loads "config/{env}.toml", substitutes any
    /// environment variables, and returns a Config struct.
    ///
    pub fn from_toml_file(env: impl AsRef<str>) -> Result<Config> {
        let path = format!("config/{}.toml", env.as_ref());
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    ///
    /// Parses a configuration string in TOML format into a Config struct.
    ///
    pub fn from_toml(toml_str: &str) -> Result<Config> {
        replace_handlebars_with_env(toml_str).parse()
    }

    /// Sets the HTTP server bind address of the HttpConfig.
    pub fn with_bind_addr<S: AsRef<str>>(mut self, addr: S) -> Self {
        self.http.bind_addr = addr.as_ref().into();
        self
    }

    /// Sets the HTTP server bind port of the HttpConfig.
    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.http.bind_port = port;
        self
    }

    /// Sets the request timeout duration of the HttpConfig.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http.request_timeout = Some(timeout);
        self
    }

    /// Sets the maximum payload size in bytes of the HttpConfig.
    pub fn with_max_payload_size_bytes(mut self, size: u64) -> Self {
        self.http.max_payload_size_bytes = Byte::from_u64(size);
        self
    }

    /// Sets the route guests are redirected to.
    pub fn with_login_route(mut self, route: &str) -> Self {
        self.http.login_route = route.into();
        self
    }

    /// Sets the route authenticated users are redirected to from logged-out-only pages.
    pub fn with_home_route(mut self, route: &str) -> Self {
        self.http.home_route = route.into();
        self
    }

    /// Sets the Postgres database connection URL of the DatabaseConfig.
    pub fn with_pg_url(mut self, url: &str) -> Self {
        self.database.url = url.into();
        self
    }

    /// Sets the maximum pool size of the DatabaseConfig.
    pub fn with_pg_max_pool_size(mut self, size: u8) -> Self {
        self.database.max_pool_size = size;
        self
    }

    /// Sets the maximum idle time of the DatabaseConfig.
    pub fn with_pg_max_idle_time(mut self, duration: Duration) -> Self {
        self.database.max_idle_time = Some(duration);
        self
    }

    /// Sets the log format of the LoggingConfig.
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.logging.format = format;
        self
    }

    /// Selects the session store.
    pub fn with_session_store(mut self, store: SessionStoreKind) -> Self {
        self.session.store = store;
        self
    }

    /// Sets the session cookie name.
    pub fn with_session_cookie_name(mut self, name: &str) -> Self {
        self.session.cookie_name = name.into();
        self
    }

    /// Sets the template directory.
    pub fn with_templates_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.templates.directory = directory.into();
        self
    }

    /// Sets the known permission names.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    ///
    /// Validates every section, returning the first problem found.
    ///
    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.session.validate()?;
        self.templates.validate()?;
        self.auth.validate()?;
        Ok(())
    }

    ///
    /// Installs the global tracing subscriber in the configured format.
    /// The filter is read from `RUST_LOG`. Calling this twice is harmless.
    ///
    pub fn setup_tracing(&self) {
        use tracing_subscriber::{EnvFilter, prelude::*};
        let env_filter = EnvFilter::from_default_env();
        match self.logging.format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer().json())
                    .with(env_filter)
                    .try_init();
            }
            LogFormat::Default => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer())
                    .with(env_filter)
                    .try_init();
            }
            LogFormat::Compact => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer().compact())
                    .with(env_filter)
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .with(env_filter)
                    .try_init();
            }
        }
    }

    ///
    /// Creates the Postgres pool. Connections are opened lazily on first use,
    /// so this succeeds without a reachable database.
    ///
    pub fn create_pgpool(&self) -> Result<PgPool> {
        let pool_options = PgPoolOptions::default()
            .min_connections(self.database.min_pool_size as u32)
            .max_connections(self.database.max_pool_size as u32)
            .idle_timeout(self.database.max_idle_time);

        let connect_options = PgConnectOptions::from_str(&self.database.url)?
            .application_name(env!("CARGO_PKG_NAME"))
            .ssl_mode(sqlx_postgres::PgSslMode::Prefer);

        let pool = pool_options.connect_lazy_with(connect_options);

        Ok(pool)
    }
}

impl FromStr for Config {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let config_file = replace_handlebars_with_env(s);
        let config = toml::from_str::<Config>(&config_file)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn base_config() -> Config {
        "".parse::<Config>().unwrap()
    }

    #[test]
    fn test_config_from_str_valid() {
        unsafe {
            env::set_var("CAMPUS_GATE_CONFIG_DB_URL", "postgres://localhost/genesis");
        }

        let config_str = r#"
[database]
url = "{{ CAMPUS_GATE_CONFIG_DB_URL }}"
max_pool_size = 10

[http]
bind_addr = "0.0.0.0"
bind_port = 8080
max_payload_size_bytes = "1MB"
request_timeout = "15s"
login_route = "/ingresar"

[session]
store = "database"
expiry = "2h"

[templates]
directory = "views"

[auth]
permissions = ["crear_proyecto", "ver_estudiantes"]

[logging]
format = "json"
        "#;

        let config = config_str.parse::<Config>().unwrap();
        assert_eq!(config.database.url, "postgres://localhost/genesis");
        assert_eq!(config.database.max_pool_size, 10);
        assert_eq!(config.http.bind_addr, "0.0.0.0");
        assert_eq!(config.http.bind_port, 8080);
        assert_eq!(config.http.request_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.http.login_route, "/ingresar");
        assert_eq!(config.http.home_route, "/");
        assert_eq!(config.session.store, SessionStoreKind::Database);
        assert_eq!(config.session.cookie_name, "GENESIS_APP");
        assert_eq!(config.session.expiry, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.templates.directory, PathBuf::from("views"));
        assert_eq!(config.auth.permissions.len(), 2);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());

        unsafe {
            env::remove_var("CAMPUS_GATE_CONFIG_DB_URL");
        }
    }

    #[test]
    fn test_config_from_str_invalid_toml() {
        let result = "this is not valid toml".parse::<Config>();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_config_builder_chaining() {
        let config = base_config()
            .with_bind_addr("0.0.0.0")
            .with_bind_port(9000)
            .with_pg_url("postgres://db/genesis")
            .with_pg_max_pool_size(3)
            .with_log_format(LogFormat::Compact)
            .with_session_store(SessionStoreKind::Database)
            .with_session_cookie_name("SID")
            .with_login_route("/auth/login")
            .with_home_route("/dashboard")
            .with_permissions(["ver_estudiantes"]);

        assert_eq!(config.http.full_bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.database.url, "postgres://db/genesis");
        assert_eq!(config.database.max_pool_size, 3);
        assert_eq!(config.session.cookie_name, "SID");
        assert_eq!(config.http.home_route, "/dashboard");
        assert!(config.auth.is_known("ver_estudiantes"));
        assert!(!config.auth.is_known("borrar_todo"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_permission_list_accepts_everything() {
        assert!(base_config().auth.is_known("anything"));
    }

    #[test]
    fn test_validate_empty_database_url() {
        let mut config = base_config();
        config.database.url = "".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_validate_invalid_database_url_format() {
        let config = base_config().with_pg_url("mysql://localhost/genesis");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_database_zero_pool_size() {
        let config = base_config().with_pg_max_pool_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_bind_addr_format() {
        let config = base_config().with_bind_addr("not-an-ip");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_relative_login_route() {
        let config = base_config().with_login_route("login");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("login_route"));
    }

    #[test]
    fn test_validate_empty_cookie_name() {
        let config = base_config().with_session_cookie_name("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_permission_name() {
        let config = base_config().with_permissions(["drop table"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let err = Config::from_toml_file("no-such-environment").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_create_pgpool_is_lazy() {
        let config = base_config().with_pg_url("postgres://127.0.0.1:1/genesis");
        assert!(config.create_pgpool().is_ok());
    }

    mod proptest_config {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn valid_port_parses(port in 0u16..=65535) {
                let toml_str = format!(
                    r#"
[http]
bind_addr = "127.0.0.1"
bind_port = {port}
"#
                );

                let config: std::result::Result<Config, _> = toml_str.parse();
                prop_assert!(config.is_ok(), "Valid port should parse");
                prop_assert_eq!(config.unwrap().http.bind_port, port);
            }

            #[test]
            fn valid_byte_sizes_parse(size in 1u64..1_000_000) {
                let toml_str = format!(
                    r#"
[http]
max_payload_size_bytes = {size}
"#
                );

                let config: std::result::Result<Config, _> = toml_str.parse();
                prop_assert!(config.is_ok());
                prop_assert_eq!(config.unwrap().http.max_payload_size_bytes.as_u64(), size);
            }
        }
    }
}
