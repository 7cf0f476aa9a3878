use {
    crate::{Error, Result},
    serde::Deserialize,
    std::time::Duration,
};

///
/// Configuration for the HTTP server
///
/// Controls where the server listens, how large and how slow requests may be,
/// and which routes the access gate redirects to.
///
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// IP address to bind the HTTP server to
    /// The default `bind_addr` is "127.0.0.1".
    #[serde(default = "HttpConfig::default_bind_addr")]
    pub bind_addr: String,

    /// Port to bind the HTTP server to
    /// The default `bind_port` is 3000.
    #[serde(default = "HttpConfig::default_bind_port")]
    pub bind_port: u16,

    /// Maximum allowed time for a request to complete before timing out
    /// with a 408 Request Timeout response. By default `request_timeout` is None.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Maximum payload size in bytes for incoming HTTP requests. Larger
    /// requests are rejected with 413 Payload Too Large.
    /// By default `max_payload_size_bytes` is set to 2MiB so profile
    /// pictures and thesis uploads fit.
    #[serde(default = "HttpConfig::default_max_payload_size_bytes")]
    pub max_payload_size_bytes: byte_unit::Byte,

    /// Where page endpoints that require authentication send guests.
    /// By default `login_route` is "/login".
    #[serde(default = "HttpConfig::default_login_route")]
    pub login_route: String,

    /// Where logged-out-only page endpoints send authenticated users.
    /// By default `home_route` is "/".
    #[serde(default = "HttpConfig::default_home_route")]
    pub home_route: String,

    /// Grace period for in-flight requests after a shutdown signal.
    #[serde(
        default = "HttpConfig::default_shutdown_timeout",
        with = "humantime_serde"
    )]
    pub shutdown_timeout: Duration,
}

impl HttpConfig {
    pub fn full_bind_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    fn default_bind_addr() -> String {
        "127.0.0.1".into()
    }

    fn default_bind_port() -> u16 {
        3000
    }

    fn default_max_payload_size_bytes() -> byte_unit::Byte {
        byte_unit::Byte::from_u64(2 * 1024 * 1024)
    }

    fn default_login_route() -> String {
        "/login".into()
    }

    fn default_home_route() -> String {
        "/".into()
    }

    fn default_shutdown_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(Error::config(
                "HTTP bind_addr is required. Set [http] bind_addr = \"0.0.0.0\" or \"127.0.0.1\" in config.",
            ));
        }

        if self.bind_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(Error::config(
                "HTTP bind_addr must be a valid IP address. Examples: \"127.0.0.1\", \"0.0.0.0\", \"::1\"",
            ));
        }

        for (name, route) in [
            ("login_route", &self.login_route),
            ("home_route", &self.home_route),
        ] {
            if !route.starts_with('/') {
                return Err(Error::config(format!(
                    "HTTP {name} must be an absolute path starting with '/', got '{route}'"
                )));
            }
        }

        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind_addr: Self::default_bind_addr(),
            bind_port: Self::default_bind_port(),
            request_timeout: None,
            max_payload_size_bytes: Self::default_max_payload_size_bytes(),
            login_route: Self::default_login_route(),
            home_route: Self::default_home_route(),
            shutdown_timeout: Self::default_shutdown_timeout(),
        }
    }
}
