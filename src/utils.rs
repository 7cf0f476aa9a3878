//!
//! Small helpers shared by configuration loading and the HTTP stack.
//!
//! - [`RequestIdGenerator`] preserves or mints the `x-request-id` of each request
//! - [`replace_handlebars_with_env`] substitutes `{{ VAR }}` placeholders in config text
//!

use {
    http::{HeaderValue, Request},
    regex::{Captures, Regex},
    std::{env, sync::LazyLock},
    tower_http::request_id::{MakeRequestId, RequestId},
    uuid::{ContextV7, Timestamp, Uuid},
};

/// Matches `{{ VAR_NAME }}` with optional whitespace around an upper-case variable name.
static HANDLEBAR_REGEXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Z0-9_]+)\s*\}\}").expect("handlebar pattern is valid")
});

/// Request ID generator for request correlation in logs.
///
/// Keeps the incoming `x-request-id` header when the client (or a proxy) sent
/// one, otherwise generates a time-ordered UUIDv7.
///
/// ```
/// use campus_gate::RequestIdGenerator;
/// use tower_http::request_id::SetRequestIdLayer;
///
/// let layer = SetRequestIdLayer::x_request_id(RequestIdGenerator);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, req: &Request<B>) -> Option<RequestId> {
        match req.headers().get("x-request-id") {
            Some(value) => Some(RequestId::new(value.clone())),
            None => {
                let cx = ContextV7::new().with_additional_precision();
                let uuid = Uuid::new_v7(Timestamp::now(cx));
                let value = HeaderValue::from_str(&uuid.to_string()).ok()?;
                Some(RequestId::new(value))
            }
        }
    }
}

/// Replaces `{{ VAR_NAME }}` placeholders with environment variable values.
///
/// Unset variables are replaced by an empty string and a warning is logged.
///
/// ```
/// use campus_gate::replace_handlebars_with_env;
///
/// let result = replace_handlebars_with_env("url = \"{{ CAMPUS_GATE_UNSET_VAR }}\"");
/// assert_eq!(result, "url = \"\"");
/// ```
pub fn replace_handlebars_with_env(input: &str) -> String {
    HANDLEBAR_REGEXP
        .replace_all(input, |caps: &Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(
                    variable = %var_name,
                    "Environment variable not found, substituting with empty string"
                );
                String::new()
            })
        })
        .to_string()
}
