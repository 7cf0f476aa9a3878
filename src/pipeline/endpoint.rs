use {
    super::{HandlerInput, Reply},
    crate::{Error, Result},
    async_trait::async_trait,
    http::Method,
    std::{fmt, future::Future, sync::Arc},
};

/// Who may reach an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Guests and authenticated users alike.
    Public,
    /// Only guests. Authenticated users are sent to the home route.
    LoggedOutOnly,
    /// Only authenticated users.
    #[default]
    RequiresAuth,
}

/// How a successful reply is turned into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// Rendered through the named template.
    Page { template: String },
    /// Serialized as JSON.
    Api,
}

/// The body of an endpoint for one HTTP method.
#[async_trait]
pub trait HandlerBody: Send + Sync {
    async fn call(&self, input: HandlerInput) -> Result<Reply>;
}

#[async_trait]
impl<F, Fut> HandlerBody for F
where
    F: Fn(HandlerInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply>> + Send + 'static,
{
    async fn call(&self, input: HandlerInput) -> Result<Reply> {
        (self)(input).await
    }
}

/// A routable unit: access mode, optional permission, response shape and
/// one handler body per method.
///
/// ```
/// use campus_gate::Error;
/// use campus_gate::pipeline::{Access, Endpoint, HandlerInput, Reply};
///
/// let endpoint = Endpoint::page("semester.create")
///     .permission("crear_semestre")
///     .get(|_input: HandlerInput| async { Ok::<_, Error>(Reply::new()) });
///
/// assert_eq!(endpoint.access(), Access::RequiresAuth);
/// assert!(endpoint.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct Endpoint {
    name: Option<String>,
    kind: ResponseKind,
    access: Access,
    permission: Option<String>,
    handlers: Vec<(Method, Arc<dyn HandlerBody>)>,
}

impl Endpoint {
    /// An endpoint rendering `template` (dotted name, see
    /// [`template_path`](crate::template_path)).
    pub fn page(template: impl Into<String>) -> Self {
        Self::with_kind(ResponseKind::Page {
            template: template.into(),
        })
    }

    /// An endpoint answering with JSON.
    pub fn api() -> Self {
        Self::with_kind(ResponseKind::Api)
    }

    fn with_kind(kind: ResponseKind) -> Self {
        Self {
            name: None,
            kind,
            access: Access::default(),
            permission: None,
            handlers: Vec::new(),
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn access_mode(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn public(self) -> Self {
        self.access_mode(Access::Public)
    }

    #[must_use]
    pub fn logged_out_only(self) -> Self {
        self.access_mode(Access::LoggedOutOnly)
    }

    #[must_use]
    pub fn requires_auth(self) -> Self {
        self.access_mode(Access::RequiresAuth)
    }

    /// Requires the principal's role to grant `permission`.
    #[must_use]
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Registers `body` for `method`, replacing any earlier body for it.
    #[must_use]
    pub fn on<H: HandlerBody + 'static>(mut self, method: Method, body: H) -> Self {
        self.handlers.retain(|(m, _)| *m != method);
        self.handlers.push((method, Arc::new(body)));
        self
    }

    #[must_use]
    pub fn get<H: HandlerBody + 'static>(self, body: H) -> Self {
        self.on(Method::GET, body)
    }

    #[must_use]
    pub fn post<H: HandlerBody + 'static>(self, body: H) -> Self {
        self.on(Method::POST, body)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &ResponseKind {
        &self.kind
    }

    pub fn is_page(&self) -> bool {
        matches!(self.kind, ResponseKind::Page { .. })
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn required_permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    /// The body registered for `method`. `HEAD` falls back to `GET`.
    pub fn handler(&self, method: &Method) -> Option<&Arc<dyn HandlerBody>> {
        let find = |wanted: &Method| {
            self.handlers
                .iter()
                .find(|(m, _)| m == wanted)
                .map(|(_, h)| h)
        };
        find(method).or_else(|| {
            if *method == Method::HEAD {
                find(&Method::GET)
            } else {
                None
            }
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.handlers.iter().map(|(m, _)| m)
    }

    /// Checks the declaration. Called for every endpoint when the router is
    /// built.
    pub fn validate(&self) -> Result<()> {
        if self.handlers.is_empty() {
            return Err(Error::config(format!(
                "endpoint {} has no handler bodies",
                self.label()
            )));
        }
        if let ResponseKind::Page { template } = &self.kind {
            if template.trim().is_empty() {
                return Err(Error::config(format!(
                    "page endpoint {} has an empty template name",
                    self.label()
                )));
            }
        }
        if let Some(permission) = &self.permission {
            if self.access != Access::RequiresAuth {
                return Err(Error::config(format!(
                    "endpoint {} requires permission '{permission}' but is not restricted to authenticated users",
                    self.label()
                )));
            }
        }
        Ok(())
    }

    fn label(&self) -> String {
        match (&self.name, &self.kind) {
            (Some(name), _) => format!("'{name}'"),
            (None, ResponseKind::Page { template }) => format!("'{template}'"),
            (None, ResponseKind::Api) => "(api)".to_string(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field("permission", &self.permission)
            .field("methods", &self.methods().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    async fn noop(_input: HandlerInput) -> Result<Reply> {
        Ok(Reply::new())
    }

    #[test]
    fn defaults_to_authenticated_access() {
        let endpoint = Endpoint::api().get(noop);
        assert_eq!(endpoint.access(), Access::RequiresAuth);
        assert_eq!(endpoint.required_permission(), None);
        assert!(!endpoint.is_page());
    }

    #[test]
    fn head_falls_back_to_get() {
        let endpoint = Endpoint::page("index").public().get(noop);
        assert!(endpoint.handler(&Method::HEAD).is_some());
        assert!(endpoint.handler(&Method::POST).is_none());
    }

    #[test]
    fn later_body_replaces_earlier_one_for_same_method() {
        let endpoint = Endpoint::api().get(noop).post(noop).get(noop);
        assert_eq!(
            endpoint.methods().cloned().collect::<Vec<_>>(),
            vec![Method::POST, Method::GET]
        );
    }

    #[test]
    fn endpoint_without_bodies_is_rejected() {
        let err = Endpoint::api().named("empty").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("'empty'"));
    }

    #[test]
    fn permission_on_guest_endpoint_is_rejected() {
        let err = Endpoint::page("user.login")
            .logged_out_only()
            .permission("ver_notas")
            .get(noop)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Endpoint::api()
            .public()
            .permission("ver_notas")
            .get(noop)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn blank_template_is_rejected() {
        let err = Endpoint::page(" ").get(noop).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
