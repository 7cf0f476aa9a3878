use {
    super::Endpoint,
    crate::{
        ContextMap, ContextValue, DataSource, Error, ErrorKind, PgDataSource, Result,
        auth::{Principal, RejectReason},
        validation::{FormSchema, Validator},
    },
    axum::{
        Form, Json,
        body::Body,
        extract::{FromRequest, Query, Request},
        response::Response,
    },
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc},
    tower_sessions::Session,
};

/// Shared services handed to every handler body.
#[derive(Clone, Default)]
pub struct AppContext {
    pub data_source: Option<Arc<dyn DataSource>>,
    pub validator: Validator,
    /// Direct pool access for handlers that need transactions.
    pub pg: Option<PgDataSource>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `data_source` for queries and for `unique` validation rules.
    #[must_use]
    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.validator = Validator::new().with_data_source(data_source.clone());
        self.data_source = Some(data_source);
        self
    }

    #[must_use]
    pub fn with_pg(mut self, pg: PgDataSource) -> Self {
        self.pg = Some(pg);
        self
    }

    /// The configured data source, or a configuration error.
    pub fn db(&self) -> Result<&Arc<dyn DataSource>> {
        self.data_source
            .as_ref()
            .ok_or_else(|| Error::config("no data source configured"))
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("data_source", &self.data_source.is_some())
            .field("validator", &self.validator)
            .field("pg", &self.pg)
            .finish()
    }
}

/// Everything a handler body receives.
#[derive(Clone)]
pub struct HandlerInput {
    /// `None` only on public endpoints.
    pub principal: Option<Principal>,
    pub method: Method,
    pub path_params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Submitted fields, from a urlencoded form or a flat JSON object.
    pub form: BTreeMap<String, String>,
    pub session: Option<Session>,
    pub app: AppContext,
}

impl HandlerInput {
    /// The authenticated principal.
    pub fn principal(&self) -> Result<&Principal> {
        self.principal
            .as_ref()
            .ok_or_else(|| Error::authentication("no authenticated user"))
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Parses a path parameter.
    pub fn param_as<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self
            .param(name)
            .ok_or_else(|| Error::invalid_input(format!("missing path parameter '{name}'")))?;
        raw.parse()
            .map_err(|e| Error::invalid_input(format!("path parameter '{name}': {e}")))
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// A submitted field, blank when absent.
    pub fn field(&self, name: &str) -> &str {
        self.form.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Runs the submitted form through `schema`.
    pub async fn validate(&self, schema: &FormSchema) -> Result<Vec<String>> {
        let entries = schema.entries(&self.form);
        self.app.validator.validate(&entries).await
    }

    /// The request session, or a session error when no session layer runs.
    pub fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::Session, "no session layer installed"))
    }
}

/// What a handler body returns: template/JSON data, or a redirect.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub data: ContextMap,
    pub redirect: Option<String>,
    pub status: StatusCode,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            data: ContextMap::new(),
            redirect: None,
            status: StatusCode::OK,
        }
    }
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends the client to `location` instead of rendering.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            redirect: Some(location.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: ContextMap) -> Self {
        self.data.extend(data);
        self
    }

    /// Attaches validation messages under `errors`. The status is left as
    /// is; use [`with_status`](Self::with_status) for anything but 200.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.data.insert("errors".into(), errors.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

/// Authentication progress of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Rejected(RejectReason),
    Authorized,
    Forbidden,
}

/// State threaded through the pipeline stages.
///
/// Built from the request head. The query and the body are decoded by
/// [`read_input`](Self::read_input) once the request has passed the access
/// and permission stages.
pub struct RequestContext {
    pub endpoint: Arc<Endpoint>,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub path_params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub form: BTreeMap<String, String>,
    pub session: Option<Session>,
    pub principal: Option<Principal>,
    pub auth: AuthState,
    pub reply: Option<Reply>,
    body: Option<Body>,
}

impl RequestContext {
    /// Splits `request` into its head and its still unread body.
    pub fn from_request(
        endpoint: Arc<Endpoint>,
        path_params: BTreeMap<String, String>,
        request: Request,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let session = parts.extensions.get::<Session>().cloned();

        Self {
            endpoint,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            path_params,
            query: BTreeMap::new(),
            form: BTreeMap::new(),
            session,
            principal: None,
            auth: AuthState::Unauthenticated,
            reply: None,
            body: Some(body),
        }
    }

    /// Decodes the query string and the submitted form. The body is consumed
    /// on the first call.
    pub async fn read_input(&mut self) -> Result<()> {
        self.query = Query::<BTreeMap<String, String>>::try_from_uri(&self.uri)
            .map_err(|e| Error::invalid_input(format!("invalid query string: {e}")))?
            .0;
        if let Some(body) = self.body.take() {
            self.form = read_form(&self.method, &self.headers, body).await?;
        }
        Ok(())
    }

    pub(crate) fn handler_input(&self, app: AppContext) -> HandlerInput {
        HandlerInput {
            principal: self.principal.clone(),
            method: self.method.clone(),
            path_params: self.path_params.clone(),
            query: self.query.clone(),
            form: self.form.clone(),
            session: self.session.clone(),
            app,
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("path_params", &self.path_params)
            .field("principal", &self.principal.as_ref().map(|p| p.id))
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Outcome of one stage.
pub enum Flow {
    Continue(RequestContext),
    Respond(Response),
}

async fn read_form(
    method: &Method,
    headers: &HeaderMap,
    body: Body,
) -> Result<BTreeMap<String, String>> {
    if matches!(*method, Method::GET | Method::HEAD | Method::DELETE) {
        return Ok(BTreeMap::new());
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mut request = Request::new(body);
    *request.method_mut() = method.clone();
    *request.headers_mut() = headers.clone();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<BTreeMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| Error::invalid_input(format!("invalid form body: {e}")))?;
        Ok(fields)
    } else if content_type.starts_with("application/json") {
        let Json(value) = Json::<serde_json::Value>::from_request(request, &())
            .await
            .map_err(|e| Error::invalid_input(format!("invalid JSON body: {e}")))?;
        json_fields(value)
    } else {
        Ok(BTreeMap::new())
    }
}

/// Flattens a JSON object into field strings. Nested values keep their JSON
/// text.
fn json_fields(value: serde_json::Value) -> Result<BTreeMap<String, String>> {
    let serde_json::Value::Object(object) = value else {
        return Err(Error::invalid_input("JSON body must be an object"));
    };
    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint() -> Arc<Endpoint> {
        Arc::new(Endpoint::api().public().post(|_i: HandlerInput| async { Ok::<_, crate::Error>(Reply::new()) }))
    }

    #[tokio::test]
    async fn reads_query_and_urlencoded_form() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/students/list?page=2")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("nombres=Ana&codigo=2019"))
            .unwrap();

        let mut ctx = RequestContext::from_request(endpoint(), BTreeMap::new(), request);
        assert!(ctx.form.is_empty());
        ctx.read_input().await.unwrap();
        assert_eq!(ctx.query.get("page").map(String::as_str), Some("2"));
        assert_eq!(ctx.form.get("nombres").map(String::as_str), Some("Ana"));
        assert_eq!(ctx.form.get("codigo").map(String::as_str), Some("2019"));
        assert_eq!(ctx.auth, AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn json_body_becomes_fields() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/grades")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"nota": 17, "obs": null, "curso": "MAT"}).to_string()))
            .unwrap();

        let mut ctx = RequestContext::from_request(endpoint(), BTreeMap::new(), request);
        ctx.read_input().await.unwrap();
        assert_eq!(ctx.form["nota"], "17");
        assert_eq!(ctx.form["obs"], "");
        assert_eq!(ctx.form["curso"], "MAT");
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_input() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/grades")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("[1, 2"))
            .unwrap();

        let mut ctx = RequestContext::from_request(endpoint(), BTreeMap::new(), request);
        let err = ctx.read_input().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn errors_reply_keeps_its_status() {
        assert_eq!(Reply::new().with_errors(vec![]).status, StatusCode::OK);
        let reply = Reply::new().with_errors(vec!["Correo no es valido".into()]);
        assert_eq!(reply.status, StatusCode::OK);
        let reply = Reply::new()
            .with_status(StatusCode::UNPROCESSABLE_ENTITY)
            .with_errors(vec!["Correo no es valido".into()]);
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            reply.data["errors"].to_json(),
            json!(["Correo no es valido"])
        );
    }

    #[test]
    fn param_as_parses_or_reports_invalid_input() {
        let request = Request::builder()
            .uri("/students/list/10")
            .body(Body::empty())
            .unwrap();
        let mut input = RequestContext::from_request(
            endpoint(),
            BTreeMap::from([("amt".to_string(), "10".to_string())]),
            request,
        )
        .handler_input(AppContext::new());

        assert_eq!(input.param_as::<u32>("amt").unwrap(), 10);
        input.path_params.insert("amt".into(), "ten".into());
        assert_eq!(
            input.param_as::<u32>("amt").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(input.field("missing"), "");
        assert_eq!(input.principal().unwrap_err().kind(), ErrorKind::Authentication);
    }
}
