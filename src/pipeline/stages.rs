//! The standard request stages, in the order [`Pipeline::standard`] runs
//! them.
//!
//! [`Pipeline::standard`]: super::Pipeline::standard

use {
    super::{Access, AppContext, AuthState, Flow, RequestContext, ResponseKind},
    crate::{
        ContextMap, ContextValue, Error, Result,
        auth::{self, AuthResolver, RejectReason, Resolution, SessionIdentity},
        map_to_json,
        render::TemplateRenderer,
    },
    async_trait::async_trait,
    axum::{
        Json,
        response::{Html, IntoResponse, Redirect},
    },
    http::{HeaderValue, StatusCode, header::ALLOW},
    std::sync::Arc,
};

/// One step of request processing.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: RequestContext) -> Result<Flow>;
}

/// Rebuilds the principal from the session identity.
///
/// A session pointing at a missing, disabled or unauthorized account, or
/// holding a malformed identity, is flushed and the request continues as a
/// guest.
pub struct ResolvePrincipal {
    resolver: Arc<dyn AuthResolver>,
}

impl ResolvePrincipal {
    pub fn new(resolver: Arc<dyn AuthResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Stage for ResolvePrincipal {
    fn name(&self) -> &'static str {
        "resolve_principal"
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<Flow> {
        let Some(session) = ctx.session.clone() else {
            return Ok(Flow::Continue(ctx));
        };
        let user_id = match auth::session_identity(&session).await? {
            SessionIdentity::Guest => return Ok(Flow::Continue(ctx)),
            SessionIdentity::User(user_id) => user_id,
            SessionIdentity::Malformed => {
                tracing::info!("session identity is not a user id, flushing session");
                auth::logout(&session).await?;
                ctx.auth = AuthState::Rejected(RejectReason::MalformedIdentity);
                return Ok(Flow::Continue(ctx));
            }
        };

        ctx.auth = AuthState::Authenticating;
        match self.resolver.resolve(user_id).await? {
            Resolution::Active(principal) => {
                tracing::Span::current().record("user", principal.id);
                ctx.principal = Some(principal);
                ctx.auth = AuthState::Authenticated;
            }
            Resolution::Rejected(reason) => {
                tracing::info!(user_id, %reason, "session identity rejected, flushing session");
                auth::logout(&session).await?;
                ctx.auth = AuthState::Rejected(reason);
            }
        }
        Ok(Flow::Continue(ctx))
    }
}

/// Applies the endpoint's [`Access`] mode.
pub struct EnforceAccess {
    login_route: String,
    home_route: String,
}

impl EnforceAccess {
    pub fn new(login_route: impl Into<String>, home_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
            home_route: home_route.into(),
        }
    }
}

#[async_trait]
impl Stage for EnforceAccess {
    fn name(&self) -> &'static str {
        "enforce_access"
    }

    async fn run(&self, ctx: RequestContext) -> Result<Flow> {
        let page = ctx.endpoint.is_page();
        match (ctx.endpoint.access(), ctx.principal.is_some()) {
            (Access::LoggedOutOnly, true) if page => {
                Ok(Flow::Respond(Redirect::to(&self.home_route).into_response()))
            }
            (Access::LoggedOutOnly, true) => {
                Err(Error::forbidden("only available to guests"))
            }
            (Access::RequiresAuth, false) if page => {
                Ok(Flow::Respond(Redirect::to(&self.login_route).into_response()))
            }
            (Access::RequiresAuth, false) => {
                Err(Error::authentication("authentication required"))
            }
            _ => Ok(Flow::Continue(ctx)),
        }
    }
}

/// Checks the endpoint's declared permission against the principal's role.
pub struct EnforcePermission;

#[async_trait]
impl Stage for EnforcePermission {
    fn name(&self) -> &'static str {
        "enforce_permission"
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<Flow> {
        let Some(permission) = ctx.endpoint.required_permission() else {
            return Ok(Flow::Continue(ctx));
        };
        let Some(principal) = &ctx.principal else {
            return Err(Error::authentication("authentication required"));
        };

        match principal.permissions.get(permission) {
            None => Err(Error::config(format!(
                "unknown permission '{permission}' for role {}",
                principal.role_id
            ))),
            Some(false) => {
                tracing::debug!(user = principal.id, permission, "permission denied");
                ctx.auth = AuthState::Forbidden;
                Err(Error::forbidden(format!("missing permission '{permission}'")))
            }
            Some(true) => {
                ctx.auth = AuthState::Authorized;
                Ok(Flow::Continue(ctx))
            }
        }
    }
}

/// Decodes the submitted input and runs the endpoint's body for the request
/// method.
pub struct InvokeHandler {
    app: AppContext,
}

impl InvokeHandler {
    pub fn new(app: AppContext) -> Self {
        Self { app }
    }
}

#[async_trait]
impl Stage for InvokeHandler {
    fn name(&self) -> &'static str {
        "invoke_handler"
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<Flow> {
        let Some(handler) = ctx.endpoint.handler(&ctx.method).cloned() else {
            let allow = ctx
                .endpoint
                .methods()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let allow = HeaderValue::from_str(&allow)?;
            return Ok(Flow::Respond(
                (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, allow)]).into_response(),
            ));
        };

        ctx.read_input().await?;
        let input = ctx.handler_input(self.app.clone());
        let reply = handler.call(input).await?;
        ctx.reply = Some(reply);
        Ok(Flow::Continue(ctx))
    }
}

/// Turns the handler's reply into a rendered page, a JSON document or a
/// redirect.
pub struct ShapeResponse {
    renderer: Arc<dyn TemplateRenderer>,
}

impl ShapeResponse {
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Stage for ShapeResponse {
    fn name(&self) -> &'static str {
        "shape_response"
    }

    async fn run(&self, ctx: RequestContext) -> Result<Flow> {
        let reply = ctx
            .reply
            .ok_or_else(|| Error::internal("no reply to shape"))?;

        if let Some(location) = &reply.redirect {
            return Ok(Flow::Respond(Redirect::to(location).into_response()));
        }

        let response = match ctx.endpoint.kind() {
            ResponseKind::Page { template } => {
                let mut context = ContextMap::new();
                context.insert(
                    "user".into(),
                    ctx.principal
                        .as_ref()
                        .map(|p| p.to_context())
                        .unwrap_or_else(|| ContextValue::Map(ContextMap::new())),
                );
                context.extend(reply.data);
                let html = self.renderer.render(template, &map_to_json(&context))?;
                (reply.status, Html(html)).into_response()
            }
            ResponseKind::Api => (reply.status, Json(map_to_json(&reply.data))).into_response(),
        };
        Ok(Flow::Respond(response))
    }
}
