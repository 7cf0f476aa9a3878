//!
//! The request pipeline wrapped around every endpoint.
//!
//! An inbound request for an [`Endpoint`] runs through an ordered list of
//! [`Stage`]s. Each stage receives the [`RequestContext`] and either passes it
//! on ([`Flow::Continue`]) or answers the request ([`Flow::Respond`]). An error
//! from any stage ends the request with the error's JSON response.
//!
//! The standard order is:
//!
//! 1. [`ResolvePrincipal`]: session identity to [`Principal`](crate::auth::Principal)
//! 2. [`EnforceAccess`]: the endpoint's [`Access`] mode
//! 3. [`EnforcePermission`]: the endpoint's declared permission
//! 4. [`InvokeHandler`]: the handler body for the request method
//! 5. [`ShapeResponse`]: template, JSON or redirect
//!
//! Authentication and permission failures never reach the handler body.
//!
mod context;
mod endpoint;
mod stages;

pub use context::*;
pub use endpoint::*;
pub use stages::*;

use {
    crate::{HttpConfig, Result, auth::AuthResolver, render::TemplateRenderer},
    axum::{
        extract::Request,
        response::{IntoResponse, Response},
    },
    std::{collections::BTreeMap, fmt, sync::Arc},
};

/// An ordered list of stages.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// The five standard stages.
    pub fn standard(
        resolver: Arc<dyn AuthResolver>,
        renderer: Arc<dyn TemplateRenderer>,
        app: AppContext,
        http: &HttpConfig,
    ) -> Self {
        Self::new(vec![
            Arc::new(ResolvePrincipal::new(resolver)),
            Arc::new(EnforceAccess::new(&http.login_route, &http.home_route)),
            Arc::new(EnforcePermission),
            Arc::new(InvokeHandler::new(app)),
            Arc::new(ShapeResponse::new(renderer)),
        ])
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.name())
    }

    /// Serves `request` for `endpoint`. Errors become JSON error responses.
    pub async fn handle(
        &self,
        endpoint: Arc<Endpoint>,
        path_params: BTreeMap<String, String>,
        request: Request,
    ) -> Response {
        let ctx = RequestContext::from_request(endpoint, path_params, request);
        match self.run(ctx).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    /// Runs the stages over `ctx`.
    pub async fn run(&self, mut ctx: RequestContext) -> Result<Response> {
        for stage in self.stages.iter() {
            match stage.run(ctx).await {
                Ok(Flow::Continue(next)) => ctx = next,
                Ok(Flow::Respond(response)) => return Ok(response),
                Err(e) => {
                    tracing::debug!(stage = stage.name(), kind = %e.kind(), "stage failed");
                    return Err(e);
                }
            }
        }
        Err(crate::Error::internal(
            "request pipeline finished without a response",
        ))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}
