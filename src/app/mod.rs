//! Assembles feature-module routes, the request pipeline and the HTTP stack
//! into a servable axum [`Router`].
//!
//! ```rust,no_run
//! use campus_gate::{Application, Config, Result, routes};
//! use campus_gate::pipeline::{Endpoint, HandlerInput, Reply};
//!
//! # async fn example() -> Result<()> {
//! let config = Config::default();
//! config.setup_tracing();
//!
//! let students = routes! {
//!     "students" => {
//!         "list" => Endpoint::page("students.list")
//!             .permission("ver_estudiantes")
//!             .get(|_input: HandlerInput| async { Ok::<_, campus_gate::Error>(Reply::new()) }),
//!     },
//! };
//!
//! Application::new(config)?
//!     .contribute("students", students)?
//!     .start()
//!     .await
//! # }
//! ```
//!
mod middleware;
mod shutdown;

use {
    crate::{
        Config, DataSource, Error, MiniJinjaRenderer, PgDataSource, Result, SessionStoreKind,
        auth::{AuthResolver, PgSessionStore, SqlAuthResolver},
        pipeline::{AppContext, Endpoint, Pipeline},
        render::TemplateRenderer,
        routing::{PathPattern, RouteMap, RouteRegistry},
    },
    axum::{
        Router,
        extract::{RawPathParams, Request, rejection::RawPathParamsRejection},
        response::{IntoResponse, Response},
        routing::any,
    },
    http::StatusCode,
    sqlx_postgres::PgPool,
    std::{collections::BTreeMap, fmt, net::SocketAddr, sync::Arc},
    tokio::sync::watch,
    tower_sessions::MemoryStore,
};

type Candidates = Arc<[(PathPattern, Arc<Endpoint>)]>;

/// The application under construction: configuration, collaborators and the
/// route contributions of every feature module.
pub struct Application {
    config: Config,
    registry: RouteRegistry<Endpoint>,
    app: AppContext,
    resolver: Arc<dyn AuthResolver>,
    renderer: Arc<dyn TemplateRenderer>,
    pool: Option<PgPool>,
}

impl Application {
    /// Validates `config` and wires the Postgres-backed collaborators. The
    /// pool connects lazily, so no database needs to be reachable yet. Must be
    /// called inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = config.create_pgpool()?;
        let pg = PgDataSource::new(pool.clone());
        let data_source: Arc<dyn DataSource> = Arc::new(pg.clone());
        let renderer = MiniJinjaRenderer::from_dir(&config.templates.directory);

        Ok(Self {
            registry: RouteRegistry::new(),
            app: AppContext::new()
                .with_data_source(data_source.clone())
                .with_pg(pg),
            resolver: Arc::new(SqlAuthResolver::new(data_source)),
            renderer: Arc::new(renderer),
            pool: Some(pool),
            config,
        })
    }

    /// An application without database access. Supply a resolver (and a data
    /// source if handlers query) before serving.
    pub fn without_database(config: Config) -> Result<Self> {
        config.validate()?;
        let renderer = MiniJinjaRenderer::from_dir(&config.templates.directory);
        Ok(Self {
            registry: RouteRegistry::new(),
            app: AppContext::new(),
            resolver: Arc::new(NoPrincipals),
            renderer: Arc::new(renderer),
            pool: None,
            config,
        })
    }

    /// Replaces the data source used by handlers, `unique` rules and the
    /// default principal resolver.
    #[must_use]
    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.resolver = Arc::new(SqlAuthResolver::new(data_source.clone()));
        let pg = self.app.pg.take();
        self.app = AppContext::new().with_data_source(data_source);
        self.app.pg = pg;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn AuthResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Adds the route declarations of one feature module.
    pub fn contribute(
        mut self,
        module: impl Into<String>,
        routes: RouteMap<Endpoint>,
    ) -> Result<Self> {
        self.registry = self.registry.contribute(module, routes)?;
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the dispatch table, checks every endpoint and returns the
    /// router with the full middleware stack.
    ///
    /// With `[session] store = "database"` the session table must exist; see
    /// [`PgSessionStore::migrate`] (done by [`start`](Self::start)).
    pub fn into_router(self) -> Result<Router> {
        let table = self.registry.build()?;

        let mut groups: BTreeMap<String, Vec<(PathPattern, Arc<Endpoint>)>> = BTreeMap::new();
        for (path, module, endpoint) in table.into_routes() {
            endpoint.validate().map_err(|e| {
                Error::config(format!("route '{path}' of module '{module}': {e}"))
            })?;
            if let Some(permission) = endpoint.required_permission() {
                if !self.config.auth.is_known(permission) {
                    return Err(Error::config(format!(
                        "route '{path}' of module '{module}' requires unknown permission '{permission}'"
                    )));
                }
            }
            let pattern = PathPattern::compile(&path)?;
            tracing::debug!(%path, %module, axum_path = pattern.axum_path(), "registering route");
            groups
                .entry(pattern.axum_path().to_string())
                .or_default()
                .push((pattern, Arc::new(endpoint)));
        }

        let pipeline = Pipeline::standard(
            self.resolver,
            self.renderer,
            self.app,
            &self.config.http,
        );

        let mut router = Router::new();
        for (axum_path, candidates) in groups {
            let candidates: Candidates = candidates.into();
            let pipeline = pipeline.clone();
            router = router.route(
                &axum_path,
                any(
                    move |params: std::result::Result<RawPathParams, RawPathParamsRejection>,
                          request: Request| {
                        let pipeline = pipeline.clone();
                        let candidates = candidates.clone();
                        async move { dispatch(pipeline, candidates, params, request).await }
                    },
                ),
            );
        }

        router = match (self.config.session.store, self.pool) {
            (SessionStoreKind::Memory, _) => router.layer(middleware::session_layer(
                MemoryStore::default(),
                &self.config.session,
            )),
            (SessionStoreKind::Database, Some(pool)) => router.layer(middleware::session_layer(
                PgSessionStore::new(pool),
                &self.config.session,
            )),
            (SessionStoreKind::Database, None) => {
                return Err(Error::config(
                    "[session] store = \"database\" needs a database connection",
                ));
            }
        };

        Ok(middleware::apply(router, &self.config))
    }

    /// Serves the application until SIGINT or SIGTERM, then waits up to
    /// `http.shutdown_timeout` for in-flight requests.
    pub async fn start(self) -> Result<()> {
        if self.config.session.store == SessionStoreKind::Database {
            if let Some(pool) = &self.pool {
                PgSessionStore::new(pool.clone()).migrate().await?;
            }
        }

        let bind_addr = self.config.http.full_bind_addr();
        let shutdown_timeout = self.config.http.shutdown_timeout;
        let router = self.into_router()?;

        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        tracing::info!("Bound to {}", &bind_addr);
        tracing::info!("Waiting for connections");

        let (initiated_tx, mut initiated_rx) = watch::channel(false);
        let serve = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown::shutdown_signal(initiated_tx));

        tokio::select! {
            result = serve => {
                tracing::info!("Graceful shutdown completed");
                result?;
            }
            _ = async {
                if initiated_rx.wait_for(|initiated| *initiated).await.is_err() {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                tracing::warn!("Graceful shutdown timeout expired, forcing shutdown");
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("modules", &self.registry.modules().collect::<Vec<_>>())
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

/// Picks the first endpoint of the group whose constraints accept the
/// captured segments.
async fn dispatch(
    pipeline: Pipeline,
    candidates: Candidates,
    params: std::result::Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
) -> Response {
    let captures: Vec<(String, String)> = match params {
        Ok(params) => params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        Err(RawPathParamsRejection::MissingPathParams(_)) => Vec::new(),
        Err(rejection) => return rejection.into_response(),
    };

    for (pattern, endpoint) in candidates.iter() {
        let matched =
            pattern.match_captures(captures.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(path_params) = matched {
            return pipeline.handle(endpoint.clone(), path_params, request).await;
        }
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Resolver for applications built without a database: every session
/// identity is unknown.
struct NoPrincipals;

#[async_trait::async_trait]
impl AuthResolver for NoPrincipals {
    async fn resolve(&self, _user_id: i64) -> Result<crate::auth::Resolution> {
        Ok(crate::auth::Resolution::Rejected(
            crate::auth::RejectReason::NotFound,
        ))
    }
}
