//! # campus-gate
//!
//! The request core of a university academic-management backend: how feature
//! modules (students, teachers, courses, grades, projects, semesters, ...)
//! declare their routes, how every request is gated by session and role
//! permission before a handler runs, and how submitted forms are checked
//! against declarative rule chains.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use campus_gate::{Application, Config, Result, routes};
//! use campus_gate::pipeline::{Endpoint, HandlerInput, Reply};
//! use campus_gate::validation::FormSchema;
//!
//! async fn create_course(input: HandlerInput) -> Result<Reply> {
//!     let schema = FormSchema::new()
//!         .field("codigo", "Codigo", "digits|len:6|unique:codigo,curso")?
//!         .field("nombre", "Nombre", "len:3,80")?;
//!
//!     let errors = input.validate(&schema).await?;
//!     if !errors.is_empty() {
//!         return Ok(Reply::new().with_errors(errors));
//!     }
//!     Ok(Reply::redirect("/courses/list"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default();  // Loads from config/{RUST_ENV}.toml
//!     config.setup_tracing();
//!
//!     let courses = routes! {
//!         "courses" => {
//!             "create" => Endpoint::page("course.create")
//!                 .permission("crear_curso")
//!                 .get(|_input: HandlerInput| async { Ok::<_, campus_gate::Error>(Reply::new()) })
//!                 .post(create_course),
//!         },
//!     };
//!
//!     Application::new(config)?
//!         .contribute("courses", courses)?
//!         .start()
//!         .await
//! }
//! ```
//!
//! With `config/dev.toml`:
//! ```toml
//! [http]
//! bind_port = 3000
//! login_route = "/login"
//!
//! [database]
//! url = "postgres://genesis:{{ DB_PASSWORD }}@localhost:5432/genesis"
//! ```
//!
//! Run with `RUST_ENV=dev cargo run`.
//!
//! # What You Get
//!
//! | Piece | Module |
//! |-------|--------|
//! | Nested route maps flattened into one dispatch table | [`routing`] |
//! | Rule chains: `digits`, `letters`, `email`, `password`, `len`, `repeat`, `unique`, `custom` | [`validation`] |
//! | Session identity, principal resolution, role permissions | [`auth`] |
//! | Resolve → access → permission → handler → response stages | [`pipeline`] |
//! | Request ids, tracing spans, timeouts, body limits, panic recovery | [`Application`] |
mod app;
mod config;
mod data;
mod error;
mod render;
mod utils;
mod value;

pub mod auth;
pub mod pipeline;
pub mod routing;
pub mod validation;

pub use app::Application;
pub use config::*;
pub use data::*;
pub use error::*;
pub use render::*;
pub use utils::*;
pub use value::*;

pub type Result<T> = std::result::Result<T, Error>;
