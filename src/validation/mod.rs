//!
//! Declarative validation of submitted form values.
//!
//! Each field carries a pipe-delimited rule chain such as
//! `"len:14,128|email|unique:correo_electronico,usuario"`. Chains are parsed
//! into [`RuleChain`]s once, bound to submitted values as [`FieldEntry`]s and
//! run by the [`Validator`], which returns the ordered list of messages to
//! show the user. Only declaration mistakes and data-source failures are
//! reported as [`Error`](crate::Error)s.
//!
//! ```
//! use campus_gate::validation::{FieldEntry, Validator};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let entries = vec![
//!     FieldEntry::new("Correo", "bad-email", "email").unwrap(),
//!     FieldEntry::new("Nombres", "Ana", "letters").unwrap(),
//! ];
//! let errors = Validator::new().validate(&entries).await.unwrap();
//! assert_eq!(errors, vec!["Correo no es un correo electrónico válido"]);
//! # });
//! ```
//!
mod engine;
mod field;
mod rule;
mod validator;

pub use engine::evaluate;
pub use field::*;
pub use rule::*;
pub use validator::*;

#[cfg(test)]
mod tests;
