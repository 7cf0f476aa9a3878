//!
//! Who is making the request and what they may do.
//!
//! The session carries only the user's primary key under [`SESSION_KEY`]. On
//! every request an [`AuthResolver`] rebuilds the [`Principal`] from storage,
//! so disabling an account or changing a role takes effect immediately.
//!
mod principal;
mod resolver;
mod session;

pub use principal::*;
pub use resolver::*;
pub use session::*;
