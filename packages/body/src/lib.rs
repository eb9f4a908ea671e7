//! Request and response bodies.
//!
//! A [`Body`] is either backed by a host body handle or wraps a guest stream.
//! Its readable stream is created on first use, and [`drain`] reads the whole
//! thing in one go, the way `text()` or `json()` would.

mod body;
mod drain;
mod error;

pub use body::Body;
pub use drain::{drain, Representation, TargetType};
pub use error::{BodyError, Result};
