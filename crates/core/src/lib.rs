//! Core types, key scheme, and unique attribution for the tally engine.

pub mod attribution;
pub mod auth;
pub mod day;
pub mod error;
pub mod event;
pub mod keys;
pub mod limits;
pub mod raw;
pub mod request;
pub mod retention;

pub use attribution::*;
pub use day::*;
pub use error::{AuthErrorCode, DbErrorCode, Error, Result, ValidationErrorCode};
pub use event::*;
pub use raw::*;
pub use request::*;
pub use retention::*;
