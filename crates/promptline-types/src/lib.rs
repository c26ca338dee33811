//! Shared types for the promptline session controller.

mod ops;
mod session;

pub use ops::*;
pub use session::*;
