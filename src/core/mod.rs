//! Core traits, types, and constants.
//!
//! This module provides the contracts shared by host selection and the
//! transport backends. It has minimal dependencies.

mod constants;
mod error;
#[cfg(feature = "transport")]
mod traits;

pub use constants::*;
pub use error::*;
#[cfg(feature = "transport")]
pub use traits::*;
