#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Functional core for the prok API client: query and page models, error
//! kinds, retry policy, filter debouncing and the collection loader state
//! machine. Nothing in this crate performs I/O.

pub mod backoff;
pub mod debounce;
pub mod error;
pub mod loader;
pub mod model;
pub mod validation;

pub use backoff::*;
pub use debounce::*;
pub use error::*;
pub use loader::*;
pub use model::*;
pub use validation::*;
