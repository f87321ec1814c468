//! Shared setup for gcalauth binaries.
//!
//! The OAuth flow itself lives in `gcalauth-google`; this crate only owns
//! process-wide concerns such as log output.

pub mod tracing;

pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
