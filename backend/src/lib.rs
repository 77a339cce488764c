//! jq Stream Core - value bridge and run sessions
//!
//! Feeds host values through a transformation engine and pulls the
//! resulting outputs back one at a time.
//!
//! # Architecture
//!
//! - **models**: Host data model (`HostValue`)
//! - **engine**: Reference-counted value heap, filter compiler and executor
//! - **bridge**: Host/engine value conversion and JSON text codec
//! - **session**: Run sessions and the lifecycle tracker for held values
//! - **error**: Error types
//!
//! # Critical Invariants
//!
//! 1. Every engine reference the core owns is released exactly once
//! 2. When in doubt, a held reference is leaked rather than released twice
//! 3. Integral engine numbers always come back as `HostValue::Int`

// Module declarations
pub mod bridge;
pub mod engine;
pub mod error;
pub mod models;
pub mod session;

// Re-exports for convenience
pub use bridge::{to_external, to_host};
pub use engine::{FormatOptions, Heap, HeapStats, Jv, Kind};
pub use error::{BridgeError, CompileError, ConversionError, ParseError, RunError};
pub use models::HostValue;
pub use session::{RunSession, SessionConfig, SessionState};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn jq_stream_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::session::PyJq>()?;
    Ok(())
}
