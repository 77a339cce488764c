//! FFI (Foreign Function Interface) module
//!
//! PyO3 bindings exposing run sessions to Python.
//!
//! # Design Principles
//!
//! 1. **Minimal boundary**: only the session protocol is exposed
//! 2. **Copies only**: Python receives converted values, never engine handles
//! 3. **Closed conversion**: unsupported Python types are rejected up front
//! 4. **Safe errors**: Rust errors become Python exceptions

pub mod session;
pub mod types;
