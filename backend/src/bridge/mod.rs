//! Host/engine bridge
//!
//! - **convert**: host values to engine values and back
//! - **codec**: JSON text to engine values and back

pub mod codec;
pub mod convert;

pub use codec::{format, parse, INVALID_TEXT};
pub use convert::{to_external, to_host};
