//! Host data model

pub mod host_value;

pub use host_value::HostValue;
