//! Native transformation engine
//!
//! The value system and filter runtime the bridge talks to. The core only
//! depends on the operations re-exported here:
//!
//! | Operation   | Entry point                    |
//! |-------------|--------------------------------|
//! | compile     | [`compile`]                    |
//! | beginRun    | [`Run::start`]                 |
//! | pullNext    | [`Run::next`]                  |
//! | teardown    | [`Run::teardown`]              |
//! | parseText   | [`json::parse`]                |
//! | formatText  | [`json::dump_string`]          |
//!
//! plus the value constructors and accessors on [`Heap`].

pub mod compiler;
pub mod heap;
pub mod json;
pub mod run;

pub use compiler::{compile, Diagnostic, Program};
pub use heap::{Heap, HeapStats, Jv, Kind, ObjectCursor};
pub use json::FormatOptions;
pub use run::Run;
