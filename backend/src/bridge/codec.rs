//! Text codec adapter
//!
//! Thin layer over the engine's JSON primitives that turns the engine's
//! invalid-value signalling into [`ParseError`] and owns the temporary
//! string the formatter allocates.

use crate::engine::{json, FormatOptions, Heap, Jv};
use crate::error::ParseError;

/// Text shown for a value that cannot be rendered (invalid or released)
pub const INVALID_TEXT: &str = "<invalid>";

/// Parse JSON text into an owned engine value
pub fn parse(heap: &mut Heap, text: &str) -> Result<Jv, ParseError> {
    let value = json::parse(heap, text);
    if heap.is_valid(value) {
        return Ok(value);
    }

    let message = heap
        .invalid_msg(value)
        .unwrap_or("unrecognized input")
        .to_owned();
    heap.free(value);
    Err(ParseError::InvalidJson { message })
}

/// Render `value` (borrowed) as text
pub fn format(heap: &mut Heap, value: Jv, options: &FormatOptions) -> String {
    if !heap.is_live(value) {
        return INVALID_TEXT.to_string();
    }

    // The formatter consumes its argument; give it a reference of its own.
    let owned = heap.copy(value);
    let buffer = json::dump_string(heap, owned, options);
    let text = heap.string_value(buffer).unwrap_or_default().to_owned();
    heap.free(buffer);
    text
}
