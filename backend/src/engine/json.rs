//! JSON text primitives of the engine
//!
//! `parse` turns text into a heap value, `dump_string` renders a heap value
//! into a freshly allocated engine string. Failures are reported the way the
//! rest of the engine reports them: as invalid values carrying a message.

use serde::{Deserialize, Serialize};
use serde_json::ser::{CompactFormatter, PrettyFormatter};
use serde_json::{Map, Number, Value};

use super::heap::{is_integral, Heap, Jv, Kind};

/// Text rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    /// Multi-line output with indentation
    pub pretty: bool,
    /// Indent width in spaces (pretty output only)
    pub indent: u8,
    /// Emit object keys in sorted order
    pub sort_keys: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 2,
            sort_keys: false,
        }
    }
}

/// Parse JSON text into a new heap value.
///
/// On malformed input the result is an invalid value whose message is the
/// parser diagnostic.
pub fn parse(heap: &mut Heap, text: &str) -> Jv {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => from_json(heap, &value),
        Err(e) => heap.invalid_with_msg(&format!("{} (while parsing '{}')", e, excerpt(text))),
    }
}

/// Longest input prefix quoted in a parse error
const EXCERPT_LEN: usize = 32;

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LEN {
        return text.to_string();
    }
    let cut = (0..=EXCERPT_LEN)
        .rev()
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(0);
    format!("{}...", &text[..cut])
}

/// Build a heap value from a `serde_json::Value`
pub fn from_json(heap: &mut Heap, value: &Value) -> Jv {
    match value {
        Value::Null => heap.null(),
        Value::Bool(b) => heap.boolean(*b),
        Value::Number(n) => heap.number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => heap.string(s),
        Value::Array(items) => {
            let mut arr = heap.array_sized(items.len());
            for (i, item) in items.iter().enumerate() {
                let elem = from_json(heap, item);
                arr = heap.array_set(arr, i, elem);
            }
            arr
        }
        Value::Object(entries) => {
            let mut obj = heap.object();
            for (key, item) in entries {
                let k = heap.string(key);
                let v = from_json(heap, item);
                obj = heap.object_set(obj, k, v);
            }
            obj
        }
    }
}

/// Render `v` (borrowed) as a `serde_json::Value`.
///
/// Integral numbers become JSON integers, non-finite numbers become null.
/// Invalid values and stale handles render as null.
pub fn to_json(heap: &Heap, v: Jv) -> Value {
    match heap.kind(v) {
        None | Some(Kind::Invalid) | Some(Kind::Null) => Value::Null,
        Some(Kind::False) => Value::Bool(false),
        Some(Kind::True) => Value::Bool(true),
        Some(Kind::Number) => {
            let x = heap.number_value(v).unwrap_or(f64::NAN);
            // 2^63 itself is integral but has no exact i64
            if is_integral(x) && x < i64::MAX as f64 {
                Value::from(x as i64)
            } else {
                Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        Some(Kind::String) => Value::String(heap.string_value(v).unwrap_or_default().to_owned()),
        Some(Kind::Array) => Value::Array(
            heap.array_items(v)
                .unwrap_or_default()
                .iter()
                .map(|item| to_json(heap, *item))
                .collect(),
        ),
        Some(Kind::Object) => {
            let mut map = Map::new();
            for (key, item) in heap.object_entries(v).unwrap_or_default() {
                map.insert(key.clone(), to_json(heap, *item));
            }
            Value::Object(map)
        }
    }
}

/// Render `v` (borrowed) as text
pub fn dump_text(heap: &Heap, v: Jv, options: &FormatOptions) -> String {
    if !heap.is_valid(v) {
        return match heap.invalid_msg(v) {
            Some(msg) => format!("<invalid:{}>", Value::String(msg.to_owned())),
            None => "<invalid>".to_string(),
        };
    }

    let mut value = to_json(heap, v);
    if options.sort_keys {
        value = sorted(value);
    }

    let mut buf = Vec::new();
    let written = if options.pretty {
        let indent = vec![b' '; options.indent as usize];
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(&indent));
        value.serialize(&mut ser)
    } else {
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, CompactFormatter);
        value.serialize(&mut ser)
    };

    match written {
        Ok(()) => String::from_utf8(buf).unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Render `v` into a new engine string. Consumes `v`.
pub fn dump_string(heap: &mut Heap, v: Jv, options: &FormatOptions) -> Jv {
    let text = dump_text(heap, v, options);
    heap.free(v);
    heap.string(&text)
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_key_order_in_dump() {
        let mut heap = Heap::new();
        let v = parse(&mut heap, r#"{"b":1,"a":[true,null,"x"]}"#);
        assert!(heap.is_valid(v));
        assert_eq!(
            dump_text(&heap, v, &FormatOptions::default()),
            r#"{"b":1,"a":[true,null,"x"]}"#
        );
        heap.free(v);
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_parse_failure_is_invalid_with_message() {
        let mut heap = Heap::new();
        let v = parse(&mut heap, "{not json");
        assert!(!heap.is_valid(v));
        assert!(heap.invalid_msg(v).is_some());
        heap.free(v);
    }

    #[test]
    fn test_parse_error_quotes_bounded_excerpt() {
        let mut heap = Heap::new();
        let text = format!("[{}", "1,".repeat(10_000));
        let v = parse(&mut heap, &text);
        let msg = heap.invalid_msg(v).unwrap_or_default();
        assert!(msg.len() < 200, "message too long: {}", msg.len());
        assert!(msg.contains("while parsing '[1,1,"));
        assert!(msg.ends_with("...')"));
        heap.free(v);
    }

    #[test]
    fn test_parse_is_exact_for_shortest_float_text() {
        let mut heap = Heap::new();
        let v = parse(&mut heap, "920874.8788424141");
        assert_eq!(heap.number_value(v), Some(920874.8788424141));
        assert_eq!(dump_text(&heap, v, &FormatOptions::default()), "920874.8788424141");
        heap.free(v);
    }

    #[test]
    fn test_integer_range_edges_dump() {
        let mut heap = Heap::new();
        let min = heap.number(i64::MIN as f64);
        assert_eq!(
            dump_text(&heap, min, &FormatOptions::default()),
            "-9223372036854775808"
        );
        let two_63 = heap.number(i64::MAX as f64);
        assert_eq!(
            dump_text(&heap, two_63, &FormatOptions::default()),
            "9.223372036854776e18"
        );
    }

    #[test]
    fn test_integral_numbers_dump_without_fraction() {
        let mut heap = Heap::new();
        let v = heap.number(3.0);
        assert_eq!(dump_text(&heap, v, &FormatOptions::default()), "3");
        let f = heap.number(2.5);
        assert_eq!(dump_text(&heap, f, &FormatOptions::default()), "2.5");
        let nan = heap.number(f64::NAN);
        assert_eq!(dump_text(&heap, nan, &FormatOptions::default()), "null");
    }

    #[test]
    fn test_sorted_pretty_output() {
        let mut heap = Heap::new();
        let v = parse(&mut heap, r#"{"b":1,"a":2}"#);
        let options = FormatOptions {
            pretty: true,
            indent: 4,
            sort_keys: true,
        };
        assert_eq!(dump_text(&heap, v, &options), "{\n    \"a\": 2,\n    \"b\": 1\n}");
    }

    #[test]
    fn test_dump_string_consumes_input() {
        let mut heap = Heap::new();
        let v = heap.boolean(true);
        let s = dump_string(&mut heap, v, &FormatOptions::default());
        assert!(!heap.is_live(v));
        assert_eq!(heap.string_value(s), Some("true"));
        heap.free(s);
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_invalid_dump() {
        let mut heap = Heap::new();
        let plain = heap.invalid();
        assert_eq!(dump_text(&heap, plain, &FormatOptions::default()), "<invalid>");
        let with_msg = heap.invalid_with_msg("boom");
        assert_eq!(
            dump_text(&heap, with_msg, &FormatOptions::default()),
            "<invalid:\"boom\">"
        );
    }
}
