//! Value Bridge Tests
//!
//! Conversion between host values and engine values, in both directions.
//!
//! Critical invariants tested:
//! - Round-trip: host -> engine -> host is structurally lossless
//! - Integral preservation: integral engine numbers come back as Int
//! - Reference hygiene: reading a value back releases every element reference

use jq_stream_core_rs::{to_external, to_host, ConversionError, Heap, HostValue, Kind};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn round_trip(value: &HostValue) -> Result<HostValue, ConversionError> {
    let mut heap = Heap::new();
    let jv = to_external(&mut heap, value);
    let back = to_host(&mut heap, jv);
    heap.free(jv);
    assert_eq!(heap.stats().live, 0, "conversion leaked engine values");
    back
}

fn sample_document() -> HostValue {
    HostValue::map([
        ("a", HostValue::Int(1)),
        (
            "b",
            HostValue::List(vec![
                HostValue::Bool(true),
                HostValue::Null,
                HostValue::Text("x".into()),
            ]),
        ),
        ("c", HostValue::Float(-0.25)),
        ("d", HostValue::map([("nested", HostValue::List(vec![]))])),
    ])
}

// ============================================================================
// Host -> Engine
// ============================================================================

#[test]
fn test_scalars_map_to_engine_kinds() {
    let mut heap = Heap::new();
    let cases = [
        (HostValue::Null, Kind::Null),
        (HostValue::Bool(false), Kind::False),
        (HostValue::Bool(true), Kind::True),
        (HostValue::Int(7), Kind::Number),
        (HostValue::Float(7.5), Kind::Number),
        (HostValue::Text("t".into()), Kind::String),
        (HostValue::List(vec![]), Kind::Array),
        (HostValue::map(Vec::<(String, HostValue)>::new()), Kind::Object),
    ];
    for (value, kind) in cases {
        let jv = to_external(&mut heap, &value);
        assert_eq!(heap.kind(jv), Some(kind), "kind of {:?}", value);
        heap.free(jv);
    }
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn test_list_order_is_preserved() {
    let mut heap = Heap::new();
    let value = HostValue::List((0..10).map(HostValue::from).collect::<Vec<_>>());
    let jv = to_external(&mut heap, &value);

    assert_eq!(heap.length(jv), 10);
    for i in 0..10 {
        let elem = heap.array_get(jv, i).unwrap();
        assert_eq!(heap.number_value(elem), Some(i as f64));
        heap.free(elem);
    }
    heap.free(jv);
}

#[test]
fn test_integers_become_integral_numbers() {
    let mut heap = Heap::new();
    let jv = to_external(&mut heap, &HostValue::Int(-42));
    assert!(heap.is_integer(jv));
    let fractional = to_external(&mut heap, &HostValue::Float(0.5));
    assert!(!heap.is_integer(fractional));
}

// ============================================================================
// Engine -> Host
// ============================================================================

#[test]
fn test_round_trip_document() {
    let doc = sample_document();
    assert_eq!(round_trip(&doc), Ok(doc));
}

#[test]
fn test_integral_float_comes_back_as_int() {
    assert_eq!(round_trip(&HostValue::Float(2.0)), Ok(HostValue::Int(2)));
    assert_eq!(round_trip(&HostValue::Float(2.5)), Ok(HostValue::Float(2.5)));
}

#[test]
fn test_int_beyond_double_precision_loses_precision() {
    // 2^53 + 1 is not representable as a double
    let big = (1i64 << 53) + 1;
    assert_eq!(round_trip(&HostValue::Int(big)), Ok(HostValue::Int(1i64 << 53)));
}

#[test]
fn test_i64_extremes_stay_ints() {
    // i64::MAX rounds up to 2^63 in the engine and saturates on the way back
    assert_eq!(round_trip(&HostValue::Int(i64::MAX)), Ok(HostValue::Int(i64::MAX)));
    assert_eq!(round_trip(&HostValue::Int(i64::MIN)), Ok(HostValue::Int(i64::MIN)));
}

#[test]
fn test_invalid_value_is_a_conversion_error() {
    let mut heap = Heap::new();
    let plain = heap.invalid();
    assert_eq!(to_host(&mut heap, plain), Err(ConversionError::Invalid(None)));

    let with_msg = heap.invalid_with_msg("bad input");
    let err = to_host(&mut heap, with_msg).unwrap_err();
    assert_eq!(err, ConversionError::Invalid(Some("bad input".into())));
    assert_eq!(err.to_string(), "invalid");
}

#[test]
fn test_released_handle_is_unknown_type() {
    let mut heap = Heap::new();
    let jv = heap.string("gone");
    heap.free(jv);
    let err = to_host(&mut heap, jv).unwrap_err();
    assert_eq!(err, ConversionError::UnknownType);
    assert_eq!(err.to_string(), "unknown type");
}

#[test]
fn test_duplicate_keys_last_wins() {
    let mut heap = Heap::new();
    let mut obj = heap.object();
    for n in [1.0, 2.0] {
        let k = heap.string("dup");
        let v = heap.number(n);
        obj = heap.object_set(obj, k, v);
    }
    assert_eq!(
        to_host(&mut heap, obj),
        Ok(HostValue::map([("dup", HostValue::Int(2))]))
    );
}

// ============================================================================
// Property Tests
// ============================================================================

fn host_value() -> impl Strategy<Value = HostValue> {
    let leaf = prop_oneof![
        Just(HostValue::Null),
        any::<bool>().prop_map(HostValue::Bool),
        (-(1i64 << 53)..(1i64 << 53)).prop_map(HostValue::Int),
        (-1.0e6f64..1.0e6)
            .prop_filter("fractional floats only", |x| x.fract() != 0.0)
            .prop_map(HostValue::Float),
        ".{0,8}".prop_map(HostValue::Text),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(HostValue::List),
            prop::collection::hash_map(".{0,6}", inner, 0..6).prop_map(HostValue::Map),
        ]
    })
}

proptest! {
    #[test]
    fn prop_round_trip_is_lossless(value in host_value()) {
        prop_assert_eq!(round_trip(&value), Ok(value));
    }

    #[test]
    fn prop_integral_numbers_are_ints(n in any::<i32>()) {
        let mut heap = Heap::new();
        let jv = heap.number(n as f64);
        prop_assert!(heap.is_integer(jv));
        prop_assert_eq!(to_host(&mut heap, jv), Ok(HostValue::Int(n as i64)));
    }

    #[test]
    fn prop_fractional_numbers_are_floats(x in -1.0e9f64..1.0e9) {
        prop_assume!(x.fract() != 0.0);
        let mut heap = Heap::new();
        let jv = heap.number(x);
        prop_assert_eq!(to_host(&mut heap, jv), Ok(HostValue::Float(x)));
    }
}
