//! Run Session Tests
//!
//! The compile / start / pull / close protocol.
//!
//! Critical invariants tested:
//! - Iteration terminates and never resumes after exhaustion
//! - Accessors on an empty slot return the invalid representation
//! - Compile and parse failures are typed errors
//! - Closing releases everything the session held

use jq_stream_core_rs::{
    BridgeError, CompileError, ConversionError, FormatOptions, HostValue, ParseError, RunError,
    RunSession, SessionConfig, SessionState,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn json(text: &str) -> HostValue {
    serde_json::from_str(text).unwrap()
}

fn session(program: &str) -> RunSession {
    RunSession::compile(program).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_identity_yields_input_once() {
    let mut s = session(".");
    s.handle_json(r#"{"a":1,"b":[true,null,"x"]}"#).unwrap();

    assert!(s.pull());
    assert_eq!(json(&s.current_text()), json(r#"{"b":[true,null,"x"],"a":1}"#));
    assert_eq!(s.current_value(), Ok(json(r#"{"a":1,"b":[true,null,"x"]}"#)));

    assert!(!s.pull());
    assert_eq!(s.state(), SessionState::Exhausted);
}

#[test]
fn test_iterate_yields_ints_in_order() {
    let mut s = session(".[]");
    s.handle(&HostValue::from(vec![1, 2, 3])).unwrap();

    for expected in 1..=3 {
        assert!(s.pull());
        assert_eq!(s.current_value(), Ok(HostValue::Int(expected)));
    }
    assert!(!s.pull());
}

#[test]
fn test_invalid_program_is_compile_error() {
    match RunSession::compile(".[") {
        Err(CompileError::Syntax { message, .. }) => assert!(!message.is_empty()),
        Ok(_) => panic!("'.[' must not compile"),
    }
    let err = RunSession::compile("nosuchbuiltin").unwrap_err();
    assert!(err.to_string().starts_with("Unable to compile jq filter"));
}

#[test]
fn test_deeply_nested_program_is_compile_error() {
    let program = format!("{}.{}", "[".repeat(600), "]".repeat(600));
    match RunSession::compile(&program) {
        Err(CompileError::Syntax { message, .. }) => {
            assert!(message.contains("too deeply nested"))
        }
        Ok(_) => panic!("600 levels of nesting must not compile"),
    }

    let program = format!("{}.{}", "[".repeat(100), "]".repeat(100));
    let mut s = session(&program);
    s.handle(&HostValue::Int(1)).unwrap();
    assert!(s.pull());
    assert_eq!(s.current_text().len(), 201);
}

#[test]
fn test_empty_program_is_identity() {
    let mut s = session("");
    s.handle_json(r#"{"k":1}"#).unwrap();
    assert!(s.pull());
    assert_eq!(s.current_value(), Ok(json(r#"{"k":1}"#)));
    assert!(!s.pull());
}

#[test]
fn test_malformed_input_never_starts_run() {
    let mut s = session(".");
    let err = s.handle_json(r#"{"a":"#).unwrap_err();
    assert!(matches!(err, BridgeError::Parse(ParseError::InvalidJson { .. })));

    assert_eq!(s.state(), SessionState::Idle);
    assert!(!s.pull());

    // Still usable with a different input
    s.handle_json("7").unwrap();
    assert!(s.pull());
    assert_eq!(s.current_value(), Ok(HostValue::Int(7)));
}

// ============================================================================
// Termination
// ============================================================================

#[test]
fn test_no_resurrection_after_exhaustion() {
    let mut s = session(".[] , .[]");
    s.handle_json("[1]").unwrap();
    assert!(s.pull());
    assert!(s.pull());
    for _ in 0..5 {
        assert!(!s.pull());
    }
}

#[test]
fn test_runtime_error_ends_run_and_is_reported() {
    let mut s = session(".[] | .a");
    s.handle_json(r#"[{"a":1}, 2, {"a":3}]"#).unwrap();

    assert!(s.pull());
    assert_eq!(s.current_value(), Ok(HostValue::Int(1)));
    assert!(!s.pull());
    assert_eq!(s.last_error(), Some(r#"Cannot index number with "a""#));
    assert!(matches!(
        s.current_value(),
        Err(ConversionError::Invalid(Some(_)))
    ));
    assert!(!s.pull());

    // A new start clears the error
    s.handle_json(r#"[{"a":4}]"#).unwrap();
    assert_eq!(s.last_error(), None);
    assert!(s.pull());
    assert_eq!(s.current_value(), Ok(HostValue::Int(4)));
}

#[test]
fn test_restart_mid_run_discards_pending_outputs() {
    let mut s = session(".[]");
    s.handle_json("[1,2,3]").unwrap();
    assert!(s.pull());

    s.handle_json("[9]").unwrap();
    assert!(s.pull());
    assert_eq!(s.current_value(), Ok(HostValue::Int(9)));
    assert!(!s.pull());

    s.close();
    assert_eq!(s.heap().stats().live, 0);
}

// ============================================================================
// Accessors
// ============================================================================

#[test]
fn test_accessors_before_first_pull() {
    let mut s = session(".");
    assert_eq!(s.current_value(), Err(ConversionError::Invalid(None)));
    assert_eq!(s.current_text(), "<invalid>");
    assert_eq!(s.current_raw_string(), "<invalid>");
    assert_eq!(s.current_handle(), None);
}

#[test]
fn test_accessors_after_exhaustion() {
    let mut s = session("empty");
    s.handle(&HostValue::Null).unwrap();
    assert!(!s.pull());
    assert_eq!(s.current_value(), Err(ConversionError::Invalid(None)));
    assert_eq!(s.current_text(), "<invalid>");
}

#[test]
fn test_raw_string_only_unwraps_strings() {
    let mut s = session(".name, .age, .tags");
    s.handle_json(r#"{"name":"bob","age":42,"tags":["x"]}"#).unwrap();

    assert!(s.pull());
    assert_eq!(s.current_raw_string(), "bob");
    assert_eq!(s.current_text(), r#""bob""#);

    assert!(s.pull());
    assert_eq!(s.current_raw_string(), "42");

    assert!(s.pull());
    assert_eq!(s.current_raw_string(), r#"["x"]"#);
}

#[test]
fn test_accessors_are_repeatable() {
    let mut s = session(".");
    s.handle_json(r#"{"k":[1.5]}"#).unwrap();
    assert!(s.pull());
    for _ in 0..3 {
        assert_eq!(s.current_text(), r#"{"k":[1.5]}"#);
        assert_eq!(s.current_value(), Ok(json(r#"{"k":[1.5]}"#)));
    }
}

#[test]
fn test_collect_values() {
    let mut s = session(".[] | {v: .}");
    s.handle_json("[true, null]").unwrap();
    assert_eq!(
        s.collect_values(),
        vec![Ok(json(r#"{"v":true}"#)), Ok(json(r#"{"v":null}"#))]
    );
}

#[test]
fn test_pretty_sorted_config() {
    let config = SessionConfig {
        format: FormatOptions {
            pretty: true,
            indent: 2,
            sort_keys: true,
        },
    };
    let mut s = RunSession::compile_with_config(".", config).unwrap();
    s.handle_json(r#"{"b":1,"a":[2]}"#).unwrap();
    assert!(s.pull());
    assert_eq!(s.current_text(), "{\n  \"a\": [\n    2\n  ],\n  \"b\": 1\n}");
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn test_close_is_idempotent_and_final() {
    let mut s = session(".[]");
    s.handle_json("[1,2]").unwrap();
    assert!(s.pull());

    s.close();
    s.close();
    assert!(s.is_closed());
    assert_eq!(s.heap().stats().live, 0);
    assert_eq!(s.heap().stats().stale_releases, 0);

    assert!(!s.pull());
    assert_eq!(s.handle(&HostValue::Int(1)), Err(RunError::Closed));
    assert!(matches!(
        s.handle_json("1"),
        Err(BridgeError::Run(RunError::Closed))
    ));
    assert_eq!(s.current_text(), "<invalid>");
}

#[test]
fn test_start_on_closed_session_consumes_input() {
    let mut s = session(".");
    s.close();
    let input = s.heap_mut().string("orphan");
    assert_eq!(s.start(input), Err(RunError::Closed));
    assert_eq!(s.heap().stats().live, 0);
}

#[test]
fn test_sessions_have_distinct_ids() {
    let a = session(".");
    let b = session(".");
    assert_ne!(a.session_id(), b.session_id());
    assert_eq!(a.program_source(), ".");
}
