//! Run session: one compiled program plus its live run
//!
//! # Protocol
//!
//! ```text
//! compile ──ok──▶ Idle ──start──▶ Running ──pull()=false──▶ Exhausted
//!    │                              ▲                          │
//!    └──err──▶ (no session)         └──────────start───────────┘
//! ```
//!
//! `close` is valid from every state and idempotent. Dropping a session
//! closes it.
//!
//! # Critical Invariants
//!
//! 1. The session holds at most one output reference at a time (the tracker
//!    slot), settled before it is overwritten
//! 2. The engine heap is scoped to the session: created on compile, dropped
//!    with the session
//! 3. Accessors never change reference counts

use log::debug;
use uuid::Uuid;

use crate::bridge::{self, INVALID_TEXT};
use crate::engine::{self, Heap, Jv, Kind, Program, Run};
use crate::error::{BridgeError, CompileError, ConversionError, RunError};
use crate::models::HostValue;
use crate::session::config::SessionConfig;
use crate::session::tracker::LifecycleTracker;

/// Where a session is in its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Compiled, never started
    Idle,
    /// Started; outputs may remain
    Running,
    /// The last pull reported no value
    Exhausted,
    Closed,
}

/// A compiled filter together with its engine state
///
/// # Example
///
/// ```
/// use jq_stream_core_rs::{HostValue, RunSession};
///
/// let mut session = RunSession::compile(".[]").unwrap();
/// session.handle_json("[1, 2, 3]").unwrap();
///
/// let mut seen = Vec::new();
/// while session.pull() {
///     seen.push(session.current_value().unwrap());
/// }
/// assert_eq!(seen, vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);
/// session.close();
/// ```
#[derive(Debug)]
pub struct RunSession {
    id: Uuid,
    config: SessionConfig,
    program: Program,
    heap: Heap,
    run: Run,
    tracker: LifecycleTracker,
    state: SessionState,
    last_error: Option<String>,
}

impl RunSession {
    /// Compile `program` with the default configuration
    pub fn compile(program: &str) -> Result<Self, CompileError> {
        Self::compile_with_config(program, SessionConfig::default())
    }

    /// Compile `program`
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if the engine rejects the program. No
    /// session exists in that case.
    pub fn compile_with_config(program: &str, config: SessionConfig) -> Result<Self, CompileError> {
        let id = Uuid::new_v4();
        let program = engine::compile(program).map_err(|diagnostic| {
            debug!("session {}: compile failed: {}", id, diagnostic);
            CompileError::Syntax {
                message: diagnostic.message,
                offset: diagnostic.offset,
            }
        })?;
        debug!("session {}: compiled {:?}", id, program.source());

        Ok(Self {
            id,
            config,
            program,
            heap: Heap::new(),
            run: Run::new(),
            tracker: LifecycleTracker::new(),
            state: SessionState::Idle,
            last_error: None,
        })
    }

    // ========================================================================
    // Feeding input
    // ========================================================================

    /// Begin a fresh run on `input`, an owned handle from this session's
    /// heap. The handle is consumed, even when the session is closed.
    pub fn start(&mut self, input: Jv) -> Result<(), RunError> {
        if self.state == SessionState::Closed {
            self.heap.free(input);
            return Err(RunError::Closed);
        }

        self.tracker.settle(&mut self.heap);
        self.run.start(&mut self.heap, &self.program, input);
        self.state = SessionState::Running;
        self.last_error = None;
        debug!("session {}: run started", self.id);
        Ok(())
    }

    /// Convert `value` and start a run on it
    pub fn handle(&mut self, value: &HostValue) -> Result<(), RunError> {
        if self.state == SessionState::Closed {
            return Err(RunError::Closed);
        }
        let input = bridge::to_external(&mut self.heap, value);
        self.start(input)
    }

    /// Parse `text` and start a run on it.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Parse`] if the text is not valid JSON; the run is not
    /// started and the session stays usable.
    pub fn handle_json(&mut self, text: &str) -> Result<(), BridgeError> {
        if self.state == SessionState::Closed {
            return Err(RunError::Closed.into());
        }
        let input = bridge::parse(&mut self.heap, text)?;
        self.start(input)?;
        Ok(())
    }

    // ========================================================================
    // Pulling output
    // ========================================================================

    /// Advance to the next output. Returns whether one is available.
    pub fn pull(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }

        self.tracker.settle(&mut self.heap);
        let value = self.run.next(&mut self.heap);
        let valid = self.heap.is_valid(value);

        if !valid {
            if let Some(msg) = self.heap.invalid_msg(value) {
                debug!("session {}: run error: {}", self.id, msg);
                self.last_error = Some(msg.to_owned());
            }
            if self.state == SessionState::Running {
                self.state = SessionState::Exhausted;
            }
        }

        self.tracker.capture(&mut self.heap, value);
        valid
    }

    /// The captured output as a host value.
    ///
    /// Before the first pull, after a pull returned false, or after close,
    /// this is `Err(ConversionError::Invalid(_))`.
    pub fn current_value(&mut self) -> Result<HostValue, ConversionError> {
        match self.tracker.current() {
            Some(handle) => bridge::to_host(&mut self.heap, handle),
            None => Err(ConversionError::Invalid(None)),
        }
    }

    /// The captured output rendered as JSON text
    pub fn current_text(&mut self) -> String {
        match self.tracker.current() {
            Some(handle) => bridge::format(&mut self.heap, handle, &self.config.format),
            None => INVALID_TEXT.to_string(),
        }
    }

    /// The captured output's contents if it is a string, else its JSON text
    pub fn current_raw_string(&mut self) -> String {
        if let Some(handle) = self.tracker.current() {
            if self.heap.kind(handle) == Some(Kind::String) {
                return self.heap.string_value(handle).unwrap_or_default().to_owned();
            }
        }
        self.current_text()
    }

    /// An additional reference to the captured output, owned by the caller.
    ///
    /// Release it through [`heap_mut`](Self::heap_mut) or hand it to
    /// [`start`](Self::start). While it is alive the tracker will not
    /// release the session's own reference.
    pub fn current_handle(&mut self) -> Option<Jv> {
        let handle = self.tracker.current()?;
        if !self.heap.is_valid(handle) {
            return None;
        }
        Some(self.heap.copy(handle))
    }

    /// Pull every remaining output as host values
    pub fn collect_values(&mut self) -> Vec<Result<HostValue, ConversionError>> {
        let mut values = Vec::new();
        while self.pull() {
            values.push(self.current_value());
        }
        values
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release the held output and tear down the run. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.tracker.release(&mut self.heap);
        self.run.teardown(&mut self.heap);
        self.state = SessionState::Closed;
        debug!(
            "session {}: closed ({:?}, {} skipped releases)",
            self.id,
            self.heap.stats(),
            self.tracker.skipped_releases()
        );
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn program_source(&self) -> &str {
        self.program.source()
    }

    /// Message of the runtime error that ended the current run, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Releases the tracker skipped because a reference count had changed
    pub fn skipped_releases(&self) -> usize {
        self.tracker.skipped_releases()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }
}

impl Drop for RunSession {
    fn drop(&mut self) {
        self.close();
    }
}
