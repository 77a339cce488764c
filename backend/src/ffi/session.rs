//! PyO3 wrapper for RunSession
//!
//! Exposes the start/pull/close protocol to Python.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use super::types::{conversion_error_to_py, host_to_py, py_to_host};
use crate::error::BridgeError;
use crate::session::RunSession;

/// Python wrapper for [`RunSession`]
///
/// # Example (from Python)
///
/// ```python
/// from jq_stream_core_rs import JQ
///
/// with JQ(".[] | .name") as jq:
///     jq.handle([{"name": "a"}, {"name": "b"}])
///     while jq.next():
///         print(jq.value())
/// ```
#[pyclass(name = "JQ", unsendable)]
pub struct PyJq {
    inner: RunSession,
}

#[pymethods]
impl PyJq {
    /// Compile a filter program
    ///
    /// # Errors
    ///
    /// Raises ValueError if the program does not compile.
    #[new]
    fn new(program: &str) -> PyResult<Self> {
        let inner = RunSession::compile(program)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(PyJq { inner })
    }

    /// Start a run on a Python value (None, bool, int, float, str, list,
    /// tuple or dict)
    fn handle(&mut self, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let host = py_to_host(value)?;
        self.inner
            .handle(&host)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Start a run on a JSON document
    ///
    /// # Errors
    ///
    /// Raises ValueError if the text is not valid JSON.
    fn handle_json(&mut self, text: &str) -> PyResult<()> {
        self.inner.handle_json(text).map_err(|e| match e {
            BridgeError::Parse(parse) => PyValueError::new_err(parse.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        })
    }

    /// Advance to the next output; False once the run is over
    fn next(&mut self) -> bool {
        self.inner.pull()
    }

    /// Current output as a Python value
    fn value(&mut self, py: Python<'_>) -> PyResult<PyObject> {
        let value = self.inner.current_value().map_err(conversion_error_to_py)?;
        host_to_py(py, &value)
    }

    /// Current output as JSON text
    fn value_json(&mut self) -> String {
        self.inner.current_text()
    }

    /// Current output as a raw string if it is one, else as JSON text
    fn value_string(&mut self) -> String {
        self.inner.current_raw_string()
    }

    /// Message of the runtime error that ended the run, if any
    fn last_error(&self) -> Option<String> {
        self.inner.last_error().map(str::to_owned)
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn __enter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __exit__(
        &mut self,
        _exc_type: Option<&Bound<'_, PyAny>>,
        _exc_value: Option<&Bound<'_, PyAny>>,
        _traceback: Option<&Bound<'_, PyAny>>,
    ) -> bool {
        self.inner.close();
        false
    }
}
