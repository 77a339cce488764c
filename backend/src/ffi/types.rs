//! Type conversion utilities for FFI boundary
//!
//! Converts between Python objects and [`HostValue`].

use std::collections::HashMap;

use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};
use pyo3::IntoPyObjectExt;

use crate::error::ConversionError;
use crate::models::HostValue;

/// Convert a Python object to a host value
///
/// Accepts None, bool, int, float, str, list, tuple and dict. Dict keys that
/// are not `str` are stringified with `str()`.
///
/// # Errors
///
/// Raises TypeError for any other Python type, and OverflowError for ints
/// outside the i64 range.
pub fn py_to_host(obj: &Bound<'_, PyAny>) -> PyResult<HostValue> {
    if obj.is_none() {
        return Ok(HostValue::Null);
    }
    // bool before int: Python bools are ints
    if let Ok(b) = obj.downcast::<PyBool>() {
        return Ok(HostValue::Bool(b.is_true()));
    }
    if obj.is_instance_of::<PyInt>() {
        return Ok(HostValue::Int(obj.extract()?));
    }
    if let Ok(f) = obj.downcast::<PyFloat>() {
        return Ok(HostValue::Float(f.value()));
    }
    if obj.is_instance_of::<PyString>() {
        return Ok(HostValue::Text(obj.extract()?));
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        let items = list
            .iter()
            .map(|item| py_to_host(&item))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(HostValue::List(items));
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        let items = tuple
            .iter()
            .map(|item| py_to_host(&item))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(HostValue::List(items));
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let mut map = HashMap::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            let key: String = if key.is_instance_of::<PyString>() {
                key.extract()?
            } else {
                key.str()?.extract()?
            };
            map.insert(key, py_to_host(&value)?);
        }
        return Ok(HostValue::Map(map));
    }

    Err(PyTypeError::new_err(format!(
        "unknown type for: {}",
        obj.repr()?
    )))
}

/// Convert a host value to a Python object
pub fn host_to_py(py: Python<'_>, value: &HostValue) -> PyResult<PyObject> {
    match value {
        HostValue::Null => Ok(py.None()),
        HostValue::Bool(b) => b.into_py_any(py),
        HostValue::Int(n) => n.into_py_any(py),
        HostValue::Float(x) => x.into_py_any(py),
        HostValue::Text(s) => s.into_py_any(py),
        HostValue::List(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(host_to_py(py, item)?)?;
            }
            list.into_py_any(py)
        }
        HostValue::Map(entries) => {
            let dict = PyDict::new(py);
            for (key, item) in entries {
                dict.set_item(key, host_to_py(py, item)?)?;
            }
            dict.into_py_any(py)
        }
    }
}

/// Map a conversion failure to a Python ValueError
pub fn conversion_error_to_py(err: ConversionError) -> PyErr {
    match err {
        ConversionError::Invalid(Some(msg)) => PyValueError::new_err(format!("invalid: {}", msg)),
        other => PyValueError::new_err(other.to_string()),
    }
}
