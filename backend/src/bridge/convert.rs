//! Value bridge between [`HostValue`] and engine values
//!
//! Both directions are recursive and side-effect free apart from handle
//! traffic on the heap:
//!
//! - [`to_external`] returns a new owned handle
//! - [`to_host`] borrows its argument; every element reference it obtains
//!   along the way is released before it returns

use std::collections::HashMap;

use crate::engine::{Heap, Jv, Kind};
use crate::error::ConversionError;
use crate::models::HostValue;

/// Build an engine value from a host value. The caller owns the result.
pub fn to_external(heap: &mut Heap, value: &HostValue) -> Jv {
    match value {
        HostValue::Null => heap.null(),
        HostValue::Bool(b) => heap.boolean(*b),
        HostValue::Int(n) => heap.number(*n as f64),
        HostValue::Float(x) => heap.number(*x),
        HostValue::Text(s) => heap.string(s),
        HostValue::List(items) => {
            let mut arr = heap.array_sized(items.len());
            for (i, item) in items.iter().enumerate() {
                let elem = to_external(heap, item);
                arr = heap.array_set(arr, i, elem);
            }
            arr
        }
        HostValue::Map(entries) => {
            let mut obj = heap.object();
            for (key, item) in entries {
                let k = heap.string(key);
                let v = to_external(heap, item);
                obj = heap.object_set(obj, k, v);
            }
            obj
        }
    }
}

/// Read an engine value (borrowed) back into the host model.
///
/// Numbers the engine marks integral become [`HostValue::Int`], all others
/// [`HostValue::Float`].
pub fn to_host(heap: &mut Heap, value: Jv) -> Result<HostValue, ConversionError> {
    let Some(kind) = heap.kind(value) else {
        return Err(ConversionError::UnknownType);
    };

    match kind {
        Kind::Invalid => Err(ConversionError::Invalid(
            heap.invalid_msg(value).map(str::to_owned),
        )),
        Kind::Null => Ok(HostValue::Null),
        Kind::False => Ok(HostValue::Bool(false)),
        Kind::True => Ok(HostValue::Bool(true)),
        Kind::Number => {
            let x = heap.number_value(value).ok_or(ConversionError::UnknownType)?;
            if heap.is_integer(value) {
                Ok(HostValue::Int(x as i64))
            } else {
                Ok(HostValue::Float(x))
            }
        }
        Kind::String => heap
            .string_value(value)
            .map(|s| HostValue::Text(s.to_owned()))
            .ok_or(ConversionError::UnknownType),
        Kind::Array => {
            let len = heap.length(value);
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let elem = heap.array_get(value, i).ok_or(ConversionError::UnknownType)?;
                let converted = to_host(heap, elem);
                heap.free(elem);
                items.push(converted?);
            }
            Ok(HostValue::List(items))
        }
        Kind::Object => {
            let mut map = HashMap::with_capacity(heap.length(value));
            let mut cursor = heap.object_iter(value);
            while heap.object_iter_valid(value, cursor) {
                let key = heap
                    .object_iter_key(value, cursor)
                    .map(str::to_owned)
                    .ok_or(ConversionError::UnknownType)?;
                let item = heap
                    .object_iter_value(value, cursor)
                    .ok_or(ConversionError::UnknownType)?;
                let converted = to_host(heap, item);
                heap.free(item);
                map.insert(key, converted?);
                cursor = heap.object_iter_next(value, cursor);
            }
            Ok(HostValue::Map(map))
        }
    }
}
