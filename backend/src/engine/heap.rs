//! Reference-counted value heap
//!
//! Every value the engine hands out lives in a slot of this arena and is
//! addressed by a [`Jv`] handle. Handles are plain `Copy` tokens; ownership
//! is tracked by an explicit per-slot reference count, following the
//! conventions of the jq C API:
//!
//! - constructors return an *owned* reference (count starts at 1)
//! - [`Heap::copy`] adds a reference, [`Heap::free`] drops one
//! - operations documented as *consuming* take over the caller's reference
//! - operations documented as *borrowing* leave counts untouched
//!
//! # Critical Invariants
//!
//! - A slot is recycled only when its count reaches zero; recycling bumps
//!   the slot generation so old handles become *stale*.
//! - Stale handles read as [`Kind`]-less (`kind()` returns `None`) with a
//!   reference count of 0. Releasing one is a detected no-op, counted in
//!   [`HeapStats::stale_releases`].
//! - Containers are copy-on-write: mutating a shared container clones it.

use log::warn;
use serde::Serialize;

// ============================================================================
// Handles and Kinds
// ============================================================================

/// Handle to a value in a [`Heap`].
///
/// A handle does not keep its value alive on its own; see the module docs
/// for the ownership rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Jv {
    index: u32,
    generation: u32,
}

/// Kind tag of a heap value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Invalid,
    Null,
    False,
    True,
    Number,
    String,
    Array,
    Object,
}

impl Kind {
    /// Type name as reported by the filter language's `type` builtin
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Invalid => "<invalid>",
            Kind::Null => "null",
            Kind::False | Kind::True => "boolean",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
enum Data {
    Invalid(Option<String>),
    Null,
    False,
    True,
    Number(f64),
    String(String),
    Array(Vec<Jv>),
    Object(Vec<(String, Jv)>),
}

impl Data {
    fn kind(&self) -> Kind {
        match self {
            Data::Invalid(_) => Kind::Invalid,
            Data::Null => Kind::Null,
            Data::False => Kind::False,
            Data::True => Kind::True,
            Data::Number(_) => Kind::Number,
            Data::String(_) => Kind::String,
            Data::Array(_) => Kind::Array,
            Data::Object(_) => Kind::Object,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    refcount: usize,
    data: Option<Data>,
}

/// Opaque position inside an object, see [`Heap::object_iter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectCursor(usize);

/// Allocation counters, used to check for leaks and double releases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    /// Slots currently holding a value
    pub live: usize,
    /// Values allocated over the heap's lifetime
    pub allocated_total: u64,
    /// Values whose count reached zero over the heap's lifetime
    pub freed_total: u64,
    /// Releases attempted through stale handles
    pub stale_releases: u64,
}

/// Returns true if `x` counts as an integer: finite, integral, and within
/// `[-2^63, 2^63]`. The upper bound is `i64::MAX` rounded to the nearest
/// double; `x as i64` saturates it to `i64::MAX`.
pub fn is_integral(x: f64) -> bool {
    x.is_finite() && x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64
}

// ============================================================================
// Heap
// ============================================================================

/// Arena of reference-counted values
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    fn alloc(&mut self, data: Data) -> Jv {
        self.stats.live += 1;
        self.stats.allocated_total += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.refcount = 1;
            slot.data = Some(data);
            return Jv {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            refcount: 1,
            data: Some(data),
        });
        Jv {
            index,
            generation: 0,
        }
    }

    fn slot(&self, v: Jv) -> Option<&Slot> {
        self.slots
            .get(v.index as usize)
            .filter(|slot| slot.generation == v.generation && slot.data.is_some())
    }

    fn slot_mut(&mut self, v: Jv) -> Option<&mut Slot> {
        self.slots
            .get_mut(v.index as usize)
            .filter(|slot| slot.generation == v.generation && slot.data.is_some())
    }

    fn data(&self, v: Jv) -> Option<&Data> {
        self.slot(v).and_then(|slot| slot.data.as_ref())
    }

    // ------------------------------------------------------------------
    // Constructors (all return an owned reference)
    // ------------------------------------------------------------------

    pub fn null(&mut self) -> Jv {
        self.alloc(Data::Null)
    }

    pub fn boolean(&mut self, value: bool) -> Jv {
        self.alloc(if value { Data::True } else { Data::False })
    }

    pub fn number(&mut self, value: f64) -> Jv {
        self.alloc(Data::Number(value))
    }

    pub fn string(&mut self, value: &str) -> Jv {
        self.alloc(Data::String(value.to_owned()))
    }

    pub fn invalid(&mut self) -> Jv {
        self.alloc(Data::Invalid(None))
    }

    pub fn invalid_with_msg(&mut self, msg: &str) -> Jv {
        self.alloc(Data::Invalid(Some(msg.to_owned())))
    }

    /// Empty array with room for `capacity` elements
    pub fn array_sized(&mut self, capacity: usize) -> Jv {
        self.alloc(Data::Array(Vec::with_capacity(capacity)))
    }

    pub fn object(&mut self) -> Jv {
        self.alloc(Data::Object(Vec::new()))
    }

    // ------------------------------------------------------------------
    // Reference counting
    // ------------------------------------------------------------------

    /// Add a reference to `v` and return it. No-op on a stale handle.
    pub fn copy(&mut self, v: Jv) -> Jv {
        if let Some(slot) = self.slot_mut(v) {
            slot.refcount += 1;
        }
        v
    }

    /// Drop one reference to `v`, recycling it (and releasing its children)
    /// when the count reaches zero.
    pub fn free(&mut self, v: Jv) {
        let mut pending = vec![v];

        while let Some(handle) = pending.pop() {
            let Some(slot) = self.slot_mut(handle) else {
                self.stats.stale_releases += 1;
                warn!(
                    "release of stale handle (slot {}, generation {})",
                    handle.index, handle.generation
                );
                continue;
            };

            slot.refcount -= 1;
            if slot.refcount > 0 {
                continue;
            }

            let data = slot.data.take();
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(handle.index);
            self.stats.live -= 1;
            self.stats.freed_total += 1;

            match data {
                Some(Data::Array(items)) => pending.extend(items),
                Some(Data::Object(entries)) => {
                    pending.extend(entries.into_iter().map(|(_, value)| value))
                }
                _ => {}
            }
        }
    }

    /// Current reference count; 0 for a stale handle
    pub fn refcount(&self, v: Jv) -> usize {
        self.slot(v).map(|slot| slot.refcount).unwrap_or(0)
    }

    /// Whether `v` still addresses a live value
    pub fn is_live(&self, v: Jv) -> bool {
        self.slot(v).is_some()
    }

    // ------------------------------------------------------------------
    // Borrowing accessors
    // ------------------------------------------------------------------

    /// Kind of `v`, or `None` if the handle is stale
    pub fn kind(&self, v: Jv) -> Option<Kind> {
        self.data(v).map(Data::kind)
    }

    /// False for invalid values and stale handles
    pub fn is_valid(&self, v: Jv) -> bool {
        matches!(self.kind(v), Some(kind) if kind != Kind::Invalid)
    }

    pub fn invalid_msg(&self, v: Jv) -> Option<&str> {
        match self.data(v) {
            Some(Data::Invalid(msg)) => msg.as_deref(),
            _ => None,
        }
    }

    pub fn number_value(&self, v: Jv) -> Option<f64> {
        match self.data(v) {
            Some(Data::Number(x)) => Some(*x),
            _ => None,
        }
    }

    /// Whether `v` is a number with an integral value
    pub fn is_integer(&self, v: Jv) -> bool {
        self.number_value(v).map(is_integral).unwrap_or(false)
    }

    pub fn string_value(&self, v: Jv) -> Option<&str> {
        match self.data(v) {
            Some(Data::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Element count of an array or object, 0 for anything else
    pub fn length(&self, v: Jv) -> usize {
        match self.data(v) {
            Some(Data::Array(items)) => items.len(),
            Some(Data::Object(entries)) => entries.len(),
            _ => 0,
        }
    }

    pub(crate) fn array_items(&self, v: Jv) -> Option<&[Jv]> {
        match self.data(v) {
            Some(Data::Array(items)) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn object_entries(&self, v: Jv) -> Option<&[(String, Jv)]> {
        match self.data(v) {
            Some(Data::Object(entries)) => Some(entries),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    /// New reference to element `index` of array `arr` (borrowed)
    pub fn array_get(&mut self, arr: Jv, index: usize) -> Option<Jv> {
        let item = self.array_items(arr)?.get(index).copied()?;
        Some(self.copy(item))
    }

    /// Set element `index`, padding with nulls. Consumes `arr` and `value`.
    ///
    /// Returns the updated array, or an invalid value if `arr` is not an
    /// array.
    pub fn array_set(&mut self, arr: Jv, index: usize, value: Jv) -> Jv {
        if self.kind(arr) != Some(Kind::Array) {
            let msg = format!(
                "Cannot update field at index {} of {}",
                index,
                self.kind(arr).unwrap_or(Kind::Invalid).name()
            );
            self.free(arr);
            self.free(value);
            return self.invalid_with_msg(&msg);
        }

        let arr = self.unshare(arr);
        let len = self.length(arr);
        let padding: Vec<Jv> = (len..index).map(|_| self.null()).collect();

        let mut replaced = None;
        if let Some(Data::Array(items)) = self.slot_mut(arr).and_then(|s| s.data.as_mut()) {
            items.extend(padding);
            if index < items.len() {
                replaced = Some(std::mem::replace(&mut items[index], value));
            } else {
                items.push(value);
            }
        }
        if let Some(old) = replaced {
            self.free(old);
        }
        arr
    }

    /// Append to an array. Consumes `arr` and `value`.
    pub fn array_append(&mut self, arr: Jv, value: Jv) -> Jv {
        let index = self.length(arr);
        self.array_set(arr, index, value)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// New reference to the value stored under `key` (borrowed `obj`)
    pub fn object_get(&mut self, obj: Jv, key: &str) -> Option<Jv> {
        let value = self
            .object_entries(obj)?
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)?;
        Some(self.copy(value))
    }

    /// Insert or replace `key`. Consumes `obj`, `key` and `value`.
    ///
    /// `key` must be a string; otherwise an invalid value is returned.
    pub fn object_set(&mut self, obj: Jv, key: Jv, value: Jv) -> Jv {
        let name = match (self.kind(obj), self.string_value(key)) {
            (Some(Kind::Object), Some(name)) => name.to_owned(),
            (kind, name) => {
                let msg = if name.is_none() {
                    "Object keys must be strings".to_string()
                } else {
                    format!(
                        "Cannot index {} with \"{}\"",
                        kind.unwrap_or(Kind::Invalid).name(),
                        name.unwrap_or_default()
                    )
                };
                self.free(obj);
                self.free(key);
                self.free(value);
                return self.invalid_with_msg(&msg);
            }
        };
        self.free(key);

        let obj = self.unshare(obj);
        let mut replaced = None;
        if let Some(Data::Object(entries)) = self.slot_mut(obj).and_then(|s| s.data.as_mut()) {
            match entries.iter_mut().find(|(k, _)| *k == name) {
                Some(entry) => replaced = Some(std::mem::replace(&mut entry.1, value)),
                None => entries.push((name, value)),
            }
        }
        if let Some(old) = replaced {
            self.free(old);
        }
        obj
    }

    /// Cursor at the first entry of `obj` (borrowed)
    pub fn object_iter(&self, _obj: Jv) -> ObjectCursor {
        ObjectCursor(0)
    }

    pub fn object_iter_valid(&self, obj: Jv, cursor: ObjectCursor) -> bool {
        self.object_entries(obj)
            .map(|entries| cursor.0 < entries.len())
            .unwrap_or(false)
    }

    pub fn object_iter_next(&self, _obj: Jv, cursor: ObjectCursor) -> ObjectCursor {
        ObjectCursor(cursor.0 + 1)
    }

    pub fn object_iter_key(&self, obj: Jv, cursor: ObjectCursor) -> Option<&str> {
        self.object_entries(obj)?
            .get(cursor.0)
            .map(|(key, _)| key.as_str())
    }

    /// New reference to the value at `cursor`
    pub fn object_iter_value(&mut self, obj: Jv, cursor: ObjectCursor) -> Option<Jv> {
        let value = self.object_entries(obj)?.get(cursor.0).map(|(_, v)| *v)?;
        Some(self.copy(value))
    }

    /// Make `v` exclusively owned, cloning it if other references exist.
    /// Consumes `v`.
    fn unshare(&mut self, v: Jv) -> Jv {
        if self.refcount(v) <= 1 {
            return v;
        }
        let Some(data) = self.data(v).cloned() else {
            return v;
        };
        match &data {
            Data::Array(items) => {
                for item in items {
                    self.copy(*item);
                }
            }
            Data::Object(entries) => {
                for (_, value) in entries {
                    self.copy(*value);
                }
            }
            _ => {}
        }
        let fresh = self.alloc(data);
        self.free(v);
        fresh
    }
}
