//! Lazy filter executor
//!
//! A [`Run`] evaluates a compiled [`Program`] against one input value and
//! yields its outputs one at a time. Pending work is kept on an explicit
//! stack of frames, each owning the handles it will consume, and is only
//! advanced as far as needed to produce the next output.
//!
//! Outputs are transferred to the caller. Exhaustion is signalled with an
//! invalid value without a message, a runtime error with an invalid value
//! carrying the error text. Either ends the run: subsequent calls to
//! [`Run::next`] keep returning invalid values until the next `start`.

use std::rc::Rc;

use log::trace;

use super::compiler::{Builtin, Expr, IndexKey, Literal, ObjectKey, Program, MAX_DEPTH};
use super::heap::{Heap, Jv, Kind};
use super::json::{self, FormatOptions};

/// Where an output goes once produced
#[derive(Debug)]
enum Cont {
    Emit,
    Pipe(Rc<Expr>, Rc<Cont>),
}

#[derive(Debug)]
enum Frame {
    Eval {
        expr: Rc<Expr>,
        input: Jv,
        cont: Rc<Cont>,
    },
    Yield {
        value: Jv,
        cont: Rc<Cont>,
    },
}

impl Frame {
    fn handle(&self) -> Jv {
        match self {
            Frame::Eval { input, .. } => *input,
            Frame::Yield { value, .. } => *value,
        }
    }
}

type Step = Result<Option<Jv>, String>;

/// Stack machine shared by the top-level run and nested collections
#[derive(Debug, Default)]
struct Machine {
    frames: Vec<Frame>,
    /// Number of enclosing collections
    depth: usize,
}

impl Machine {
    fn seeded(expr: Rc<Expr>, input: Jv, depth: usize) -> Self {
        Self {
            frames: vec![Frame::Eval {
                expr,
                input,
                cont: Rc::new(Cont::Emit),
            }],
            depth,
        }
    }

    /// Release every pending handle
    fn clear(&mut self, heap: &mut Heap) {
        for frame in self.frames.drain(..) {
            heap.free(frame.handle());
        }
    }

    /// Advance until one output is produced (`Ok(Some)`), the work runs out
    /// (`Ok(None)`), or an error is raised.
    fn step(&mut self, heap: &mut Heap) -> Step {
        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Yield { value, cont } => match cont.as_ref() {
                    Cont::Emit => return Ok(Some(value)),
                    Cont::Pipe(next, after) => self.frames.push(Frame::Eval {
                        expr: next.clone(),
                        input: value,
                        cont: after.clone(),
                    }),
                },
                Frame::Eval { expr, input, cont } => self.eval(heap, &expr, input, cont)?,
            }
        }
        Ok(None)
    }

    fn push_yield(&mut self, value: Jv, cont: &Rc<Cont>) {
        self.frames.push(Frame::Yield {
            value,
            cont: cont.clone(),
        });
    }

    /// Push outputs so that the first one is produced first
    fn push_yields(&mut self, values: Vec<Jv>, cont: &Rc<Cont>) {
        for value in values.into_iter().rev() {
            self.push_yield(value, cont);
        }
    }

    /// Evaluate one expression. Consumes `input`, including on error.
    fn eval(
        &mut self,
        heap: &mut Heap,
        expr: &Rc<Expr>,
        input: Jv,
        cont: Rc<Cont>,
    ) -> Result<(), String> {
        match expr.as_ref() {
            Expr::Identity => self.push_yield(input, &cont),

            Expr::Literal(literal) => {
                heap.free(input);
                let value = match literal {
                    Literal::Null => heap.null(),
                    Literal::Bool(b) => heap.boolean(*b),
                    Literal::Number(x) => heap.number(*x),
                    Literal::String(s) => heap.string(s),
                };
                self.push_yield(value, &cont);
            }

            Expr::Pipe(left, right) => self.frames.push(Frame::Eval {
                expr: left.clone(),
                input,
                cont: Rc::new(Cont::Pipe(right.clone(), cont)),
            }),

            Expr::Comma(left, right) => {
                let shared = heap.copy(input);
                self.frames.push(Frame::Eval {
                    expr: right.clone(),
                    input: shared,
                    cont: cont.clone(),
                });
                self.frames.push(Frame::Eval {
                    expr: left.clone(),
                    input,
                    cont,
                });
            }

            Expr::Index(key) => {
                let value = index(heap, input, key)?;
                self.push_yield(value, &cont);
            }

            Expr::Iterate => {
                let items = match heap.kind(input) {
                    Some(Kind::Array) => heap.array_items(input).unwrap_or_default().to_vec(),
                    Some(Kind::Object) => heap
                        .object_entries(input)
                        .unwrap_or_default()
                        .iter()
                        .map(|(_, value)| *value)
                        .collect(),
                    kind => {
                        let msg = format!(
                            "Cannot iterate over {}",
                            describe(heap, input, kind.unwrap_or(Kind::Invalid))
                        );
                        heap.free(input);
                        return Err(msg);
                    }
                };
                let items: Vec<Jv> = items.into_iter().map(|item| heap.copy(item)).collect();
                heap.free(input);
                self.push_yields(items, &cont);
            }

            Expr::Array(body) => {
                let mut arr = heap.array_sized(0);
                if let Some(body) = body {
                    let (items, error) = collect(heap, body, input, self.depth + 1);
                    if let Some(msg) = error {
                        items.into_iter().for_each(|item| heap.free(item));
                        heap.free(arr);
                        return Err(msg);
                    }
                    for item in items {
                        arr = heap.array_append(arr, item);
                    }
                } else {
                    heap.free(input);
                }
                self.push_yield(arr, &cont);
            }

            Expr::Object(entries) => {
                let objects = build_objects(heap, entries, input, self.depth + 1)?;
                self.push_yields(objects, &cont);
            }

            Expr::Try(body) => {
                let (items, error) = collect(heap, body, input, self.depth + 1);
                if let Some(msg) = error {
                    trace!("suppressed error: {}", msg);
                }
                self.push_yields(items, &cont);
            }

            Expr::Builtin(builtin) => {
                if let Some(value) = apply_builtin(heap, *builtin, input)? {
                    self.push_yield(value, &cont);
                }
            }
        }
        Ok(())
    }
}

/// Run `expr` on `input` to completion. Consumes `input`.
///
/// Returns the outputs produced before the first error, and that error.
fn collect(
    heap: &mut Heap,
    expr: &Rc<Expr>,
    input: Jv,
    depth: usize,
) -> (Vec<Jv>, Option<String>) {
    if depth > MAX_DEPTH {
        heap.free(input);
        return (Vec::new(), Some("Program too deeply nested".to_string()));
    }
    let mut machine = Machine::seeded(expr.clone(), input, depth);
    let mut outputs = Vec::new();
    loop {
        match machine.step(heap) {
            Ok(Some(value)) => outputs.push(value),
            Ok(None) => return (outputs, None),
            Err(msg) => {
                machine.clear(heap);
                return (outputs, Some(msg));
            }
        }
    }
}

/// Collect, turning an error into `Err` after releasing partial outputs
fn collect_all(
    heap: &mut Heap,
    expr: &Rc<Expr>,
    input: Jv,
    depth: usize,
) -> Result<Vec<Jv>, String> {
    let (items, error) = collect(heap, expr, input, depth);
    match error {
        Some(msg) => {
            items.into_iter().for_each(|item| heap.free(item));
            Err(msg)
        }
        None => Ok(items),
    }
}

fn free_all(heap: &mut Heap, values: Vec<Jv>) {
    values.into_iter().for_each(|value| heap.free(value));
}

/// Cartesian product of every entry's key and value outputs. Consumes `input`.
fn build_objects(
    heap: &mut Heap,
    entries: &[(ObjectKey, Rc<Expr>)],
    input: Jv,
    depth: usize,
) -> Result<Vec<Jv>, String> {
    let mut partials = vec![heap.object()];

    for (key, value) in entries {
        let keys = match key {
            ObjectKey::Name(name) => vec![heap.string(name)],
            ObjectKey::Computed(expr) => {
                let shared = heap.copy(input);
                match collect_all(heap, expr, shared, depth) {
                    Ok(keys) => keys,
                    Err(msg) => {
                        free_all(heap, partials);
                        heap.free(input);
                        return Err(msg);
                    }
                }
            }
        };
        if let Some(bad) = keys.iter().find(|k| heap.kind(**k) != Some(Kind::String)) {
            let msg = format!(
                "Object keys must be strings, not {}",
                heap.kind(*bad).unwrap_or(Kind::Invalid).name()
            );
            free_all(heap, keys);
            free_all(heap, partials);
            heap.free(input);
            return Err(msg);
        }

        let shared = heap.copy(input);
        let values = match collect_all(heap, value, shared, depth) {
            Ok(values) => values,
            Err(msg) => {
                free_all(heap, keys);
                free_all(heap, partials);
                heap.free(input);
                return Err(msg);
            }
        };

        let mut next = Vec::with_capacity(partials.len() * keys.len() * values.len());
        for partial in &partials {
            for k in &keys {
                for v in &values {
                    let obj = heap.copy(*partial);
                    let k = heap.copy(*k);
                    let v = heap.copy(*v);
                    next.push(heap.object_set(obj, k, v));
                }
            }
        }
        free_all(heap, partials);
        free_all(heap, keys);
        free_all(heap, values);
        partials = next;
    }

    heap.free(input);
    Ok(partials)
}

/// Short description of a value for error messages, e.g. `number (5)`
fn describe(heap: &Heap, v: Jv, kind: Kind) -> String {
    let mut text = json::dump_text(heap, v, &FormatOptions::default());
    if text.len() > 11 {
        let cut = (0..=11).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    format!("{} ({})", kind.name(), text)
}

/// Index `input` by `key`. Consumes `input`.
fn index(heap: &mut Heap, input: Jv, key: &IndexKey) -> Result<Jv, String> {
    let kind = heap.kind(input).unwrap_or(Kind::Invalid);
    let found = match (kind, key) {
        (Kind::Null, _) => None,
        (Kind::Object, IndexKey::Name(name)) => heap.object_get(input, name),
        (Kind::Array, IndexKey::Position(pos)) => {
            let len = heap.length(input) as i64;
            let at = if *pos < 0 { len + pos } else { *pos };
            if at < 0 {
                None
            } else {
                heap.array_get(input, at as usize)
            }
        }
        (_, IndexKey::Name(name)) => {
            let msg = format!("Cannot index {} with \"{}\"", kind.name(), name);
            heap.free(input);
            return Err(msg);
        }
        (_, IndexKey::Position(_)) => {
            let msg = format!("Cannot index {} with number", kind.name());
            heap.free(input);
            return Err(msg);
        }
    };
    heap.free(input);
    Ok(match found {
        Some(value) => value,
        None => heap.null(),
    })
}

/// Apply a builtin. Consumes `input`. `Ok(None)` means no output.
fn apply_builtin(heap: &mut Heap, builtin: Builtin, input: Jv) -> Result<Option<Jv>, String> {
    let kind = heap.kind(input).unwrap_or(Kind::Invalid);

    let output = match builtin {
        Builtin::Empty => None,

        Builtin::Length => {
            let n = match kind {
                Kind::Null => 0.0,
                Kind::Number => heap.number_value(input).unwrap_or(0.0).abs(),
                Kind::String => heap.string_value(input).unwrap_or_default().chars().count() as f64,
                Kind::Array | Kind::Object => heap.length(input) as f64,
                _ => {
                    let msg = format!("{} has no length", describe(heap, input, kind));
                    heap.free(input);
                    return Err(msg);
                }
            };
            Some(heap.number(n))
        }

        Builtin::Keys => match kind {
            Kind::Object => {
                let mut names: Vec<String> = heap
                    .object_entries(input)
                    .unwrap_or_default()
                    .iter()
                    .map(|(name, _)| name.clone())
                    .collect();
                names.sort();
                let mut arr = heap.array_sized(names.len());
                for name in names {
                    let s = heap.string(&name);
                    arr = heap.array_append(arr, s);
                }
                Some(arr)
            }
            Kind::Array => {
                let len = heap.length(input);
                let mut arr = heap.array_sized(len);
                for i in 0..len {
                    let n = heap.number(i as f64);
                    arr = heap.array_append(arr, n);
                }
                Some(arr)
            }
            _ => {
                let msg = format!("{} has no keys", describe(heap, input, kind));
                heap.free(input);
                return Err(msg);
            }
        },

        Builtin::Type => Some(heap.string(kind.name())),

        Builtin::Not => Some(heap.boolean(matches!(kind, Kind::Null | Kind::False))),

        Builtin::ToJson => {
            return Ok(Some(json::dump_string(heap, input, &FormatOptions::default())));
        }

        Builtin::ToString => {
            if kind == Kind::String {
                return Ok(Some(input));
            }
            return Ok(Some(json::dump_string(heap, input, &FormatOptions::default())));
        }

        Builtin::Error => {
            let msg = match heap.string_value(input) {
                Some(s) => s.to_owned(),
                None => format!(
                    "{} (not a string)",
                    json::dump_text(heap, input, &FormatOptions::default())
                ),
            };
            heap.free(input);
            return Err(msg);
        }
    };

    heap.free(input);
    Ok(output)
}

// ============================================================================
// Run
// ============================================================================

/// Execution state of one program over one input
#[derive(Debug)]
pub struct Run {
    machine: Machine,
    exhausted: bool,
}

impl Run {
    /// A run with nothing to produce
    pub fn new() -> Self {
        Self {
            machine: Machine::default(),
            exhausted: true,
        }
    }

    /// Begin evaluating `program` on `input`, discarding any pending work.
    /// Consumes `input`.
    pub fn start(&mut self, heap: &mut Heap, program: &Program, input: Jv) {
        self.machine.clear(heap);
        self.machine = Machine::seeded(program.root().clone(), input, 0);
        self.exhausted = false;
    }

    /// Next output, or an invalid value once the run is over. The returned
    /// reference is owned by the caller.
    pub fn next(&mut self, heap: &mut Heap) -> Jv {
        if self.exhausted {
            return heap.invalid();
        }
        match self.machine.step(heap) {
            Ok(Some(value)) => value,
            Ok(None) => {
                self.exhausted = true;
                heap.invalid()
            }
            Err(msg) => {
                self.machine.clear(heap);
                self.exhausted = true;
                heap.invalid_with_msg(&msg)
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Handles still owned by pending work
    pub fn pending(&self) -> usize {
        self.machine.frames.len()
    }

    /// Release all pending work
    pub fn teardown(&mut self, heap: &mut Heap) {
        self.machine.clear(heap);
        self.exhausted = true;
    }
}

impl Default for Run {
    fn default() -> Self {
        Self::new()
    }
}
