//! Heap payload structs backing the non-atomic [`crate::value::ValueData`]
//! variants. Split out from `value.rs` the way the original keeps each
//! value subclass in its own module; kept thin since all four-equality and
//! sealing recursion lives centrally in `Universe`.

use rustc_hash::FxHashMap;

use crate::value::{Universe, Value, ValueId};

/// Status shared by both task-state variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Waiting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// The reserved interaction symbols. `Never` is filtered out of
/// `schedule_all` and cannot be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionSymbol {
    Tick,
    Next,
    Prev,
    Suspend,
    Resume,
    Never,
}

#[derive(Debug, Clone)]
pub enum TaskStateData {
    Stack {
        status: TaskStatus,
        stack: Vec<Value>,
        exception: Value,
        returned: Value,
    },
    Interaction {
        symbol: InteractionSymbol,
        status: TaskStatus,
    },
}

impl TaskStateData {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskStateData::Stack { status, .. } => *status,
            TaskStateData::Interaction { status, .. } => *status,
        }
    }

    pub(crate) fn children(&self) -> Vec<Value> {
        match self {
            TaskStateData::Stack {
                stack,
                exception,
                returned,
                ..
            } => {
                let mut c = stack.clone();
                c.push(*exception);
                c.push(*returned);
                c
            }
            TaskStateData::Interaction { .. } => Vec::new(),
        }
    }

    pub(crate) fn rewrite_children(&mut self, it: &mut impl Iterator<Item = Value>) {
        if let TaskStateData::Stack {
            stack,
            exception,
            returned,
            ..
        } = self
        {
            for slot in stack.iter_mut() {
                *slot = it.next().expect("child count mismatch");
            }
            *exception = it.next().expect("child count mismatch");
            *returned = it.next().expect("child count mismatch");
        }
    }

    /// `hash()` is `len(stack)` for stack tasks per the source; interaction
    /// tasks hash by their symbol, since they carry no stack.
    pub fn hash(&self) -> u64 {
        match self {
            TaskStateData::Stack { stack, .. } => stack.len() as u64,
            TaskStateData::Interaction { symbol, .. } => *symbol as u64 ^ 0x5eed,
        }
    }

    pub(crate) fn bequals(
        &self,
        other: &TaskStateData,
        universe: &Universe,
        bij: &mut FxHashMap<ValueId, ValueId>,
    ) -> bool {
        match (self, other) {
            (
                TaskStateData::Stack {
                    status: s1,
                    stack: st1,
                    exception: e1,
                    returned: r1,
                },
                TaskStateData::Stack {
                    status: s2,
                    stack: st2,
                    exception: e2,
                    returned: r2,
                },
            ) => {
                s1 == s2
                    && st1.len() == st2.len()
                    && st1.iter().zip(st2).all(|(a, b)| universe.bequals(*a, *b, bij))
                    && universe.bequals(*e1, *e2, bij)
                    && universe.bequals(*r1, *r2, bij)
            }
            (
                TaskStateData::Interaction {
                    symbol: sym1,
                    status: s1,
                },
                TaskStateData::Interaction {
                    symbol: sym2,
                    status: s2,
                },
            ) => sym1 == sym2 && s1 == s2,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Unset,
    Set,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FutureData {
    pub status: FutureStatus,
    pub result: Value,
}

impl FutureData {
    pub fn unset() -> Self {
        FutureData {
            status: FutureStatus::Unset,
            result: Value::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyData {
    pub getter: Value,
    pub setter: Option<Value>,
}

impl PropertyData {
    pub(crate) fn children(&self) -> Vec<Value> {
        let mut c = vec![self.getter];
        if let Some(s) = self.setter {
            c.push(s);
        }
        c
    }

    pub(crate) fn rewrite_children(&mut self, it: &mut impl Iterator<Item = Value>) {
        self.getter = it.next().expect("child count mismatch");
        if self.setter.is_some() {
            self.setter = Some(it.next().expect("child count mismatch"));
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProcedureData {
    Stack { num_args: usize, entry: Value },
    /// Identifies a host-language callable registered in the intrinsic
    /// table by name; see `Universe::bootstrap`.
    Intrinsic { name: String },
    Bound { inner: Value, args: Vec<Option<Value>> },
    /// The shim a type value is coerced into by `Callable`/`New`: allocates
    /// a zeroed-out `Compound` of `ty`, invokes its `__init__` (if any) on
    /// that instance plus the call's own arguments, then yields the
    /// instance itself rather than whatever `__init__` returned.
    Constructor { ty: Value },
}

impl ProcedureData {
    pub(crate) fn children(&self) -> Vec<Value> {
        match self {
            ProcedureData::Stack { entry, .. } => vec![*entry],
            ProcedureData::Intrinsic { .. } => Vec::new(),
            ProcedureData::Bound { inner, args } => {
                let mut c = vec![*inner];
                c.extend(args.iter().filter_map(|a| *a));
                c
            }
            ProcedureData::Constructor { ty } => vec![*ty],
        }
    }

    pub(crate) fn rewrite_children(&mut self, it: &mut impl Iterator<Item = Value>) {
        match self {
            ProcedureData::Stack { entry, .. } => {
                *entry = it.next().expect("child count mismatch");
            }
            ProcedureData::Intrinsic { .. } => {}
            ProcedureData::Bound { inner, args } => {
                *inner = it.next().expect("child count mismatch");
                for slot in args.iter_mut() {
                    if slot.is_some() {
                        *slot = Some(it.next().expect("child count mismatch"));
                    }
                }
            }
            ProcedureData::Constructor { ty } => {
                *ty = it.next().expect("child count mismatch");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IteratorData {
    pub container: Value,
    pub index: usize,
    /// Captured at construction for mutable containers; a `next()` call
    /// that observes a different token than the container currently holds
    /// raises `RuntimeError` ("iterator invalidated by mutation").
    pub mutation_token_at_creation: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum ReferenceData {
    Frame(usize),
    AbsoluteFrame {
        task_id: u64,
        frame_offset: usize,
        slot_index: usize,
    },
    ReturnValue,
    Exception,
    Field { compound: Value, field_index: usize },
    Item { container: Value, index: Value },
    Name { namespace: Value, name: String },
    /// Wraps a reference to a `Cell`; reads/writes forward to the cell's
    /// slot so two procedures can share a free variable.
    Cell(Value),
    /// Read-only reference to a fixed value; writes fail.
    VRef(Value),
}

impl ReferenceData {
    pub(crate) fn children(&self) -> Vec<Value> {
        match self {
            ReferenceData::Frame(_)
            | ReferenceData::AbsoluteFrame { .. }
            | ReferenceData::ReturnValue
            | ReferenceData::Exception => Vec::new(),
            ReferenceData::Field { compound, .. } => vec![*compound],
            ReferenceData::Item { container, index } => vec![*container, *index],
            ReferenceData::Name { namespace, .. } => vec![*namespace],
            ReferenceData::Cell(r) | ReferenceData::VRef(r) => vec![*r],
        }
    }

    pub(crate) fn rewrite_children(&mut self, it: &mut impl Iterator<Item = Value>) {
        match self {
            ReferenceData::Frame(_)
            | ReferenceData::AbsoluteFrame { .. }
            | ReferenceData::ReturnValue
            | ReferenceData::Exception => {}
            ReferenceData::Field { compound, .. } => {
                *compound = it.next().expect("child count mismatch");
            }
            ReferenceData::Item { container, index } => {
                *container = it.next().expect("child count mismatch");
                *index = it.next().expect("child count mismatch");
            }
            ReferenceData::Name { namespace, .. } => {
                *namespace = it.next().expect("child count mismatch");
            }
            ReferenceData::Cell(r) | ReferenceData::VRef(r) => {
                *r = it.next().expect("child count mismatch");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameData {
    pub location: Value,
    pub locals: Vec<Value>,
}

impl FrameData {
    /// Pads with `Value::None` or truncates to `new_length`.
    pub fn resize(&mut self, new_length: usize) {
        self.locals.resize(new_length, Value::None);
    }
}
