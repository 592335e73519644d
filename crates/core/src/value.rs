//! The value substrate: a closed tagged union of every runtime value kind,
//! backed by a generational arena so that object identity survives as a
//! stable index rather than a host pointer. This is the arena+index
//! replacement for the cyclic, GC-visible object graphs of the original
//! implementation — `bequals`'s bijection is built over `ValueId`s.

use std::fmt;

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};

use crate::data::{
    FrameData, FutureData, IteratorData, ProcedureData, PropertyData, ReferenceData,
    TaskStateData,
};
use crate::error::{SpekError, SpekResult};
use crate::types::TypeData;

new_key_type! {
    /// Stable identity of a heap-allocated value within a [`Universe`].
    pub struct ValueId;
}

/// A handle to a runtime value. Atomic variants are stored inline; every
/// other kind is a [`ValueId`] into the owning [`Universe`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Handle(ValueId),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub(crate) fn id(&self) -> Option<ValueId> {
        match self {
            Value::Handle(id) => Some(*id),
            _ => None,
        }
    }
}

/// The heap payload for non-atomic values. Exhaustively matched everywhere
/// it is consumed instead of being dispatched through a vtable: adding a
/// variant here is a compile error at every call site that needs updating.
#[derive(Debug, Clone)]
pub enum ValueData {
    Str(String),
    Range { start: i64, stop: i64, step: i64 },
    Tuple(Vec<Value>),
    List { items: Vec<Value>, mutation_token: u64 },
    Dict { entries: Vec<(Value, Value)>, mutation_token: u64 },
    Namespace(Vec<(String, Value)>),
    Cell(Value),
    Future(FutureData),
    /// A user-defined class instance or a builtin exception payload; both
    /// are fixed-width tuples of fields tagged with their type.
    Compound { ty: Value, fields: Vec<Value> },
    Type(TypeData),
    Procedure(ProcedureData),
    Property(PropertyData),
    Iterator(IteratorData),
    Reference(ReferenceData),
    Frame(FrameData),
    TaskState(TaskStateData),
    ProgramLocation { program: u32, index: usize },
}

struct Entry {
    data: ValueData,
    sealed: bool,
}

/// Owns the value arena. There is exactly one `Universe` per exploration;
/// it replaces the original's module-level singletons (`VNone.instance`,
/// per-type `intrinsic_type` slots) with an explicit, passed-through value.
pub struct Universe {
    arena: SlotMap<ValueId, Entry>,
    /// Keyed interning for `AbsoluteFrameReference`s: constructing with an
    /// equal `(task_id, frame_offset, slot_index)` key returns the
    /// previously interned handle instead of allocating a fresh one.
    absolute_frame_refs: FxHashMap<(u64, usize, usize), ValueId>,
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl Universe {
    pub fn new() -> Self {
        Universe {
            arena: SlotMap::with_key(),
            absolute_frame_refs: FxHashMap::default(),
        }
    }

    /// Interns an `AbsoluteFrameReference`: a second call with the same key
    /// returns the same handle as the first (weak interning — the cache
    /// entry is never evicted, even if the value it names is later
    /// unreachable).
    pub fn intern_absolute_frame(&mut self, task_id: u64, frame_offset: usize, slot_index: usize) -> Value {
        let key = (task_id, frame_offset, slot_index);
        if let Some(&id) = self.absolute_frame_refs.get(&key) {
            return Value::Handle(id);
        }
        let value = self.alloc(ValueData::Reference(ReferenceData::AbsoluteFrame {
            task_id,
            frame_offset,
            slot_index,
        }));
        let id = value.id().expect("alloc always returns a Handle");
        self.absolute_frame_refs.insert(key, id);
        value
    }

    /// Allocates a new, unsealed value.
    pub fn alloc(&mut self, data: ValueData) -> Value {
        let id = self.arena.insert(Entry {
            data,
            sealed: false,
        });
        Value::Handle(id)
    }

    pub fn get(&self, value: Value) -> Option<&ValueData> {
        match value {
            Value::Handle(id) => self.arena.get(id).map(|e| &e.data),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, value: Value) -> SpekResult<&mut ValueData> {
        match value {
            Value::Handle(id) => {
                let entry = self
                    .arena
                    .get_mut(id)
                    .ok_or_else(|| SpekError::reference_error("dangling value handle"))?;
                if entry.sealed {
                    return Err(SpekError::Sealed(
                        "cannot mutate a sealed value".to_string(),
                    ));
                }
                Ok(&mut entry.data)
            }
            _ => Err(SpekError::type_error("atomic values have no heap payload")),
        }
    }

    pub fn is_sealed(&self, value: Value) -> bool {
        match value.id() {
            Some(id) => self.arena.get(id).map(|e| e.sealed).unwrap_or(true),
            None => true, // atomics are immutable by construction
        }
    }

    /// Recursively seals `value` and everything it structurally owns.
    /// Marks `self` sealed *before* recursing so cyclic graphs terminate;
    /// sealing is otherwise idempotent, satisfying the one-way transition
    /// invariant.
    pub fn seal(&mut self, value: Value) {
        let id = match value.id() {
            Some(id) => id,
            None => return,
        };
        {
            let entry = match self.arena.get_mut(id) {
                Some(e) => e,
                None => return,
            };
            if entry.sealed {
                return;
            }
            entry.sealed = true;
        }
        for child in self.children_of(value) {
            self.seal(child);
        }
    }

    /// The values structurally owned by `value`, for sealing / bequals /
    /// clone-unsealed traversal.
    fn children_of(&self, value: Value) -> Vec<Value> {
        let Some(data) = self.get(value) else {
            return Vec::new();
        };
        match data {
            ValueData::Str(_) | ValueData::Range { .. } => Vec::new(),
            ValueData::Tuple(items) | ValueData::List { items, .. } => items.clone(),
            ValueData::Dict { entries, .. } => {
                entries.iter().flat_map(|(k, v)| [*k, *v]).collect()
            }
            ValueData::Namespace(entries) => entries.iter().map(|(_, v)| *v).collect(),
            ValueData::Cell(inner) => vec![*inner],
            ValueData::Future(f) => vec![f.result],
            ValueData::Compound { ty, fields } => {
                let mut c = vec![*ty];
                c.extend(fields.iter().copied());
                c
            }
            ValueData::Type(t) => t.members.iter().filter_map(|(_, m)| m.value()).collect(),
            ValueData::Procedure(p) => p.children(),
            ValueData::Property(p) => p.children(),
            ValueData::Iterator(it) => vec![it.container],
            ValueData::Reference(r) => r.children(),
            ValueData::Frame(f) => {
                let mut c = vec![f.location];
                c.extend(f.locals.iter().copied());
                c
            }
            ValueData::TaskState(t) => t.children(),
            ValueData::ProgramLocation { .. } => Vec::new(),
        }
    }

    /// Deep-clones an unsealed copy of `value`, preserving sharing and
    /// cycles via the caller-supplied identity map.
    pub fn clone_unsealed(
        &mut self,
        value: Value,
        clones: &mut FxHashMap<ValueId, Value>,
    ) -> Value {
        let id = match value.id() {
            Some(id) => id,
            None => return value, // atomics are their own clone
        };
        if let Some(existing) = clones.get(&id) {
            return *existing;
        }
        let data = self.get(value).expect("dangling value in clone_unsealed").clone();
        let shell = self.alloc(data);
        clones.insert(id, shell);

        let cloned_children: Vec<Value> = self
            .children_of(value)
            .into_iter()
            .map(|child| self.clone_unsealed(child, clones))
            .collect();
        self.rewrite_children(shell, cloned_children)
            .expect("shell was just allocated unsealed");
        shell
    }

    /// Replaces a freshly-cloned value's children in place, in the same
    /// order `children_of` produced them.
    fn rewrite_children(&mut self, value: Value, children: Vec<Value>) -> SpekResult<()> {
        let data = self.get_mut(value)?;
        let mut it = children.into_iter();
        match data {
            ValueData::Str(_) | ValueData::Range { .. } | ValueData::ProgramLocation { .. } => {}
            ValueData::Tuple(items) | ValueData::List { items, .. } => {
                for slot in items.iter_mut() {
                    *slot = it.next().expect("child count mismatch");
                }
            }
            ValueData::Dict { entries, .. } => {
                for (k, v) in entries.iter_mut() {
                    *k = it.next().expect("child count mismatch");
                    *v = it.next().expect("child count mismatch");
                }
            }
            ValueData::Namespace(entries) => {
                for (_, v) in entries.iter_mut() {
                    *v = it.next().expect("child count mismatch");
                }
            }
            ValueData::Cell(inner) => *inner = it.next().expect("child count mismatch"),
            ValueData::Future(f) => f.result = it.next().expect("child count mismatch"),
            ValueData::Compound { ty, fields } => {
                *ty = it.next().expect("child count mismatch");
                for slot in fields.iter_mut() {
                    *slot = it.next().expect("child count mismatch");
                }
            }
            ValueData::Type(t) => t.rewrite_members(&mut it),
            ValueData::Procedure(p) => p.rewrite_children(&mut it),
            ValueData::Property(p) => p.rewrite_children(&mut it),
            ValueData::Iterator(iter) => iter.container = it.next().expect("child count mismatch"),
            ValueData::Reference(r) => r.rewrite_children(&mut it),
            ValueData::Frame(f) => {
                f.location = it.next().expect("child count mismatch");
                for slot in f.locals.iter_mut() {
                    *slot = it.next().expect("child count mismatch");
                }
            }
            ValueData::TaskState(t) => t.rewrite_children(&mut it),
        }
        Ok(())
    }

    /// Identity for mutable values, structural for immutable ones; always
    /// implies equal `hash()`.
    pub fn equals(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::None, Value::None) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Handle(x), Value::Handle(y)) if x == y => true,
            (Value::Handle(_), Value::Handle(_)) => {
                // Immutable structural variants compare structurally;
                // everything else falls back to identity.
                match (self.get(a), self.get(b)) {
                    (Some(ValueData::Str(x)), Some(ValueData::Str(y))) => x == y,
                    (
                        Some(ValueData::Range { start: s1, stop: e1, step: st1 }),
                        Some(ValueData::Range { start: s2, stop: e2, step: st2 }),
                    ) => s1 == s2 && e1 == e2 && st1 == st2,
                    (Some(ValueData::Tuple(xs)), Some(ValueData::Tuple(ys))) => {
                        xs.len() == ys.len()
                            && xs.iter().zip(ys).all(|(x, y)| self.equals(*x, *y))
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// `hash()`; may only be called on sealed values.
    pub fn hash(&self, value: Value) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        match value {
            Value::None => 0u8.hash(&mut hasher),
            Value::Bool(b) => b.hash(&mut hasher),
            Value::Int(i) => i.hash(&mut hasher),
            Value::Float(f) => f.to_bits().hash(&mut hasher),
            Value::Handle(_) => match self.get(value) {
                Some(ValueData::Str(s)) => s.hash(&mut hasher),
                Some(ValueData::Range { start, stop, step }) => {
                    (start, stop, step).hash(&mut hasher)
                }
                Some(ValueData::Tuple(items)) => {
                    for i in items {
                        self.hash(*i).hash(&mut hasher);
                    }
                }
                _ => value.id().hash(&mut hasher),
            },
        }
        hasher.finish()
    }

    /// Bijective equality: `bij` is a partial map from `a`'s identities to
    /// `b`'s, extended incrementally as the comparison proceeds.
    pub fn bequals(&self, a: Value, b: Value, bij: &mut FxHashMap<ValueId, ValueId>) -> bool {
        match (a, b) {
            (Value::None, Value::None) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Handle(ida), Value::Handle(idb)) => {
                if let Some(&mapped) = bij.get(&ida) {
                    return mapped == idb;
                }
                bij.insert(ida, idb);
                match (self.get(a), self.get(b)) {
                    (Some(da), Some(db)) => self.bequals_data(da, db, bij),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn bequals_data(&self, da: &ValueData, db: &ValueData, bij: &mut FxHashMap<ValueId, ValueId>) -> bool {
        match (da, db) {
            (ValueData::Str(x), ValueData::Str(y)) => x == y,
            (
                ValueData::Range { start: s1, stop: e1, step: st1 },
                ValueData::Range { start: s2, stop: e2, step: st2 },
            ) => s1 == s2 && e1 == e2 && st1 == st2,
            (ValueData::Tuple(xs), ValueData::Tuple(ys))
            | (ValueData::List { items: xs, .. }, ValueData::List { items: ys, .. }) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.bequals(*x, *y, bij))
            }
            (ValueData::Dict { entries: xs, .. }, ValueData::Dict { entries: ys, .. }) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|((k1, v1), (k2, v2))| {
                        self.bequals(*k1, *k2, bij) && self.bequals(*v1, *v2, bij)
                    })
            }
            (ValueData::Cell(x), ValueData::Cell(y)) => self.bequals(*x, *y, bij),
            (ValueData::Future(x), ValueData::Future(y)) => {
                x.status == y.status && self.bequals(x.result, y.result, bij)
            }
            (
                ValueData::Compound { ty: t1, fields: f1 },
                ValueData::Compound { ty: t2, fields: f2 },
            ) => {
                self.bequals(*t1, *t2, bij)
                    && f1.len() == f2.len()
                    && f1.iter().zip(f2).all(|(x, y)| self.bequals(*x, *y, bij))
            }
            (ValueData::Type(x), ValueData::Type(y)) => x.bequals(y, self, bij),
            (ValueData::Frame(x), ValueData::Frame(y)) => {
                self.bequals(x.location, y.location, bij)
                    && x.locals.len() == y.locals.len()
                    && x.locals.iter().zip(&y.locals).all(|(a, b)| self.bequals(*a, *b, bij))
            }
            (ValueData::TaskState(x), ValueData::TaskState(y)) => x.bequals(y, self, bij),
            _ => false, // differing variants are never bequal
        }
    }

    /// The `==` operator as seen by user programs: crosses numeric types.
    pub fn cequals(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x as f64 == y,
            _ => self.equals(a, b),
        }
    }

    /// Hash compatible with `cequals`; unhashable containers raise.
    pub fn chash(&self, value: Value) -> SpekResult<u64> {
        match value {
            Value::Int(i) => Ok((i as f64).to_bits()),
            Value::Float(f) => Ok(f.to_bits()),
            Value::Handle(_) => match self.get(value) {
                Some(ValueData::List { .. }) | Some(ValueData::Dict { .. }) => {
                    Err(SpekError::type_error("unhashable type"))
                }
                Some(ValueData::Cell(_)) => Err(SpekError::type_error("cell values are unhashable")),
                _ => Ok(self.hash(value)),
            },
            _ => Ok(self.hash(value)),
        }
    }

    pub fn print(&self, value: Value, out: &mut dyn fmt::Write) -> fmt::Result {
        match value {
            Value::None => write!(out, "none"),
            Value::Bool(b) => write!(out, "{}", b),
            Value::Int(i) => write!(out, "{}", i),
            Value::Float(f) => write!(out, "{}", f),
            Value::Handle(_) => match self.get(value) {
                Some(ValueData::Str(s)) => write!(out, "{:?}", s),
                Some(ValueData::Tuple(items)) => {
                    write!(out, "(")?;
                    for (i, v) in items.iter().enumerate() {
                        if i > 0 {
                            write!(out, ", ")?;
                        }
                        self.print(*v, out)?;
                    }
                    write!(out, ")")
                }
                Some(ValueData::List { items, .. }) => {
                    write!(out, "[")?;
                    for (i, v) in items.iter().enumerate() {
                        if i > 0 {
                            write!(out, ", ")?;
                        }
                        self.print(*v, out)?;
                    }
                    write!(out, "]")
                }
                Some(ValueData::Cell(inner)) => {
                    write!(out, "Cell(")?;
                    self.print(*inner, out)?;
                    write!(out, ")")
                }
                _ => write!(out, "<value>"),
            },
        }
    }
}

/// Wraps a [`SpekError`] into a sealed exception value, the conversion
/// every instruction applies before writing to a task's exception slot.
pub fn pack_exception(universe: &mut Universe, ty: Value, err: &SpekError) -> Value {
    let msg = universe.alloc(ValueData::Str(err.to_string()));
    let exc = universe.alloc(ValueData::Compound {
        ty,
        fields: vec![msg],
    });
    universe.seal(exc);
    exc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealing_is_idempotent_and_recursive() {
        let mut u = Universe::new();
        let inner = u.alloc(ValueData::Str("x".into()));
        let outer = u.alloc(ValueData::Tuple(vec![inner, Value::Int(1)]));
        u.seal(outer);
        assert!(u.is_sealed(outer));
        assert!(u.is_sealed(inner));
        u.seal(outer); // idempotent, should not panic
        assert!(u.is_sealed(outer));
    }

    #[test]
    fn sealing_handles_cycles() {
        let mut u = Universe::new();
        let cell = u.alloc(ValueData::Cell(Value::None));
        // make the cell point to itself
        if let ValueData::Cell(inner) = u.get_mut(cell).unwrap() {
            *inner = cell;
        }
        u.seal(cell); // must terminate
        assert!(u.is_sealed(cell));
    }

    #[test]
    fn sealed_values_reject_mutation() {
        let mut u = Universe::new();
        let v = u.alloc(ValueData::Str("x".into()));
        u.seal(v);
        assert!(matches!(u.get_mut(v), Err(SpekError::Sealed(_))));
    }

    #[test]
    fn clone_unsealed_preserves_sharing() {
        let mut u = Universe::new();
        let leaf = u.alloc(ValueData::Str("leaf".into()));
        let outer = u.alloc(ValueData::Tuple(vec![leaf, leaf]));
        u.seal(outer);
        let mut clones = FxHashMap::default();
        let cloned = u.clone_unsealed(outer, &mut clones);
        assert!(!u.is_sealed(cloned));
        if let Some(ValueData::Tuple(items)) = u.get(cloned) {
            assert_eq!(items[0].id(), items[1].id(), "sharing must be preserved");
            assert_ne!(items[0].id(), leaf.id(), "clone must be fresh");
        } else {
            panic!("expected tuple");
        }
    }

    #[test]
    fn bequals_allows_different_identities_same_shape() {
        let mut u = Universe::new();
        let a_leaf = u.alloc(ValueData::Str("x".into()));
        let a = u.alloc(ValueData::Tuple(vec![a_leaf]));
        let b_leaf = u.alloc(ValueData::Str("x".into()));
        let b = u.alloc(ValueData::Tuple(vec![b_leaf]));
        let mut bij = FxHashMap::default();
        assert!(u.bequals(a, b, &mut bij));
    }

    #[test]
    fn cequals_crosses_int_and_float() {
        let u = Universe::new();
        assert!(u.cequals(Value::Int(1), Value::Float(1.0)));
        assert!(!u.cequals(Value::Int(1), Value::Float(1.5)));
    }

    #[test]
    fn absolute_frame_refs_are_keyed_interned() {
        let mut u = Universe::new();
        let a = u.intern_absolute_frame(0, 1, 2);
        let b = u.intern_absolute_frame(0, 1, 2);
        assert_eq!(a.id(), b.id(), "equal keys must return the same handle");
        let c = u.intern_absolute_frame(0, 1, 3);
        assert_ne!(a.id(), c.id(), "differing keys must not collide");
    }

    #[test]
    fn chash_rejects_lists_and_dicts() {
        let mut u = Universe::new();
        let list = u.alloc(ValueData::List {
            items: vec![],
            mutation_token: 0,
        });
        assert!(u.chash(list).is_err());
    }
}
