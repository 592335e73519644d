//! Types, method-resolution order, and the built-in type/exception
//! hierarchy bootstrap. MRO is C3 linearisation, exactly as the host
//! language computes it for its own classes.

use rustc_hash::FxHashMap;

use crate::error::{SpekError, SpekResult};
use crate::value::{Universe, Value, ValueData, ValueId};

/// A directly-defined member of a type: a field, a method, or a property.
/// `Field(n)` is the field's position among this type's own direct field
/// declarations (0-based); combined with the type's entry in
/// [`field_layout`]'s `field_bases`, that gives the field's absolute offset
/// in a `Compound` instance. Field indices carry no sub-value to clone or
/// seal through; methods and properties are themselves values.
#[derive(Debug, Clone)]
pub enum Member {
    Field(usize),
    Procedure(Value),
    Property(Value),
}

impl Member {
    pub(crate) fn value(&self) -> Option<Value> {
        match self {
            Member::Field(_) => None,
            Member::Procedure(v) | Member::Property(v) => Some(*v),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeData {
    pub name: String,
    pub bases: Vec<Value>,
    pub members: Vec<(String, Member)>,
    /// Per-supertype (including `self`) field-offset bookkeeping: the
    /// offset at which that supertype's own directly-declared fields begin
    /// in a `Compound` instance's field vector. Populated by
    /// [`field_layout`] once a type's namespace is wired up; empty for a
    /// freshly-`new`ed type that declares no fields of its own or whose
    /// bases haven't been linearised yet.
    pub field_bases: Vec<(Value, usize)>,
    pub field_count: usize,
}

impl TypeData {
    pub fn new(name: impl Into<String>, bases: Vec<Value>) -> Self {
        TypeData {
            name: name.into(),
            bases,
            members: Vec::new(),
            field_bases: Vec::new(),
            field_count: 0,
        }
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub(crate) fn rewrite_members(&mut self, it: &mut impl Iterator<Item = Value>) {
        for (_, member) in self.members.iter_mut() {
            if let Member::Procedure(v) | Member::Property(v) = member {
                *v = it.next().expect("child count mismatch");
            }
        }
    }

    /// Compares by name, base count, and member count before recursing —
    /// the same shallow-then-deep shape as the original's `Type.bequals`.
    pub(crate) fn bequals(
        &self,
        other: &TypeData,
        universe: &Universe,
        bij: &mut FxHashMap<ValueId, ValueId>,
    ) -> bool {
        if self.name != other.name
            || self.bases.len() != other.bases.len()
            || self.members.len() != other.members.len()
        {
            return false;
        }
        if !self
            .bases
            .iter()
            .zip(&other.bases)
            .all(|(a, b)| universe.bequals(*a, *b, bij))
        {
            return false;
        }
        self.members.iter().zip(&other.members).all(|((n1, m1), (n2, m2))| {
            n1 == n2
                && match (m1, m2) {
                    (Member::Field(a), Member::Field(b)) => a == b,
                    (Member::Procedure(a), Member::Procedure(b))
                    | (Member::Property(a), Member::Property(b)) => universe.bequals(*a, *b, bij),
                    _ => false,
                }
        })
    }
}

/// C3-linearises `ty`'s base list into a method-resolution order, `ty`
/// first. Mirrors `merge_linear`/`linearization` from the source exactly.
pub fn mro(universe: &Universe, ty: Value) -> SpekResult<Vec<Value>> {
    let Some(ValueData::Type(data)) = universe.get(ty) else {
        return Err(SpekError::type_error("mro() requires a type value"));
    };
    if data.bases.is_empty() {
        return Ok(vec![ty]);
    }
    let mut sequences: Vec<Vec<Value>> = Vec::new();
    for base in &data.bases {
        sequences.push(mro(universe, *base)?);
    }
    sequences.push(data.bases.clone());
    let merged = merge_linear(sequences)?;
    let mut result = vec![ty];
    result.extend(merged);
    Ok(result)
}

fn merge_linear(mut sequences: Vec<Vec<Value>>) -> SpekResult<Vec<Value>> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        let mut candidate = None;
        'outer: for seq in &sequences {
            let head = seq[0];
            for other in &sequences {
                if other[1..].iter().any(|v| v.eq_handle(&head)) {
                    continue 'outer;
                }
            }
            candidate = Some(head);
            break;
        }
        let head = candidate.ok_or_else(|| {
            SpekError::instruction_error("inconsistent base-type hierarchy (C3 linearisation failed)")
        })?;
        result.push(head);
        for seq in sequences.iter_mut() {
            if !seq.is_empty() && seq[0].eq_handle(&head) {
                seq.remove(0);
            }
        }
    }
}

impl Value {
    fn eq_handle(&self, other: &Value) -> bool {
        matches!((self, other), (Value::Handle(a), Value::Handle(b)) if a == b)
    }
}

/// Computes, for `ty`, the field-offset at which each of its supertypes'
/// (MRO-ordered, base-to-derived) own directly-declared fields begin, and
/// the total field count. Cross-inheritance field access is then O(1):
/// a `Member::Field(n)` declared on supertype `s` always lives at
/// `field_bases[s] + n` in any `Compound` of `ty` or a further subtype.
pub fn field_layout(universe: &Universe, ty: Value) -> SpekResult<(Vec<(Value, usize)>, usize)> {
    let mut order = mro(universe, ty)?;
    order.reverse();

    let mut field_bases = Vec::with_capacity(order.len());
    let mut offset = 0usize;
    for supertype in order {
        let Some(ValueData::Type(data)) = universe.get(supertype) else {
            return Err(SpekError::type_error("mro() returned a non-type value"));
        };
        field_bases.push((supertype, offset));
        let own_fields = data
            .members
            .iter()
            .filter(|(_, m)| matches!(m, Member::Field(_)))
            .count();
        offset += own_fields;
    }
    Ok((field_bases, offset))
}

/// True if `ty`'s MRO contains `other`.
pub fn subtypeof(universe: &Universe, ty: Value, other: Value) -> SpekResult<bool> {
    Ok(mro(universe, ty)?.into_iter().any(|t| t.eq_handle(&other)))
}

/// Names of the built-in types and exception hierarchy installed by
/// [`bootstrap`], in dependency order. Exceptions share `Exception` as a
/// common base, matching the hierarchy the original establishes across
/// `engine/core/data.py` and `lang/spek/data/exceptions.py`.
pub const EXCEPTION_KINDS: &[&str] = &[
    "CancellationError",
    "RuntimeError",
    "ReferenceError",
    "TypeError",
    "InstructionException",
    "AttributeError",
    "IndexError",
    "KeyError",
    "StopIteration",
    "FutureError",
    "JumpError",
];

pub const ATOMIC_TYPE_NAMES: &[&str] = &[
    "object", "type", "none", "bool", "int", "float", "str", "range",
];

/// The bootstrapped universe, holding the canonical singletons and type
/// handles an interpreter needs to get off the ground: `true`, `false`, and
/// every built-in/exception type (`none` itself is the atomic `Value::None`,
/// not a heap allocation). Built once through an explicit registration
/// builder rather than a module-level registry.
pub struct Builtins {
    pub types: FxHashMap<&'static str, Value>,
    pub true_: Value,
    pub false_: Value,
}

impl Builtins {
    pub fn exception_type(&self, kind: &str) -> Value {
        *self
            .types
            .get(kind)
            .or_else(|| self.types.get("RuntimeError"))
            .expect("RuntimeError must always be registered")
    }
}

/// Installs, in MRO-safe order, the atomic types and the exception
/// hierarchy, then the canonical `none`/`true`/`false` singletons.
pub fn bootstrap(universe: &mut Universe) -> Builtins {
    let mut types = FxHashMap::default();

    let object_ty = universe.alloc(ValueData::Type(TypeData::new("object", vec![])));
    types.insert("object", object_ty);
    for name in ATOMIC_TYPE_NAMES.iter().filter(|n| **n != "object") {
        let t = universe.alloc(ValueData::Type(TypeData::new(*name, vec![object_ty])));
        types.insert(*name, t);
    }

    let exception_base = universe.alloc(ValueData::Type(TypeData::new("Exception", vec![object_ty])));
    types.insert("Exception", exception_base);
    for name in EXCEPTION_KINDS {
        let t = universe.alloc(ValueData::Type(TypeData::new(*name, vec![exception_base])));
        types.insert(*name, t);
    }

    for (_, ty) in types.iter() {
        universe.seal(*ty);
    }

    let true_ = Value::Bool(true);
    let false_ = Value::Bool(false);

    Builtins { types, true_, false_ }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_inheritance_c3_linearises() {
        let mut u = Universe::new();
        let object_ty = u.alloc(ValueData::Type(TypeData::new("object", vec![])));
        let a = u.alloc(ValueData::Type(TypeData::new("A", vec![object_ty])));
        let b = u.alloc(ValueData::Type(TypeData::new("B", vec![object_ty])));
        let c = u.alloc(ValueData::Type(TypeData::new("C", vec![a, b])));
        let order = mro(&u, c).unwrap();
        let names: Vec<_> = order
            .iter()
            .map(|v| match u.get(*v) {
                Some(ValueData::Type(t)) => t.name.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["C", "A", "B", "object"]);
    }

    #[test]
    fn subtypeof_reflects_mro() {
        let mut u = Universe::new();
        let object_ty = u.alloc(ValueData::Type(TypeData::new("object", vec![])));
        let a = u.alloc(ValueData::Type(TypeData::new("A", vec![object_ty])));
        assert!(subtypeof(&u, a, object_ty).unwrap());
        assert!(!subtypeof(&u, object_ty, a).unwrap());
    }

    #[test]
    fn bootstrap_registers_exception_hierarchy() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let type_error = b.exception_type("TypeError");
        let exception_base = b.types["Exception"];
        assert!(subtypeof(&u, type_error, exception_base).unwrap());
    }

    #[test]
    fn field_layout_offsets_fields_base_to_derived() {
        let mut u = Universe::new();
        let object_ty = u.alloc(ValueData::Type(TypeData::new("object", vec![])));

        let mut base = TypeData::new("Base", vec![object_ty]);
        base.members.push(("x".to_string(), Member::Field(0)));
        base.members.push(("y".to_string(), Member::Field(1)));
        let base_ty = u.alloc(ValueData::Type(base));

        let mut derived = TypeData::new("Derived", vec![base_ty]);
        derived.members.push(("z".to_string(), Member::Field(0)));
        let derived_ty = u.alloc(ValueData::Type(derived));

        let (field_bases, field_count) = field_layout(&u, derived_ty).unwrap();
        assert_eq!(field_count, 3);
        assert_eq!(field_bases, vec![(object_ty, 0), (base_ty, 0), (derived_ty, 2)]);
    }
}
