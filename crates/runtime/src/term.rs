//! The pure term evaluator. Evaluating a term never mutates existing
//! machine state and never suspends; failure is a [`SpekError`] that the
//! enclosing instruction catches and routes to its error continuation.

use spek_core::{
    Builtins, FutureData, InteractionSymbol, Member, ProcedureData, PropertyData, ReferenceData,
    SpekError, SpekResult, TaskStateData, TaskStatus, Universe, Value, ValueData,
};

use crate::machine::MachineState;
use crate::reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Invert,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

/// The term taxonomy from the component design. `TRef` always wraps a
/// fully-formed [`Value`] reference (never a bare index — see the Open
/// Question resolution on normalising `TRef`).
#[derive(Debug, Clone)]
pub enum Term {
    CInt(i64),
    CFloat(f64),
    CBool(bool),
    CNone,
    CString(String),
    CType(Value),
    TRef(Value),
    /// Addresses task `task_id`'s frame slot `slot_index` at depth
    /// `frame_offset` absolutely, independent of which task is currently
    /// executing — the reference kind the import preamble uses to reach
    /// into the module-level task's locals. Keyed-interned through
    /// [`Universe::intern_absolute_frame`](spek_core::Universe::intern_absolute_frame).
    AbsoluteFrameRef(u64, usize, usize),
    Read(Box<Term>),
    Project(Box<Term>, Box<Term>),
    Lookup(Box<Term>, Box<Term>),
    LoadAttrCase(Box<Term>, String),
    StoreAttrCase(Box<Term>, String),
    Unary(UnaryOp, Box<Term>),
    Arithmetic(ArithOp, Box<Term>, Box<Term>),
    Boolean(BoolOp, Box<Term>, Box<Term>),
    Comparison(CmpOp, Box<Term>, Box<Term>),
    IsCallable(Box<Term>),
    IsException(Box<Term>),
    IsTerminated(Box<Term>),
    New(Box<Term>, Vec<Term>),
    Callable(Box<Term>),
    ITask(InteractionSymbol),
    IsInstance(Box<Term>, Box<Term>),
    NewTuple(Vec<Term>),
    NewList(Vec<Term>),
    NewDict(Vec<(Term, Term)>),
    NewNamespace(Vec<(String, Term)>),
    NewCell(Box<Term>),
    NewProperty(Box<Term>, Option<Box<Term>>),
    NewProcedure {
        num_args: usize,
        entry: Box<Term>,
    },
    NewClass {
        name: String,
        supers: Vec<Term>,
        namespace: Box<Term>,
    },
    NewJumpError(String),
    AwaitedResult(Box<Term>),
}

/// Everything a term needs to resolve: the current task and the machine it
/// belongs to, for reference reads and `ITask`/`IsTerminated` lookups.
pub struct EvalCtx<'a> {
    pub builtins: &'a Builtins,
    pub task: Value,
    pub machine: &'a MachineState,
}

impl Term {
    pub fn evaluate(&self, universe: &mut Universe, ctx: &EvalCtx) -> SpekResult<Value> {
        match self {
            Term::CInt(i) => Ok(Value::Int(*i)),
            Term::CFloat(f) => Ok(Value::Float(*f)),
            Term::CBool(b) => Ok(Value::Bool(*b)),
            Term::CNone => Ok(Value::None),
            Term::CString(s) => Ok(universe.alloc(ValueData::Str(s.clone()))),
            Term::CType(t) => Ok(*t),
            Term::TRef(r) => Ok(*r),
            Term::AbsoluteFrameRef(task_id, frame_offset, slot_index) => {
                Ok(universe.intern_absolute_frame(*task_id, *frame_offset, *slot_index))
            }
            Term::Read(r) => {
                let reference = r.evaluate(universe, ctx)?;
                reference::read(universe, reference, ctx.task, ctx.machine)
            }
            Term::Project(tuple, index) => {
                let t = tuple.evaluate(universe, ctx)?;
                let i = index.evaluate(universe, ctx)?;
                project(universe, t, i)
            }
            Term::Lookup(ns, name) => {
                let namespace = ns.evaluate(universe, ctx)?;
                let name_val = name.evaluate(universe, ctx)?;
                let name_str = as_str(universe, name_val)?;
                Ok(universe.alloc(ValueData::Reference(ReferenceData::Name {
                    namespace,
                    name: name_str,
                })))
            }
            Term::LoadAttrCase(value, name) => {
                let v = value.evaluate(universe, ctx)?;
                let (is_property_getter, result) = load_attr_case(universe, v, name)?;
                Ok(universe.alloc(ValueData::Tuple(vec![Value::Bool(is_property_getter), result])))
            }
            Term::StoreAttrCase(value, name) => {
                let v = value.evaluate(universe, ctx)?;
                store_attr_case(universe, ctx.builtins, v, name)
            }
            Term::Unary(op, inner) => {
                let v = inner.evaluate(universe, ctx)?;
                eval_unary(universe, *op, v)
            }
            Term::Arithmetic(op, lhs, rhs) => {
                let a = lhs.evaluate(universe, ctx)?;
                let b = rhs.evaluate(universe, ctx)?;
                eval_arithmetic(*op, a, b)
            }
            Term::Boolean(op, lhs, rhs) => {
                let a = lhs.evaluate(universe, ctx)?;
                let truth_a = truthy(universe, a)?;
                match (*op, truth_a) {
                    (BoolOp::And, false) => Ok(Value::Bool(false)),
                    (BoolOp::Or, true) => Ok(Value::Bool(true)),
                    _ => {
                        let b = rhs.evaluate(universe, ctx)?;
                        Ok(Value::Bool(truthy(universe, b)?))
                    }
                }
            }
            Term::Comparison(op, lhs, rhs) => {
                let a = lhs.evaluate(universe, ctx)?;
                let b = rhs.evaluate(universe, ctx)?;
                eval_comparison(universe, *op, a, b)
            }
            Term::IsCallable(inner) => {
                let v = inner.evaluate(universe, ctx)?;
                Ok(Value::Bool(matches!(
                    universe.get(v),
                    Some(ValueData::Procedure(_)) | Some(ValueData::Type(_))
                )))
            }
            Term::IsException(inner) => {
                let v = inner.evaluate(universe, ctx)?;
                Ok(Value::Bool(matches!(universe.get(v), Some(ValueData::Compound { .. }))))
            }
            Term::IsTerminated(inner) => {
                let v = inner.evaluate(universe, ctx)?;
                Ok(Value::Bool(is_terminated(universe, v)))
            }
            Term::New(ty, args) => {
                let type_val = ty.evaluate(universe, ctx)?;
                let arg_vals = eval_all(universe, ctx, args)?;
                construct_trivial(universe, type_val, &arg_vals)
            }
            Term::Callable(inner) => {
                let v = inner.evaluate(universe, ctx)?;
                match universe.get(v) {
                    Some(ValueData::Type(_)) => {
                        Ok(universe.alloc(ValueData::Procedure(ProcedureData::Constructor { ty: v })))
                    }
                    _ => Ok(v),
                }
            }
            Term::ITask(symbol) => ctx
                .machine
                .interaction_task(universe, *symbol)
                .ok_or_else(|| SpekError::reference_error("no interaction task for symbol")),
            Term::IsInstance(value, ty) => {
                let v = value.evaluate(universe, ctx)?;
                let t = ty.evaluate(universe, ctx)?;
                let vtype = value_type(universe, v, ctx.builtins)?;
                Ok(Value::Bool(spek_core::subtypeof(universe, vtype, t)?))
            }
            Term::NewTuple(items) => {
                let vals = eval_all(universe, ctx, items)?;
                Ok(universe.alloc(ValueData::Tuple(vals)))
            }
            Term::NewList(items) => {
                let vals = eval_all(universe, ctx, items)?;
                Ok(universe.alloc(ValueData::List {
                    items: vals,
                    mutation_token: 0,
                }))
            }
            Term::NewDict(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    entries.push((k.evaluate(universe, ctx)?, v.evaluate(universe, ctx)?));
                }
                Ok(universe.alloc(ValueData::Dict {
                    entries,
                    mutation_token: 0,
                }))
            }
            Term::NewNamespace(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (name, v) in pairs {
                    entries.push((name.clone(), v.evaluate(universe, ctx)?));
                }
                Ok(universe.alloc(ValueData::Namespace(entries)))
            }
            Term::NewCell(inner) => {
                let v = inner.evaluate(universe, ctx)?;
                Ok(universe.alloc(ValueData::Cell(v)))
            }
            Term::NewProperty(getter, setter) => {
                let g = getter.evaluate(universe, ctx)?;
                let s = match setter {
                    Some(s) => Some(s.evaluate(universe, ctx)?),
                    None => None,
                };
                Ok(universe.alloc(ValueData::Property(PropertyData { getter: g, setter: s })))
            }
            Term::NewProcedure { num_args, entry } => {
                let entry_val = entry.evaluate(universe, ctx)?;
                Ok(universe.alloc(ValueData::Procedure(ProcedureData::Stack {
                    num_args: *num_args,
                    entry: entry_val,
                })))
            }
            Term::NewClass { name, supers, namespace } => {
                let bases = eval_all(universe, ctx, supers)?;
                let ns = namespace.evaluate(universe, ctx)?;
                // A namespace entry bound to `none` declares a field (fields
                // carry no value or body); declaration order fixes each
                // field's position among this type's own direct fields.
                // Everything else is a property if it evaluated to one, or
                // a method otherwise.
                let mut members = Vec::new();
                let mut next_field = 0usize;
                if let Some(ValueData::Namespace(entries)) = universe.get(ns) {
                    for (n, v) in entries {
                        let member = match v {
                            Value::None => {
                                let index = next_field;
                                next_field += 1;
                                Member::Field(index)
                            }
                            _ => match universe.get(*v) {
                                Some(ValueData::Property(_)) => Member::Property(*v),
                                _ => Member::Procedure(*v),
                            },
                        };
                        members.push((n.clone(), member));
                    }
                }
                let mut ty = spek_core::TypeData::new(name.clone(), bases);
                ty.members = members;
                let ty_val = universe.alloc(ValueData::Type(ty));
                let (field_bases, field_count) = spek_core::field_layout(universe, ty_val)?;
                if let ValueData::Type(data) = universe.get_mut(ty_val)? {
                    data.field_bases = field_bases;
                    data.field_count = field_count;
                }
                Ok(ty_val)
            }
            Term::NewJumpError(kind) => {
                let ty = ctx.builtins.exception_type("JumpError");
                let msg = universe.alloc(ValueData::Str(kind.clone()));
                Ok(universe.alloc(ValueData::Compound { ty, fields: vec![msg] }))
            }
            Term::AwaitedResult(awaitable) => {
                let v = awaitable.evaluate(universe, ctx)?;
                awaited_result(universe, v)
            }
        }
    }
}

fn eval_all(universe: &mut Universe, ctx: &EvalCtx, terms: &[Term]) -> SpekResult<Vec<Value>> {
    terms.iter().map(|t| t.evaluate(universe, ctx)).collect()
}

fn as_str(universe: &Universe, v: Value) -> SpekResult<String> {
    match universe.get(v) {
        Some(ValueData::Str(s)) => Ok(s.clone()),
        _ => Err(SpekError::type_error("expected a string value")),
    }
}

fn project(universe: &Universe, tuple: Value, index: Value) -> SpekResult<Value> {
    let i = match index {
        Value::Int(i) => i,
        _ => return Err(SpekError::type_error("tuple projection index must be an int")),
    };
    match universe.get(tuple) {
        Some(ValueData::Tuple(items)) => items
            .get(i as usize)
            .copied()
            .ok_or_else(|| SpekError::index_error("tuple index out of range")),
        _ => Err(SpekError::type_error("not a tuple value")),
    }
}

fn truthy(universe: &Universe, v: Value) -> SpekResult<bool> {
    Ok(match v {
        Value::Bool(b) => b,
        Value::None => false,
        Value::Int(i) => i != 0,
        Value::Float(f) => f != 0.0,
        Value::Handle(_) => match universe.get(v) {
            Some(ValueData::Str(s)) => !s.is_empty(),
            Some(ValueData::Tuple(items)) | Some(ValueData::List { items, .. }) => !items.is_empty(),
            _ => true,
        },
    })
}

fn eval_unary(universe: &mut Universe, op: UnaryOp, v: Value) -> SpekResult<Value> {
    match (op, v) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!truthy(universe, v)?)),
        (UnaryOp::Minus, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(SpekError::type_error("unsupported operand type for unary operator")),
    }
}

fn eval_arithmetic(op: ArithOp, a: Value, b: Value) -> SpekResult<Value> {
    use ArithOp::*;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match op {
            Add => Ok(Value::Int(x + y)),
            Sub => Ok(Value::Int(x - y)),
            Mul => Ok(Value::Int(x * y)),
            Div => Ok(Value::Float(x as f64 / y as f64)),
            FloorDiv => checked_int(x, y, |x, y| x.div_euclid(y)),
            Mod => checked_int(x, y, |x, y| x.rem_euclid(y)),
            Pow => Ok(Value::Int(x.pow(y as u32))),
        },
        _ => {
            let (x, y) = as_floats(a, b)?;
            match op {
                Add => Ok(Value::Float(x + y)),
                Sub => Ok(Value::Float(x - y)),
                Mul => Ok(Value::Float(x * y)),
                Div => Ok(Value::Float(x / y)),
                FloorDiv => Ok(Value::Float((x / y).floor())),
                Mod => Ok(Value::Float(x.rem_euclid(y))),
                Pow => Ok(Value::Float(x.powf(y))),
            }
        }
    }
}

fn checked_int(x: i64, y: i64, f: impl Fn(i64, i64) -> i64) -> SpekResult<Value> {
    if y == 0 {
        return Err(SpekError::runtime_error("division by zero"));
    }
    Ok(Value::Int(f(x, y)))
}

fn as_floats(a: Value, b: Value) -> SpekResult<(f64, f64)> {
    let to_f = |v: Value| match v {
        Value::Int(i) => Ok(i as f64),
        Value::Float(f) => Ok(f),
        _ => Err(SpekError::type_error("unsupported operand type for arithmetic operator")),
    };
    Ok((to_f(a)?, to_f(b)?))
}

fn eval_comparison(universe: &Universe, op: CmpOp, a: Value, b: Value) -> SpekResult<Value> {
    use CmpOp::*;
    let result = match op {
        Eq => universe.cequals(a, b),
        Ne => !universe.cequals(a, b),
        Is => matches!((a, b), (Value::Handle(x), Value::Handle(y)) if x == y) || universe.equals(a, b),
        IsNot => {
            !(matches!((a, b), (Value::Handle(x), Value::Handle(y)) if x == y) || universe.equals(a, b))
        }
        Lt | Le | Gt | Ge => {
            let (x, y) = as_floats(a, b)?;
            match op {
                Lt => x < y,
                Le => x <= y,
                Gt => x > y,
                Ge => x >= y,
                _ => unreachable!(),
            }
        }
        In | NotIn => {
            let found = match universe.get(b) {
                Some(ValueData::Tuple(items)) | Some(ValueData::List { items, .. }) => {
                    items.iter().any(|i| universe.cequals(*i, a))
                }
                Some(ValueData::Dict { entries, .. }) => entries.iter().any(|(k, _)| universe.cequals(*k, a)),
                _ => return Err(SpekError::type_error("right operand does not support 'in'")),
            };
            if op == In { found } else { !found }
        }
    };
    Ok(Value::Bool(result))
}

fn is_terminated(universe: &Universe, v: Value) -> bool {
    match universe.get(v) {
        Some(ValueData::TaskState(t)) => {
            matches!(t.status(), TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
        }
        Some(ValueData::Future(f)) => f.status != spek_core::FutureStatus::Unset,
        _ => false,
    }
}

fn awaited_result(universe: &Universe, v: Value) -> SpekResult<Value> {
    match universe.get(v) {
        Some(ValueData::Future(FutureData { status, result })) => match status {
            spek_core::FutureStatus::Set => Ok(*result),
            spek_core::FutureStatus::Failed => Err(SpekError::runtime_error("awaited future failed")),
            spek_core::FutureStatus::Cancelled => Err(SpekError::cancellation(false, "future was cancelled")),
            spek_core::FutureStatus::Unset => Err(SpekError::future_error("future has no result yet")),
        },
        Some(ValueData::TaskState(TaskStateData::Stack { status, returned, exception, .. })) => {
            match status {
                TaskStatus::Completed => Ok(*returned),
                TaskStatus::Failed => Err(SpekError::runtime_error(format!(
                    "awaited task failed (exception handle present: {})",
                    !exception.is_none()
                ))),
                TaskStatus::Cancelled => Err(SpekError::cancellation(false, "awaited task was cancelled")),
                _ => Err(SpekError::runtime_error("awaited task has not terminated")),
            }
        }
        _ => Err(SpekError::type_error("value is not awaitable")),
    }
}

fn value_type(universe: &Universe, v: Value, builtins: &Builtins) -> SpekResult<Value> {
    Ok(match v {
        Value::None => builtins.types["none"],
        Value::Bool(_) => builtins.types["bool"],
        Value::Int(_) => builtins.types["int"],
        Value::Float(_) => builtins.types["float"],
        Value::Handle(_) => match universe.get(v) {
            Some(ValueData::Str(_)) => builtins.types["str"],
            Some(ValueData::Range { .. }) => builtins.types["range"],
            Some(ValueData::Compound { ty, .. }) => *ty,
            Some(ValueData::Type(_)) => builtins.types["type"],
            _ => builtins.types["object"],
        },
    })
}

/// Allocates via a type's constructor for the subset of construction `New`
/// can perform purely: a type with no `__init__` anywhere in its MRO simply
/// becomes a zeroed `Compound`. A type that declares `__init__` needs a real
/// call (it may suspend, which a pure term evaluation never does), so it
/// must instead be constructed by calling the type — `Callable`'s shim,
/// reached through `Push`/`Launch`, handles that case in full.
fn construct_trivial(universe: &mut Universe, ty: Value, args: &[Value]) -> SpekResult<Value> {
    let field_count = match universe.get(ty) {
        Some(ValueData::Type(data)) => data.field_count,
        _ => return Err(SpekError::type_error("New requires a type value")),
    };
    let has_init = spek_core::mro(universe, ty)?.into_iter().any(|t| {
        matches!(
            universe.get(t),
            Some(ValueData::Type(data)) if matches!(data.member("__init__"), Some(Member::Procedure(_)))
        )
    });
    if has_init {
        return Err(SpekError::instruction_error(
            "constructing a type with __init__ requires a call (Push/Launch), not New",
        ));
    }
    if !args.is_empty() {
        return Err(SpekError::type_error("type takes no constructor arguments"));
    }
    Ok(universe.alloc(ValueData::Compound {
        ty,
        fields: vec![Value::None; field_count],
    }))
}

fn compound_type(universe: &Universe, value: Value) -> SpekResult<Value> {
    match universe.get(value) {
        Some(ValueData::Compound { ty, .. }) => Ok(*ty),
        _ => Err(SpekError::attribute_error("value has no attributes")),
    }
}

/// Absolute field offset for a field declared locally at `local_index` on
/// `owner`, one of `ty`'s supertypes, using `ty`'s own cached field layout.
fn field_offset(universe: &Universe, ty: Value, owner: Value, local_index: usize) -> SpekResult<usize> {
    match universe.get(ty) {
        Some(ValueData::Type(data)) => data
            .field_bases
            .iter()
            .find(|(t, _)| *t == owner)
            .map(|(_, base)| base + local_index)
            .ok_or_else(|| SpekError::attribute_error("field owner is not in this type's field layout")),
        _ => Err(SpekError::type_error("expected a type value")),
    }
}

fn read_field(universe: &Universe, value: Value, offset: usize) -> SpekResult<Value> {
    match universe.get(value) {
        Some(ValueData::Compound { fields, .. }) => fields
            .get(offset)
            .copied()
            .ok_or_else(|| SpekError::attribute_error("field offset out of range")),
        _ => Err(SpekError::type_error("expected a compound value")),
    }
}

fn attribute_exception(universe: &mut Universe, builtins: &Builtins, message: impl Into<String>) -> Value {
    let ty = builtins.exception_type("AttributeError");
    spek_core::pack_exception(universe, ty, &SpekError::attribute_error(message))
}

/// `(is_property_getter, value)`: for a field, the field's own value; for a
/// property, `self` bound into the getter as a `BoundProcedure`, with
/// `is_property_getter` set so the caller knows to invoke rather than use it
/// directly; for a plain method, the unbound method value.
fn load_attr_case(universe: &mut Universe, value: Value, name: &str) -> SpekResult<(bool, Value)> {
    let ty = compound_type(universe, value)?;
    for t in spek_core::mro(universe, ty)? {
        let member = match universe.get(t) {
            Some(ValueData::Type(data)) => data.member(name).cloned(),
            _ => None,
        };
        let Some(member) = member else { continue };
        return match member {
            Member::Procedure(p) => Ok((false, p)),
            Member::Property(p) => {
                let getter = match universe.get(p) {
                    Some(ValueData::Property(prop)) => prop.getter,
                    _ => return Err(SpekError::type_error("property value is malformed")),
                };
                let bound = universe.alloc(ValueData::Procedure(ProcedureData::Bound {
                    inner: getter,
                    args: vec![Some(value)],
                }));
                Ok((true, bound))
            }
            Member::Field(index) => {
                let offset = field_offset(universe, ty, t, index)?;
                Ok((false, read_field(universe, value, offset)?))
            }
        };
    }
    Err(SpekError::attribute_error(format!("no attribute '{name}'")))
}

/// A writable reference for a field, a bound setter procedure for a property
/// that has one, or a pre-constructed exception value for anything else
/// (no such attribute, a property with no setter, or a plain method).
fn store_attr_case(universe: &mut Universe, builtins: &Builtins, value: Value, name: &str) -> SpekResult<Value> {
    let ty = match compound_type(universe, value) {
        Ok(ty) => ty,
        Err(_) => return Ok(attribute_exception(universe, builtins, format!("no attribute '{name}'"))),
    };
    for t in spek_core::mro(universe, ty)? {
        let member = match universe.get(t) {
            Some(ValueData::Type(data)) => data.member(name).cloned(),
            _ => None,
        };
        let Some(member) = member else { continue };
        return match member {
            Member::Field(index) => {
                let offset = field_offset(universe, ty, t, index)?;
                Ok(universe.alloc(ValueData::Reference(ReferenceData::Field {
                    compound: value,
                    field_index: offset,
                })))
            }
            Member::Property(p) => {
                let setter = match universe.get(p) {
                    Some(ValueData::Property(prop)) => prop.setter,
                    _ => return Err(SpekError::type_error("property value is malformed")),
                };
                match setter {
                    Some(setter) => Ok(universe.alloc(ValueData::Procedure(ProcedureData::Bound {
                        inner: setter,
                        args: vec![Some(value)],
                    }))),
                    None => Ok(attribute_exception(universe, builtins, format!("attribute '{name}' has no setter"))),
                }
            }
            Member::Procedure(_) => {
                Ok(attribute_exception(universe, builtins, format!("attribute '{name}' is not writable")))
            }
        };
    }
    Ok(attribute_exception(universe, builtins, format!("no attribute '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_core::bootstrap;

    fn ctx<'a>(builtins: &'a Builtins, task: Value, machine: &'a MachineState) -> EvalCtx<'a> {
        EvalCtx { builtins, task, machine }
    }

    #[test]
    fn arithmetic_promotes_to_float_on_mixed_operands() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let task = u.alloc(ValueData::TaskState(TaskStateData::Stack {
            status: TaskStatus::Running,
            stack: vec![],
            exception: Value::None,
            returned: Value::None,
        }));
        let machine = MachineState::new(vec![task]);
        let c = ctx(&b, task, &machine);
        let term = Term::Arithmetic(
            ArithOp::Add,
            Box::new(Term::CInt(1)),
            Box::new(Term::CFloat(0.5)),
        );
        assert_eq!(term.evaluate(&mut u, &c).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn boolean_and_short_circuits() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let task = u.alloc(ValueData::TaskState(TaskStateData::Stack {
            status: TaskStatus::Running,
            stack: vec![],
            exception: Value::None,
            returned: Value::None,
        }));
        let machine = MachineState::new(vec![task]);
        let c = ctx(&b, task, &machine);
        // The right operand raises if evaluated; short-circuit must avoid that.
        let term = Term::Boolean(
            BoolOp::And,
            Box::new(Term::CBool(false)),
            Box::new(Term::Arithmetic(ArithOp::Div, Box::new(Term::CInt(1)), Box::new(Term::CInt(0)))),
        );
        assert_eq!(term.evaluate(&mut u, &c).unwrap(), Value::Bool(false));
    }

    #[test]
    fn comparison_cequals_crosses_int_float() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let task = u.alloc(ValueData::TaskState(TaskStateData::Stack {
            status: TaskStatus::Running,
            stack: vec![],
            exception: Value::None,
            returned: Value::None,
        }));
        let machine = MachineState::new(vec![task]);
        let c = ctx(&b, task, &machine);
        let term = Term::Comparison(CmpOp::Eq, Box::new(Term::CInt(1)), Box::new(Term::CFloat(1.0)));
        assert_eq!(term.evaluate(&mut u, &c).unwrap(), Value::Bool(true));
    }

    fn point_instance(u: &mut Universe, b: &Builtins) -> (Value, Value) {
        let mut data = spek_core::TypeData::new("Point", vec![b.types["object"]]);
        data.members.push(("x".to_string(), Member::Field(0)));
        let ty = u.alloc(ValueData::Type(data));
        let (field_bases, field_count) = spek_core::field_layout(u, ty).unwrap();
        if let ValueData::Type(d) = u.get_mut(ty).unwrap() {
            d.field_bases = field_bases;
            d.field_count = field_count;
        }
        let instance = u.alloc(ValueData::Compound {
            ty,
            fields: vec![Value::Int(5)],
        });
        (ty, instance)
    }

    #[test]
    fn load_attr_case_reads_a_field_through_its_offset() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let (_, instance) = point_instance(&mut u, &b);
        let (is_getter, value) = load_attr_case(&mut u, instance, "x").unwrap();
        assert!(!is_getter);
        assert_eq!(value, Value::Int(5));
    }

    #[test]
    fn store_attr_case_yields_a_writable_field_reference() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let (_, instance) = point_instance(&mut u, &b);
        let r = store_attr_case(&mut u, &b, instance, "x").unwrap();
        assert!(matches!(
            u.get(r),
            Some(ValueData::Reference(ReferenceData::Field { field_index: 0, .. }))
        ));
    }

    #[test]
    fn store_attr_case_on_missing_attribute_yields_an_exception_value_not_an_error() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let (_, instance) = point_instance(&mut u, &b);
        let result = store_attr_case(&mut u, &b, instance, "nope").unwrap();
        assert!(matches!(u.get(result), Some(ValueData::Compound { .. })));
    }

    #[test]
    fn load_attr_case_binds_self_into_a_property_getter() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let getter = u.alloc(ValueData::Procedure(ProcedureData::Intrinsic { name: "getter".to_string() }));
        let prop = u.alloc(ValueData::Property(PropertyData { getter, setter: None }));
        let mut data = spek_core::TypeData::new("Widget", vec![b.types["object"]]);
        data.members.push(("value".to_string(), Member::Property(prop)));
        let ty = u.alloc(ValueData::Type(data));
        let instance = u.alloc(ValueData::Compound { ty, fields: vec![] });

        let (is_getter, bound) = load_attr_case(&mut u, instance, "value").unwrap();
        assert!(is_getter);
        match u.get(bound) {
            Some(ValueData::Procedure(ProcedureData::Bound { inner, args })) => {
                assert_eq!(*inner, getter);
                assert_eq!(args.as_slice(), &[Some(instance)]);
            }
            _ => panic!("expected a bound procedure"),
        }
    }
}
