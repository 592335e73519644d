//! Procedure forms: stack procedures, intrinsic (host-callable) procedures,
//! and bound procedures. `initiate` is the single entry point `Push`/
//! `Launch` call; it never runs a stack procedure's body itself — that is
//! the job of the task's instruction loop once the new frame is on a
//! stack.

use std::collections::HashMap;

use spek_core::{Builtins, FrameData, ProcedureData, SpekError, SpekResult, Universe, Value, ValueData};

/// A host-language callable registered under a stable name, looked up by
/// [`IntrinsicRegistry`]. Runs to completion atomically, as the component
/// design requires.
pub type IntrinsicFn = fn(&mut Universe, &Builtins, &[Value]) -> SpekResult<Value>;

#[derive(Default)]
pub struct IntrinsicRegistry {
    functions: HashMap<String, IntrinsicFn>,
}

impl IntrinsicRegistry {
    pub fn register(&mut self, name: impl Into<String>, f: IntrinsicFn) {
        self.functions.insert(name.into(), f);
    }

    pub fn get(&self, name: &str) -> Option<IntrinsicFn> {
        self.functions.get(name).copied()
    }
}

/// The result of `initiate`: either a fresh frame the caller must push
/// (onto its own stack for `Push`, onto a brand-new task for `Launch`), or
/// an immediately-available result for an intrinsic call.
pub enum Initiate {
    PushFrame(Value),
    Immediate(Value),
}

pub fn initiate(
    universe: &mut Universe,
    builtins: &Builtins,
    registry: &IntrinsicRegistry,
    procedure: Value,
    args: &[Value],
) -> SpekResult<Initiate> {
    let data = match universe.get(procedure) {
        Some(ValueData::Procedure(p)) => p.clone(),
        // A bare type value is directly callable: calling it constructs an
        // instance, same as calling the shim `Callable` would synthesise.
        Some(ValueData::Type(_)) => ProcedureData::Constructor { ty: procedure },
        _ => return Err(SpekError::type_error("value is not callable")),
    };
    match data {
        ProcedureData::Stack { num_args, entry } => {
            if args.len() != num_args {
                return Err(SpekError::type_error(format!(
                    "expected {num_args} arguments, got {}",
                    args.len()
                )));
            }
            let frame = universe.alloc(ValueData::Frame(FrameData {
                location: entry,
                locals: args.to_vec(),
            }));
            Ok(Initiate::PushFrame(frame))
        }
        ProcedureData::Intrinsic { name } => {
            let f = registry
                .get(&name)
                .ok_or_else(|| SpekError::attribute_error(format!("unregistered intrinsic '{name}'")))?;
            Ok(Initiate::Immediate(f(universe, builtins, args)?))
        }
        ProcedureData::Bound { inner, args: bound } => {
            let expected_holes = bound.iter().filter(|a| a.is_none()).count();
            if args.len() < expected_holes {
                return Err(SpekError::runtime_error(format!(
                    "expected at least {expected_holes} arguments, but got only {}",
                    args.len()
                )));
            }
            let mut provided = args.iter();
            let mut full: Vec<Value> = Vec::with_capacity(bound.len() + args.len());
            for slot in &bound {
                full.push(match slot {
                    Some(v) => *v,
                    None => *provided.next().expect("hole count checked above"),
                });
            }
            full.extend(provided.copied());
            initiate(universe, builtins, registry, inner, &full)
        }
        ProcedureData::Constructor { ty } => construct(universe, builtins, registry, ty, args),
    }
}

/// Allocates a zeroed `Compound` of `ty`, runs its `__init__` (if the MRO
/// declares one) against that instance plus `args`, and yields the instance
/// itself. An intrinsic `__init__` runs to completion here, so its return
/// value is simply discarded in favor of `self`. A stack-based `__init__`
/// is instead pushed like any other call — its body is responsible for
/// writing `self` (its own first argument) to the return slot before it
/// pops, since this function has already returned by the time that frame
/// completes and so cannot substitute the result itself.
fn construct(
    universe: &mut Universe,
    builtins: &Builtins,
    registry: &IntrinsicRegistry,
    ty: Value,
    args: &[Value],
) -> SpekResult<Initiate> {
    let field_count = match universe.get(ty) {
        Some(ValueData::Type(data)) => data.field_count,
        _ => return Err(SpekError::type_error("constructor shim targets a non-type value")),
    };
    let self_val = universe.alloc(ValueData::Compound {
        ty,
        fields: vec![Value::None; field_count],
    });

    let init = spek_core::mro(universe, ty)?.into_iter().find_map(|t| match universe.get(t) {
        Some(ValueData::Type(data)) => match data.member("__init__") {
            Some(spek_core::Member::Procedure(p)) => Some(*p),
            _ => None,
        },
        _ => None,
    });

    let Some(init_proc) = init else {
        return Ok(Initiate::Immediate(self_val));
    };

    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(self_val);
    full_args.extend_from_slice(args);

    match initiate(universe, builtins, registry, init_proc, &full_args)? {
        Initiate::Immediate(_) => Ok(Initiate::Immediate(self_val)),
        push_frame @ Initiate::PushFrame(_) => Ok(push_frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_core::bootstrap;

    fn dummy_intrinsic(_: &mut Universe, _: &Builtins, args: &[Value]) -> SpekResult<Value> {
        Ok(args.first().copied().unwrap_or(Value::None))
    }

    #[test]
    fn stack_procedure_checks_arg_count() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let entry = u.alloc(ValueData::ProgramLocation { program: 0, index: 0 });
        let proc = u.alloc(ValueData::Procedure(ProcedureData::Stack { num_args: 2, entry }));
        let registry = IntrinsicRegistry::default();
        assert!(initiate(&mut u, &b, &registry, proc, &[Value::Int(1)]).is_err());
        assert!(initiate(&mut u, &b, &registry, proc, &[Value::Int(1), Value::Int(2)]).is_ok());
    }

    #[test]
    fn bound_procedure_fills_holes_left_to_right() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let mut registry = IntrinsicRegistry::default();
        registry.register("identity_first", dummy_intrinsic);
        let inner = u.alloc(ValueData::Procedure(ProcedureData::Intrinsic {
            name: "identity_first".into(),
        }));
        let bound = u.alloc(ValueData::Procedure(ProcedureData::Bound {
            inner,
            args: vec![None, Some(Value::Int(99))],
        }));
        let result = initiate(&mut u, &b, &registry, bound, &[Value::Int(1)]).unwrap();
        match result {
            Initiate::Immediate(v) => assert_eq!(v, Value::Int(1)),
            _ => panic!("expected immediate result"),
        }
    }

    #[test]
    fn constructor_with_no_init_yields_a_zeroed_instance() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let ty = u.alloc(ValueData::Type(spek_core::TypeData::new("Point", vec![b.types["object"]])));
        let registry = IntrinsicRegistry::default();
        match initiate(&mut u, &b, &registry, ty, &[]).unwrap() {
            Initiate::Immediate(v) => {
                assert!(matches!(u.get(v), Some(ValueData::Compound { ty: t, fields }) if *t == ty && fields.is_empty()));
            }
            _ => panic!("expected an immediate result"),
        }
    }

    #[test]
    fn constructor_runs_intrinsic_init_but_returns_self() {
        fn set_marker(universe: &mut Universe, _: &Builtins, args: &[Value]) -> SpekResult<Value> {
            if let ValueData::Compound { fields, .. } = universe.get_mut(args[0])? {
                fields[0] = Value::Int(7);
            }
            Ok(Value::None)
        }

        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let mut registry = IntrinsicRegistry::default();
        registry.register("set_marker", set_marker);
        let init = u.alloc(ValueData::Procedure(ProcedureData::Intrinsic { name: "set_marker".into() }));
        let mut data = spek_core::TypeData::new("Marked", vec![b.types["object"]]);
        data.members.push(("__init__".to_string(), spek_core::Member::Procedure(init)));
        data.field_count = 1;
        let ty = u.alloc(ValueData::Type(data));

        match initiate(&mut u, &b, &registry, ty, &[]).unwrap() {
            Initiate::Immediate(v) => match u.get(v) {
                Some(ValueData::Compound { fields, .. }) => assert_eq!(fields[0], Value::Int(7)),
                _ => panic!("expected a compound instance"),
            },
            _ => panic!("expected an immediate result"),
        }
    }

    #[test]
    fn bound_procedure_rejects_too_few_arguments() {
        let mut u = Universe::new();
        let b = bootstrap(&mut u);
        let registry = IntrinsicRegistry::default();
        let inner = u.alloc(ValueData::Procedure(ProcedureData::Intrinsic { name: "x".into() }));
        let bound = u.alloc(ValueData::Procedure(ProcedureData::Bound {
            inner,
            args: vec![None, None],
        }));
        assert!(initiate(&mut u, &b, &registry, bound, &[Value::Int(1)]).is_err());
    }
}
