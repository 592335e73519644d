//! The instruction set: the only elements that may change machine state.
//! Every instruction checks for preemption by an *initial* cancellation on
//! entry before doing anything else.

use spek_core::{Builtins, SpekError, SpekResult, Universe, Value, ValueData, pack_exception};

use crate::machine::MachineState;
use crate::procedure::{self, IntrinsicRegistry, Initiate};
use crate::task::{self, top_frame};
use crate::term::{EvalCtx, Term};

/// `on_error == NO_HANDLER` means "no error handler; fail the task."
pub const NO_HANDLER: i64 = -1;

#[derive(Debug, Clone)]
pub enum Instruction {
    Update {
        reference: Term,
        value: Term,
        next: usize,
        on_error: i64,
    },
    Guard {
        branches: Vec<(Term, usize)>,
        on_error: i64,
    },
    Push {
        callee: Term,
        args: Vec<Term>,
        next: usize,
        on_error: i64,
    },
    Pop {
        on_error: i64,
    },
    Launch {
        callee: Term,
        args: Vec<Term>,
        next: usize,
        on_error: i64,
    },
}

/// An immutable sequence of instructions.
pub type StackProgram = Vec<Instruction>;

/// All compiled programs a machine's tasks can reference, indexed by the
/// `program` field of a `ProgramLocation` value.
#[derive(Default)]
pub struct ProgramTable {
    programs: Vec<StackProgram>,
}

impl ProgramTable {
    pub fn push(&mut self, program: StackProgram) -> u32 {
        self.programs.push(program);
        (self.programs.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Option<&StackProgram> {
        self.programs.get(id as usize)
    }

    pub fn location(&self, program: u32, index: usize) -> (u32, usize) {
        (program, index)
    }
}

/// True if the task's exception slot holds an *initial* `CancellationError`.
/// If so, downgrades it to non-initial in place — the preempt is one-shot.
fn preempt_cancellation(universe: &mut Universe, builtins: &Builtins, task: Value) -> SpekResult<bool> {
    let exception = match universe.get(task) {
        Some(ValueData::TaskState(spek_core::TaskStateData::Stack { exception, .. })) => *exception,
        _ => return Ok(false),
    };
    if exception.is_none() {
        return Ok(false);
    }
    let cancellation_ty = builtins.exception_type("CancellationError");
    let is_initial_cancellation = matches!(
        universe.get(exception),
        Some(ValueData::Compound { ty, fields })
            if same_type(*ty, cancellation_ty) && matches!(fields.first(), Some(Value::Bool(true)))
    );
    if !is_initial_cancellation {
        return Ok(false);
    }
    if let ValueData::Compound { fields, .. } = universe.get_mut(exception)? {
        fields[0] = Value::Bool(false);
    }
    Ok(true)
}

fn same_type(a: Value, b: Value) -> bool {
    matches!((a, b), (Value::Handle(x), Value::Handle(y)) if x == y)
}

fn rearm_cancellation(universe: &mut Universe, task: Value) -> SpekResult<()> {
    let exception = match universe.get(task) {
        Some(ValueData::TaskState(spek_core::TaskStateData::Stack { exception, .. })) => *exception,
        _ => return Ok(()),
    };
    if exception.is_none() {
        return Ok(());
    }
    if let ValueData::Compound { fields, .. } = universe.get_mut(exception)? {
        if let Some(first) = fields.first_mut() {
            *first = Value::Bool(true);
        }
    }
    Ok(())
}

fn advance(universe: &mut Universe, frame: Value, program: u32, index: usize) -> SpekResult<()> {
    let loc = universe.alloc(ValueData::ProgramLocation { program, index });
    match universe.get_mut(frame)? {
        ValueData::Frame(f) => {
            f.location = loc;
            Ok(())
        }
        _ => Err(SpekError::reference_error("not a frame value")),
    }
}

fn current_program_id(universe: &Universe, frame: Value) -> SpekResult<u32> {
    match universe.get(frame) {
        Some(ValueData::Frame(f)) => match universe.get(f.location) {
            Some(ValueData::ProgramLocation { program, .. }) => Ok(*program),
            _ => Err(SpekError::reference_error("frame location is not a program location")),
        },
        _ => Err(SpekError::reference_error("not a frame value")),
    }
}

fn route_error(
    universe: &mut Universe,
    builtins: &Builtins,
    frame: Value,
    program: u32,
    task: Value,
    on_error: i64,
    err: SpekError,
) -> SpekResult<()> {
    let ty = builtins.exception_type(err.kind_name());
    let exc = pack_exception(universe, ty, &err);
    task::set_status(universe, task, spek_core::TaskStatus::Running).ok();
    if let ValueData::TaskState(spek_core::TaskStateData::Stack { exception, .. }) = universe.get_mut(task)? {
        *exception = exc;
    }
    if on_error == NO_HANDLER {
        // No handler: the task fails when the enclosing run loop observes
        // a non-None exception at frame end. We still need the frame to
        // terminate, so pop it.
        if let ValueData::TaskState(spek_core::TaskStateData::Stack { stack, .. }) = universe.get_mut(task)? {
            stack.pop();
        }
        Ok(())
    } else {
        advance(universe, frame, program, on_error as usize)
    }
}

pub fn is_enabled(
    universe: &mut Universe,
    builtins: &Builtins,
    task: Value,
    machine: &MachineState,
    instr: &Instruction,
) -> SpekResult<bool> {
    if preempt_cancellation(universe, builtins, task)? {
        // `is_enabled` only peeks; `execute` re-checks and consumes the
        // marker, so re-arm it here rather than leaving it downgraded.
        rearm_cancellation(universe, task)?;
        return Ok(true);
    }
    match instr {
        Instruction::Guard { branches, .. } => {
            let _ = machine;
            let mut any_true = false;
            let mut any_err = false;
            for (cond, _) in branches {
                let ctx = EvalCtx {
                    builtins,
                    task,
                    machine,
                };
                match cond.evaluate(universe, &ctx) {
                    Ok(Value::Bool(true)) => any_true = true,
                    Ok(_) => {}
                    Err(_) => any_err = true,
                }
            }
            Ok(any_true || any_err)
        }
        _ => Ok(true),
    }
}

pub fn execute(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &Builtins,
    registry: &IntrinsicRegistry,
    task: Value,
    machine: &mut MachineState,
    instr: &Instruction,
) -> SpekResult<()> {
    let frame = top_frame(universe, task)?;
    let program = current_program_id(universe, frame)?;

    if preempt_cancellation(universe, builtins, task)? {
        let on_error = on_error_of(instr);
        return route_error(
            universe,
            builtins,
            frame,
            program,
            task,
            on_error,
            SpekError::cancellation(false, "cancellation preempted this instruction"),
        );
    }

    match instr {
        Instruction::Update {
            reference,
            value,
            next,
            on_error,
        } => {
            let ctx = EvalCtx { builtins, task, machine };
            let result = (|| -> SpekResult<()> {
                let r = reference.evaluate(universe, &ctx)?;
                let v = value.evaluate(universe, &ctx)?;
                crate::reference::write(universe, r, v, task, machine)
            })();
            match result {
                Ok(()) => advance(universe, frame, program, *next),
                Err(e) => route_error(universe, builtins, frame, program, task, *on_error, e),
            }
        }
        Instruction::Guard { branches, on_error } => {
            let ctx = EvalCtx { builtins, task, machine };
            let mut matched = None;
            let mut true_count = 0;
            let mut eval_err = None;
            for (cond, next) in branches {
                match cond.evaluate(universe, &ctx) {
                    Ok(Value::Bool(true)) => {
                        true_count += 1;
                        if matched.is_none() {
                            matched = Some(*next);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => eval_err = Some(e),
                }
            }
            if let Some(e) = eval_err {
                return route_error(universe, builtins, frame, program, task, *on_error, e);
            }
            if true_count > 1 {
                return route_error(
                    universe,
                    builtins,
                    frame,
                    program,
                    task,
                    *on_error,
                    SpekError::instruction_error("More than one guard true"),
                );
            }
            match matched {
                Some(next) => advance(universe, frame, program, next),
                None => Err(SpekError::instruction_error("Guard executed while not enabled")),
            }
        }
        Instruction::Push {
            callee,
            args,
            next,
            on_error,
        } => {
            let ctx = EvalCtx { builtins, task, machine };
            let result = (|| -> SpekResult<Initiate> {
                let proc = callee.evaluate(universe, &ctx)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(a.evaluate(universe, &ctx)?);
                }
                procedure::initiate(universe, builtins, registry, proc, &arg_vals)
            })();
            match result {
                Ok(Initiate::PushFrame(new_frame)) => {
                    advance(universe, frame, program, *next)?;
                    if let ValueData::TaskState(spek_core::TaskStateData::Stack { stack, .. }) =
                        universe.get_mut(task)?
                    {
                        stack.push(new_frame);
                    }
                    Ok(())
                }
                Ok(Initiate::Immediate(result_val)) => {
                    set_returned(universe, task, result_val)?;
                    advance(universe, frame, program, *next)
                }
                Err(e) => route_error(universe, builtins, frame, program, task, *on_error, e),
            }
        }
        Instruction::Pop { on_error } => {
            let popped = {
                if let ValueData::TaskState(spek_core::TaskStateData::Stack { stack, .. }) =
                    universe.get_mut(task)?
                {
                    stack.pop()
                } else {
                    None
                }
            };
            match popped {
                Some(_) => Ok(()),
                None => route_error(
                    universe,
                    builtins,
                    frame,
                    program,
                    task,
                    *on_error,
                    SpekError::instruction_error("Pop on an empty stack"),
                ),
            }
        }
        Instruction::Launch {
            callee,
            args,
            next,
            on_error,
        } => {
            let ctx = EvalCtx { builtins, task, machine };
            let result = (|| -> SpekResult<Initiate> {
                let proc = callee.evaluate(universe, &ctx)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(a.evaluate(universe, &ctx)?);
                }
                procedure::initiate(universe, builtins, registry, proc, &arg_vals)
            })();
            match result {
                Ok(Initiate::PushFrame(new_frame)) => {
                    let new_task = universe.alloc(ValueData::TaskState(spek_core::TaskStateData::Stack {
                        status: spek_core::TaskStatus::Waiting,
                        stack: vec![new_frame],
                        exception: Value::None,
                        returned: Value::None,
                    }));
                    machine.add_task(new_task);
                    set_returned(universe, task, new_task)?;
                    advance(universe, frame, program, *next)
                }
                Ok(Initiate::Immediate(result_val)) => {
                    set_returned(universe, task, result_val)?;
                    advance(universe, frame, program, *next)
                }
                Err(e) => route_error(universe, builtins, frame, program, task, *on_error, e),
            }
        }
    }
}

fn set_returned(universe: &mut Universe, task: Value, value: Value) -> SpekResult<()> {
    if let ValueData::TaskState(spek_core::TaskStateData::Stack { returned, .. }) = universe.get_mut(task)? {
        *returned = value;
    }
    Ok(())
}

fn on_error_of(instr: &Instruction) -> i64 {
    match instr {
        Instruction::Update { on_error, .. }
        | Instruction::Guard { on_error, .. }
        | Instruction::Push { on_error, .. }
        | Instruction::Pop { on_error }
        | Instruction::Launch { on_error, .. } => *on_error,
    }
}
