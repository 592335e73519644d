//! Task state: the `StackState`/`InteractionState` run loop, and the
//! cancellation machinery instructions preempt against.

use spek_core::{FrameData, SpekError, SpekResult, TaskStateData, TaskStatus, Universe, Value, ValueData};

use crate::instruction::{self, ProgramTable};
use crate::machine::MachineState;
use crate::procedure::IntrinsicRegistry;

/// The current task's top-of-stack frame, or an error if the task has no
/// frames (an empty stack is handled by the run loop, not by reads).
pub fn top_frame(universe: &Universe, task: Value) -> SpekResult<Value> {
    match universe.get(task) {
        Some(ValueData::TaskState(TaskStateData::Stack { stack, .. })) => stack
            .last()
            .copied()
            .ok_or_else(|| SpekError::reference_error("task has an empty stack")),
        _ => Err(SpekError::reference_error("not a stack task")),
    }
}

fn program_location(universe: &Universe, frame: Value) -> SpekResult<(u32, usize)> {
    match universe.get(frame) {
        Some(ValueData::Frame(FrameData { location, .. })) => match universe.get(*location) {
            Some(ValueData::ProgramLocation { program, index }) => Ok((*program, *index)),
            _ => Err(SpekError::reference_error("frame location is not a program location")),
        },
        _ => Err(SpekError::reference_error("not a frame value")),
    }
}

/// Whether a task is eligible to be scheduled. A stack task is enabled when
/// its stack is non-empty and its top frame's current instruction is
/// enabled; an interaction task is enabled while `WAITING`, except `NEVER`,
/// which is never enabled (it fires only if explicitly cancelled by
/// `await`, never by the scheduler).
pub fn enabled(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &spek_core::Builtins,
    task: Value,
    machine: &MachineState,
) -> SpekResult<bool> {
    match universe.get(task) {
        Some(ValueData::TaskState(TaskStateData::Interaction { symbol, status })) => {
            return Ok(*status == TaskStatus::Waiting && *symbol != spek_core::InteractionSymbol::Never);
        }
        Some(ValueData::TaskState(TaskStateData::Stack { .. })) => {}
        _ => return Err(SpekError::reference_error("not a task state value")),
    }
    let frame = match top_frame(universe, task) {
        Ok(f) => f,
        Err(_) => return Ok(false),
    };
    let (program_id, index) = program_location(universe, frame)?;
    let instr = programs
        .get(program_id)
        .and_then(|p| p.get(index))
        .ok_or_else(|| SpekError::instruction_error("program counter out of range"))?
        .clone();
    instruction::is_enabled(universe, builtins, task, machine, &instr)
}

/// Runs instructions of `task` while each remains enabled; marks the task
/// `WAITING` when it stalls, or `COMPLETED`/`FAILED` when its stack empties.
pub fn run(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &spek_core::Builtins,
    registry: &IntrinsicRegistry,
    task: Value,
    machine: &mut MachineState,
) -> SpekResult<()> {
    loop {
        if matches!(top_frame(universe, task), Err(_)) {
            finish_task(universe, builtins, task)?;
            return Ok(());
        }
        if !enabled(universe, programs, builtins, task, machine)? {
            set_status(universe, task, TaskStatus::Waiting)?;
            return Ok(());
        }
        set_status(universe, task, TaskStatus::Running)?;
        let frame = top_frame(universe, task)?;
        let (program_id, index) = program_location(universe, frame)?;
        let instr = programs
            .get(program_id)
            .and_then(|p| p.get(index))
            .ok_or_else(|| SpekError::instruction_error("program counter out of range"))?
            .clone();
        instruction::execute(universe, programs, builtins, registry, task, machine, &instr)?;
        if matches!(top_frame(universe, task), Err(_)) {
            finish_task(universe, builtins, task)?;
            return Ok(());
        }
    }
}

fn finish_task(universe: &mut Universe, builtins: &spek_core::Builtins, task: Value) -> SpekResult<()> {
    let failed = match universe.get(task) {
        Some(ValueData::TaskState(TaskStateData::Stack { exception, .. })) => !exception.is_none(),
        _ => false,
    };
    let _ = builtins;
    set_status(
        universe,
        task,
        if failed { TaskStatus::Failed } else { TaskStatus::Completed },
    )
}

pub fn set_status(universe: &mut Universe, task: Value, status: TaskStatus) -> SpekResult<()> {
    match universe.get_mut(task)? {
        ValueData::TaskState(TaskStateData::Stack { status: s, .. }) => {
            *s = status;
            Ok(())
        }
        ValueData::TaskState(TaskStateData::Interaction { status: s, .. }) => {
            *s = status;
            Ok(())
        }
        _ => Err(SpekError::reference_error("not a task state value")),
    }
}

/// Marks `task` `CANCELLED` and plants an *initial* `CancellationError` in
/// its exception slot. The next instruction that task executes observes
/// the initial marker and converts it to non-initial before routing to its
/// error continuation.
pub fn cancel(universe: &mut Universe, builtins: &spek_core::Builtins, task: Value) -> SpekResult<()> {
    let ty = builtins.exception_type("CancellationError");
    let msg = universe.alloc(ValueData::Str("task was cancelled".to_string()));
    // CancellationError's field convention: [initial: Bool, message: Str].
    let exc = universe.alloc(ValueData::Compound {
        ty,
        fields: vec![Value::Bool(true), msg],
    });
    match universe.get_mut(task)? {
        ValueData::TaskState(TaskStateData::Stack { status, exception, .. }) => {
            *status = TaskStatus::Cancelled;
            *exception = exc;
            Ok(())
        }
        _ => Err(SpekError::reference_error("only stack tasks can be cancelled")),
    }
}

/// Runs an interaction task: completes itself and is immediately replaced
/// by a fresh `WAITING` copy with the same symbol, so the environment can
/// issue the same interaction repeatedly.
pub fn run_interaction(universe: &mut Universe, machine: &mut MachineState, task: Value) -> SpekResult<()> {
    let symbol = match universe.get(task) {
        Some(ValueData::TaskState(TaskStateData::Interaction { symbol, .. })) => *symbol,
        _ => return Err(SpekError::reference_error("not an interaction task")),
    };
    set_status(universe, task, TaskStatus::Completed)?;
    let fresh = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
        symbol,
        status: TaskStatus::Waiting,
    }));
    machine.replace_task(task, fresh);
    Ok(())
}
