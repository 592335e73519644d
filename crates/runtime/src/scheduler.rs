//! Scheduling policies: which of a machine's enabled tasks the explorer
//! should branch on. Both policies return task indices into
//! [`MachineState::tasks`].

use spek_core::{Builtins, InteractionSymbol, SpekResult, TaskStateData, Universe, ValueData};

use crate::instruction::ProgramTable;
use crate::machine::MachineState;
use crate::task;

/// Every enabled task except interaction tasks carrying the reserved
/// `NEVER` symbol, which never fires.
pub fn schedule_all(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &Builtins,
    machine: &MachineState,
) -> SpekResult<Vec<usize>> {
    let mut indices = Vec::new();
    for (i, &t) in machine.tasks().iter().enumerate() {
        if is_never(universe, t) {
            continue;
        }
        if task::enabled(universe, programs, builtins, t, machine)? {
            indices.push(i);
        }
    }
    Ok(indices)
}

fn is_never(universe: &Universe, task: spek_core::Value) -> bool {
    matches!(
        universe.get(task),
        Some(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Never,
            ..
        }))
    )
}

fn rank(universe: &Universe, task: spek_core::Value) -> u8 {
    match universe.get(task) {
        Some(ValueData::TaskState(TaskStateData::Stack { .. })) => 1,
        _ => 0,
    }
}

/// Internal actions outrank interactions. If any internal action is
/// enabled, schedules exactly one (the lowest task index), resolving
/// internal nondeterminism while leaving externally observable choices
/// (interactions) branching. Otherwise schedules every eligible
/// interaction.
pub fn schedule_nonzeno(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &Builtins,
    machine: &MachineState,
) -> SpekResult<Vec<usize>> {
    let enabled = schedule_all(universe, programs, builtins, machine)?;
    let best_rank = enabled
        .iter()
        .map(|&i| rank(universe, machine.tasks()[i]))
        .max()
        .unwrap_or(0);
    let top: Vec<usize> = enabled.into_iter().filter(|&i| rank(universe, machine.tasks()[i]) == best_rank).collect();
    if best_rank == 1 {
        Ok(top.into_iter().take(1).collect())
    } else {
        Ok(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_core::{FrameData, TaskStatus, Value};

    fn waiting_stack_task(universe: &mut Universe, program: u32) -> Value {
        let loc = universe.alloc(ValueData::ProgramLocation { program, index: 0 });
        let frame = universe.alloc(ValueData::Frame(FrameData {
            location: loc,
            locals: vec![],
        }));
        universe.alloc(ValueData::TaskState(TaskStateData::Stack {
            status: TaskStatus::Waiting,
            stack: vec![frame],
            exception: Value::None,
            returned: Value::None,
        }))
    }

    #[test]
    fn schedule_all_excludes_never_interactions() {
        let mut universe = Universe::new();
        let builtins = spek_core::bootstrap(&mut universe);
        let mut programs = ProgramTable::default();
        programs.push(vec![crate::instruction::Instruction::Pop { on_error: -1 }]);
        let t = waiting_stack_task(&mut universe, 0);
        let never = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Never,
            status: TaskStatus::Waiting,
        }));
        let machine = MachineState::new(vec![t, never]);
        let indices = schedule_all(&mut universe, &programs, &builtins, &machine).unwrap();
        assert_eq!(indices, vec![0]);
    }

    #[test]
    fn schedule_nonzeno_prefers_internal_action() {
        let mut universe = Universe::new();
        let builtins = spek_core::bootstrap(&mut universe);
        let mut programs = ProgramTable::default();
        programs.push(vec![crate::instruction::Instruction::Pop { on_error: -1 }]);
        let internal = waiting_stack_task(&mut universe, 0);
        let tick = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let machine = MachineState::new(vec![tick, internal]);
        let indices = schedule_nonzeno(&mut universe, &programs, &builtins, &machine).unwrap();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn schedule_nonzeno_falls_back_to_interactions() {
        let mut universe = Universe::new();
        let builtins = spek_core::bootstrap(&mut universe);
        let programs = ProgramTable::default();
        let tick = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let next = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Next,
            status: TaskStatus::Waiting,
        }));
        let machine = MachineState::new(vec![tick, next]);
        let indices = schedule_nonzeno(&mut universe, &programs, &builtins, &machine).unwrap();
        assert_eq!(indices, vec![0, 1]);
    }
}
