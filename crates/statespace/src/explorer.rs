//! BFS/DFS exploration: enumerates every machine state reachable from an
//! initial one under a scheduling policy, yielding `(state, successors)`
//! records ready to be assembled into an [`crate::lts::Lts`].

use rustc_hash::FxHashMap;
use spek_core::{SpekResult, TaskStateData, Universe, Value, ValueData};
use spek_runtime::{Instruction, MachineState, ProgramTable};

/// A scheduling policy: given the current machine state, returns the task
/// indices eligible to be scheduled from it.
pub type Scheduler<'a> = dyn Fn(&mut Universe, &ProgramTable, &spek_core::Builtins, &MachineState) -> SpekResult<Vec<usize>> + 'a;

/// Runs a scheduled task to quiescence: a stack task burns instructions
/// until it stalls or terminates; an interaction task completes and
/// respawns itself in the same slot.
fn run_scheduled_task(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &spek_core::Builtins,
    registry: &spek_runtime::IntrinsicRegistry,
    task: Value,
    machine: &mut MachineState,
) -> SpekResult<()> {
    match universe.get(task) {
        Some(ValueData::TaskState(TaskStateData::Interaction { .. })) => {
            spek_runtime::task::run_interaction(universe, machine, task)
        }
        _ => spek_runtime::task::run(universe, programs, builtins, registry, task, machine),
    }
}

fn clone_machine_unsealed(universe: &mut Universe, machine: &MachineState) -> MachineState {
    let mut identity = FxHashMap::default();
    let tasks = machine.tasks().iter().map(|&t| universe.clone_unsealed(t, &mut identity)).collect();
    MachineState::new(tasks)
}

fn seal_machine(universe: &mut Universe, machine: &MachineState) {
    for &t in machine.tasks() {
        universe.seal(t);
    }
}

fn machine_is_sealed(universe: &Universe, machine: &MachineState) -> bool {
    machine.tasks().iter().all(|&t| universe.is_sealed(t))
}

/// Enumerates the entire state space reachable from `initial`. Mirrors the
/// original's stack-based (DFS) agenda order.
pub fn explore(
    universe: &mut Universe,
    programs: &ProgramTable,
    builtins: &spek_core::Builtins,
    registry: &spek_runtime::IntrinsicRegistry,
    initial: MachineState,
    scheduler: &Scheduler<'_>,
) -> SpekResult<Vec<(MachineState, Vec<(usize, MachineState)>)>> {
    let initial = if machine_is_sealed(universe, &initial) {
        initial
    } else {
        let sealed = clone_machine_unsealed(universe, &initial);
        seal_machine(universe, &sealed);
        sealed
    };

    let mut visited: FxHashMap<u64, Vec<MachineState>> = FxHashMap::default();
    let mut agenda = vec![initial];
    let mut out = Vec::new();

    while let Some(s) = agenda.pop() {
        let h = s.hash(universe);
        let already_visited = visited
            .get(&h)
            .map(|bucket| bucket.iter().any(|v| v.equals(&s, universe)))
            .unwrap_or(false);
        if already_visited {
            continue;
        }

        let task_indices = scheduler(universe, programs, builtins, &s)?;
        let mut successors = Vec::with_capacity(task_indices.len());
        for idx in task_indices {
            let mut clone = clone_machine_unsealed(universe, &s);
            let task = clone.tasks()[idx];
            run_scheduled_task(universe, programs, builtins, registry, task, &mut clone)?;
            seal_machine(universe, &clone);
            successors.push((idx, clone.clone()));
            agenda.push(clone);
        }

        out.push((s.clone(), successors));
        visited.entry(h).or_default().push(s);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_core::{bootstrap, FrameData, InteractionSymbol, TaskStatus};
    use spek_runtime::scheduler::schedule_all;

    #[test]
    fn empty_program_with_interactions_yields_expected_shape() {
        let mut universe = Universe::new();
        let builtins = bootstrap(&mut universe);
        let registry = spek_runtime::IntrinsicRegistry::default();
        let mut programs = ProgramTable::default();
        programs.push(vec![Instruction::Pop { on_error: -1 }]);

        let loc = universe.alloc(ValueData::ProgramLocation { program: 0, index: 0 });
        let frame = universe.alloc(ValueData::Frame(FrameData { location: loc, locals: vec![] }));
        let program_task = universe.alloc(ValueData::TaskState(TaskStateData::Stack {
            status: TaskStatus::Waiting,
            stack: vec![frame],
            exception: Value::None,
            returned: Value::None,
        }));
        let mut interactions = Vec::new();
        for symbol in [
            InteractionSymbol::Next,
            InteractionSymbol::Prev,
            InteractionSymbol::Tick,
            InteractionSymbol::Never,
        ] {
            interactions.push(universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
                symbol,
                status: TaskStatus::Waiting,
            })));
        }
        let mut tasks = vec![program_task];
        tasks.extend(interactions);
        let initial = MachineState::new(tasks);

        let records = explore(
            &mut universe,
            &programs,
            &builtins,
            &registry,
            initial,
            &|u, p, b, m| schedule_all(u, p, b, m),
        )
        .unwrap();

        // Only two distinct states are reachable: the initial state (where
        // the non-NEVER interactions self-loop) and the state where the
        // program task has completed.
        assert_eq!(records.len(), 2);

        let initial_transitions = &records[0].1;
        let scheduled: std::collections::HashSet<usize> = initial_transitions.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(scheduled, std::collections::HashSet::from([0, 1, 2, 3]));
    }
}
