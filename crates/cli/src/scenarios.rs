//! The six demonstration scenarios. The first three build a real machine
//! state and drive it through the explorer; the latter three are classic
//! process-algebra examples compact enough to assemble directly as graphs.

use spek_core::{bootstrap, Builtins, FrameData, InteractionSymbol, ReferenceData, TaskStateData, TaskStatus, Universe, Value, ValueData};
use spek_runtime::{Instruction, IntrinsicRegistry, MachineState, ProgramTable, Term};
use spek_statespace::lts::Lts;

/// A scenario backed by an actual task machine: explore it with the
/// schedulers in `spek_runtime::scheduler`.
pub struct MachineScenario {
    pub universe: Universe,
    pub builtins: Builtins,
    pub programs: ProgramTable,
    pub registry: IntrinsicRegistry,
    pub initial: MachineState,
    /// A human-readable note about what a representative terminal state
    /// looks like, computed once the caller has explored the scenario.
    pub describe: fn(&Universe, &MachineState) -> String,
}

/// A scenario given directly as a labelled transition system: one of the
/// classic textbook bisimulation examples, too small to benefit from full
/// machine simulation.
pub enum Scenario {
    Machine(MachineScenario),
    Graph(Lts<String>),
}

pub const NAMES: &[&str] = &[
    "empty-program",
    "await-never",
    "producer-consumer",
    "dining-philosophers",
    "two-firecracker",
    "strong-vs-weak",
];

pub fn build(name: &str) -> Option<Scenario> {
    match name {
        "empty-program" => Some(Scenario::Machine(empty_program())),
        "await-never" => Some(Scenario::Machine(await_never())),
        "producer-consumer" => Some(Scenario::Machine(producer_consumer())),
        "dining-philosophers" => Some(Scenario::Machine(dining_philosophers())),
        "two-firecracker" => Some(Scenario::Graph(two_firecracker())),
        "strong-vs-weak" => Some(Scenario::Graph(strong_vs_weak())),
        _ => None,
    }
}

fn interaction_tasks(universe: &mut Universe) -> Vec<Value> {
    [
        InteractionSymbol::Next,
        InteractionSymbol::Prev,
        InteractionSymbol::Tick,
        InteractionSymbol::Never,
    ]
    .into_iter()
    .map(|symbol| {
        universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol,
            status: TaskStatus::Waiting,
        }))
    })
    .collect()
}

fn stack_task(universe: &mut Universe, program: u32, locals: Vec<Value>) -> Value {
    let loc = universe.alloc(ValueData::ProgramLocation { program, index: 0 });
    let frame = universe.alloc(ValueData::Frame(FrameData { location: loc, locals }));
    universe.alloc(ValueData::TaskState(TaskStateData::Stack {
        status: TaskStatus::Waiting,
        stack: vec![frame],
        exception: Value::None,
        returned: Value::None,
    }))
}

fn no_op_describe(_universe: &Universe, _machine: &MachineState) -> String {
    String::new()
}

/// Scenario 1: an empty module-level task alongside the four interaction
/// tasks. The program task completes on its single scheduled burst; the
/// non-`NEVER` interactions remain perpetually self-schedulable.
fn empty_program() -> MachineScenario {
    let mut universe = Universe::new();
    let builtins = bootstrap(&mut universe);
    let registry = IntrinsicRegistry::default();
    let mut programs = ProgramTable::default();
    programs.push(vec![Instruction::Pop { on_error: -1 }]);

    let program_task = stack_task(&mut universe, 0, vec![]);
    let mut tasks = vec![program_task];
    tasks.extend(interaction_tasks(&mut universe));
    let initial = MachineState::new(tasks);

    MachineScenario {
        universe,
        builtins,
        programs,
        registry,
        initial,
        describe: no_op_describe,
    }
}

/// Scenario 2: `var x = 42; var y = x + 1; await never()`. The task
/// advances through both assignments in a single burst and then stalls
/// forever on a guard that can never fire.
fn await_never() -> MachineScenario {
    let mut universe = Universe::new();
    let builtins = bootstrap(&mut universe);
    let registry = IntrinsicRegistry::default();

    let x_ref = universe.alloc(ValueData::Reference(ReferenceData::Frame(0)));
    let y_ref = universe.alloc(ValueData::Reference(ReferenceData::Frame(1)));

    let never_terminated = Term::IsTerminated(Box::new(Term::ITask(InteractionSymbol::Never)));

    let program = vec![
        Instruction::Update {
            reference: Term::TRef(x_ref),
            value: Term::CInt(42),
            next: 1,
            on_error: -1,
        },
        Instruction::Update {
            reference: Term::TRef(y_ref),
            value: Term::Arithmetic(
                spek_runtime::ArithOp::Add,
                Box::new(Term::Read(Box::new(Term::TRef(x_ref)))),
                Box::new(Term::CInt(1)),
            ),
            next: 2,
            on_error: -1,
        },
        Instruction::Guard {
            branches: vec![(never_terminated, 2)],
            on_error: -1,
        },
    ];
    let mut programs = ProgramTable::default();
    programs.push(program);

    let program_task = stack_task(&mut universe, 0, vec![Value::None, Value::None]);
    let mut tasks = vec![program_task];
    tasks.extend(interaction_tasks(&mut universe));
    let initial = MachineState::new(tasks);

    fn describe(universe: &Universe, machine: &MachineState) -> String {
        let program_task = machine.tasks()[0];
        match universe.get(program_task) {
            Some(ValueData::TaskState(TaskStateData::Stack { stack, .. })) => {
                let Some(&frame) = stack.last() else {
                    return "program task completed".to_string();
                };
                let locals = match universe.get(frame) {
                    Some(ValueData::Frame(f)) => &f.locals,
                    _ => return String::new(),
                };
                format!("x = {:?}, y = {:?}", locals.first(), locals.get(1))
            }
            _ => String::new(),
        }
    }

    MachineScenario {
        universe,
        builtins,
        programs,
        registry,
        initial,
        describe,
    }
}

/// Scenario 3: a producer and a consumer sharing a one-cell buffer. The
/// producer writes `1`, `2`, `3` in turn, gated on the buffer being empty;
/// the consumer drains each item into an accumulator weighted by decimal
/// place, so the final value is the input sequence reversed (`123` ->
/// `321`). Every interleaving the scheduler can produce is reachable.
fn producer_consumer() -> MachineScenario {
    let mut universe = Universe::new();
    let builtins = bootstrap(&mut universe);
    let registry = IntrinsicRegistry::default();

    let cell = universe.alloc(ValueData::Cell(Value::None));
    let cell_slot = universe.alloc(ValueData::Reference(ReferenceData::Frame(0)));
    let cell_ref = universe.alloc(ValueData::Reference(ReferenceData::Cell(cell_slot)));

    let buffer_empty = Term::Comparison(
        spek_runtime::CmpOp::Eq,
        Box::new(Term::Read(Box::new(Term::TRef(cell_ref)))),
        Box::new(Term::CNone),
    );
    let buffer_full = Term::Comparison(
        spek_runtime::CmpOp::Ne,
        Box::new(Term::Read(Box::new(Term::TRef(cell_ref)))),
        Box::new(Term::CNone),
    );

    let write_item = |item: i64, next: usize| Instruction::Update {
        reference: Term::TRef(cell_ref),
        value: Term::CInt(item),
        next,
        on_error: -1,
    };
    let wait_empty = |next: usize| Instruction::Guard {
        branches: vec![(buffer_empty.clone(), next)],
        on_error: -1,
    };
    let producer_program = vec![
        wait_empty(1),
        write_item(1, 2),
        wait_empty(3),
        write_item(2, 4),
        wait_empty(5),
        write_item(3, 6),
        Instruction::Pop { on_error: -1 },
    ];

    // Consumer locals: [cell, acc, place].
    let acc_ref = Term::TRef(universe.alloc(ValueData::Reference(ReferenceData::Frame(1))));
    let place_ref = Term::TRef(universe.alloc(ValueData::Reference(ReferenceData::Frame(2))));
    let wait_full = |next: usize| Instruction::Guard {
        branches: vec![(buffer_full.clone(), next)],
        on_error: -1,
    };
    let accumulate = |next: usize| Instruction::Update {
        reference: acc_ref.clone(),
        value: Term::Arithmetic(
            spek_runtime::ArithOp::Add,
            Box::new(Term::Read(Box::new(acc_ref.clone()))),
            Box::new(Term::Arithmetic(
                spek_runtime::ArithOp::Mul,
                Box::new(Term::Read(Box::new(Term::TRef(cell_ref)))),
                Box::new(Term::Read(Box::new(place_ref.clone()))),
            )),
        ),
        next,
        on_error: -1,
    };
    let advance_place = |next: usize| Instruction::Update {
        reference: place_ref.clone(),
        value: Term::Arithmetic(
            spek_runtime::ArithOp::Mul,
            Box::new(Term::Read(Box::new(place_ref.clone()))),
            Box::new(Term::CInt(10)),
        ),
        next,
        on_error: -1,
    };
    let clear_buffer = |next: usize| Instruction::Update {
        reference: Term::TRef(cell_ref),
        value: Term::CNone,
        next,
        on_error: -1,
    };
    let consumer_program = vec![
        wait_full(1),
        accumulate(2),
        advance_place(3),
        clear_buffer(4),
        wait_full(5),
        accumulate(6),
        advance_place(7),
        clear_buffer(8),
        wait_full(9),
        accumulate(10),
        advance_place(11),
        clear_buffer(12),
        Instruction::Pop { on_error: -1 },
    ];

    let mut programs = ProgramTable::default();
    let producer_id = programs.push(producer_program);
    let consumer_id = programs.push(consumer_program);

    let producer_task = stack_task(&mut universe, producer_id, vec![cell]);
    let consumer_task = stack_task(&mut universe, consumer_id, vec![cell, Value::Int(0), Value::Int(1)]);
    let initial = MachineState::new(vec![producer_task, consumer_task]);

    fn describe(universe: &Universe, machine: &MachineState) -> String {
        let consumer = machine.tasks()[1];
        match universe.get(consumer) {
            Some(ValueData::TaskState(TaskStateData::Stack { stack, .. })) => {
                let Some(&frame) = stack.last() else {
                    return "consumer completed".to_string();
                };
                match universe.get(frame) {
                    Some(ValueData::Frame(f)) => format!("acc so far = {:?}", f.locals.get(1)),
                    _ => String::new(),
                }
            }
            _ => String::new(),
        }
    }

    MachineScenario {
        universe,
        builtins,
        programs,
        registry,
        initial,
        describe,
    }
}

/// Scenario 4: three philosophers, three forks, each philosopher picks up
/// its left fork then its right. No retry and no release, so any
/// interleaving in which all three acquire their left fork before any
/// acquires its right reaches a genuine deadlock: every philosopher
/// stalled on its right-fork guard (`pc == 2`, the `awaiting_right`
/// location), holding its left fork forever.
fn dining_philosophers() -> MachineScenario {
    let mut universe = Universe::new();
    let builtins = bootstrap(&mut universe);
    let registry = IntrinsicRegistry::default();

    let forks: Vec<Value> = (0..3).map(|_| universe.alloc(ValueData::Cell(Value::None))).collect();

    let mut programs = ProgramTable::default();
    let mut philosophers = Vec::with_capacity(3);
    for i in 0..3 {
        let left = forks[i];
        let right = forks[(i + 1) % 3];
        let left_slot = universe.alloc(ValueData::Reference(ReferenceData::Frame(0)));
        let right_slot = universe.alloc(ValueData::Reference(ReferenceData::Frame(1)));
        let left_ref = Term::TRef(universe.alloc(ValueData::Reference(ReferenceData::Cell(left_slot))));
        let right_ref = Term::TRef(universe.alloc(ValueData::Reference(ReferenceData::Cell(right_slot))));

        let fork_free = |r: Term| Term::Comparison(spek_runtime::CmpOp::Eq, Box::new(Term::Read(Box::new(r))), Box::new(Term::CNone));

        let program = vec![
            Instruction::Guard {
                branches: vec![(fork_free(left_ref.clone()), 1)],
                on_error: -1,
            },
            Instruction::Update {
                reference: left_ref.clone(),
                value: Term::CInt(i as i64),
                next: 2,
                on_error: -1,
            },
            Instruction::Guard {
                branches: vec![(fork_free(right_ref.clone()), 3)],
                on_error: -1,
            },
            Instruction::Update {
                reference: right_ref,
                value: Term::CInt(i as i64),
                next: 4,
                on_error: -1,
            },
            Instruction::Pop { on_error: -1 },
        ];
        let program_id = programs.push(program);
        philosophers.push(stack_task(&mut universe, program_id, vec![left, right]));
    }

    let initial = MachineState::new(philosophers);

    fn describe(universe: &Universe, machine: &MachineState) -> String {
        let all_awaiting_right = machine.tasks().iter().all(|&t| match universe.get(t) {
            Some(ValueData::TaskState(TaskStateData::Stack { stack, .. })) => stack.last().is_some_and(|&frame| {
                matches!(
                    universe.get(frame),
                    Some(ValueData::Frame(f)) if matches!(
                        universe.get(f.location),
                        Some(ValueData::ProgramLocation { index: 2, .. })
                    )
                )
            }),
            _ => false,
        });
        if all_awaiting_right {
            "deadlock: all philosophers awaiting their right fork".to_string()
        } else {
            String::new()
        }
    }

    MachineScenario {
        universe,
        builtins,
        programs,
        registry,
        initial,
        describe,
    }
}

/// Scenario 5: the classic CCS `TwoFireCracker` example — one firecracker is
/// struck, then either one of the two fuses can be extinguished or (silently)
/// left to burn, and whichever fuse reaches its end first fires, possibly
/// racing the other; both eventually bang into the same state. Named `s0`..
/// `s10` after the eleven raw states, with one silent (`strike` continues
/// unobserved) transition, matching the unreduced LTS this scenario is
/// checked against under strong, weak and observational-congruence
/// bisimilarity, each reducing it to eight states.
fn two_firecracker() -> Lts<String> {
    use spek_statespace::lts::{from_parts, StateNode, Transition};

    const STRIKE: usize = 0;
    const EXTINGUISH: usize = 1;
    const BANG: usize = 2;

    let labelled = |label: usize, target: usize| Transition { label: Some(label), target };
    let silent = |target: usize| Transition { label: None, target };

    let states = vec![
        StateNode { content: "s0".to_string(), transitions: vec![labelled(STRIKE, 1)] },
        StateNode { content: "s1".to_string(), transitions: vec![labelled(EXTINGUISH, 2), silent(3)] },
        StateNode { content: "s2".to_string(), transitions: vec![] },
        StateNode {
            content: "s3".to_string(),
            transitions: vec![labelled(BANG, 4), labelled(BANG, 7), labelled(EXTINGUISH, 10)],
        },
        StateNode { content: "s4".to_string(), transitions: vec![labelled(EXTINGUISH, 5), labelled(BANG, 9)] },
        StateNode { content: "s5".to_string(), transitions: vec![labelled(BANG, 6)] },
        StateNode { content: "s6".to_string(), transitions: vec![] },
        StateNode { content: "s7".to_string(), transitions: vec![labelled(EXTINGUISH, 8), labelled(BANG, 9)] },
        StateNode { content: "s8".to_string(), transitions: vec![labelled(BANG, 6)] },
        StateNode { content: "s9".to_string(), transitions: vec![labelled(EXTINGUISH, 6)] },
        StateNode { content: "s10".to_string(), transitions: vec![labelled(BANG, 8), labelled(BANG, 5)] },
    ];
    from_parts(states, 0)
}

/// Scenario 6: two states joined by one silent transition — collapses
/// under weak bisimulation, not under strong.
fn strong_vs_weak() -> Lts<String> {
    use spek_statespace::lts::{from_parts, StateNode, Transition};
    from_parts(
        vec![
            StateNode {
                content: "s0".to_string(),
                transitions: vec![Transition { label: None, target: 1 }],
            },
            StateNode {
                content: "s1".to_string(),
                transitions: vec![],
            },
        ],
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_statespace::{reduce, Cached, Weak};

    #[test]
    fn two_firecracker_reduces_to_eight_states_under_weak_bisimilarity() {
        let lts = two_firecracker();
        assert_eq!(lts.len(), 11);
        let reduced = reduce(&lts, &Cached::new(Weak), true);
        assert_eq!(reduced.len(), 8);
    }
}
