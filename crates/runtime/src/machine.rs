//! The machine state: an ordered collection of tasks. Task identity for
//! `AbsoluteFrame` references is the task's position in this collection,
//! which is stable across the lifetime of a single exploration run (tasks
//! are appended by `Launch`/removed never, save for interaction respawn
//! which rewrites in place).

use spek_core::{SpekError, SpekResult, Universe, Value, ValueId};

#[derive(Clone, Debug, Default)]
pub struct MachineState {
    tasks: Vec<Value>,
}

impl MachineState {
    pub fn new(tasks: Vec<Value>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Value] {
        &self.tasks
    }

    pub fn add_task(&mut self, task: Value) {
        self.tasks.push(task);
    }

    pub fn remove_task(&mut self, task: Value) {
        self.tasks.retain(|t| *t != task);
    }

    /// Looks up a task by its stable index, the identity `AbsoluteFrame`
    /// references carry.
    pub fn task_by_id(&self, task_id: u64) -> SpekResult<Value> {
        self.tasks
            .get(task_id as usize)
            .copied()
            .ok_or_else(|| SpekError::reference_error("no task with that id"))
    }

    pub fn task_id_of(&self, task: Value) -> Option<u64> {
        self.tasks.iter().position(|t| *t == task).map(|i| i as u64)
    }

    /// Finds the unique interaction task carrying `symbol`, if any is
    /// currently part of the machine.
    pub fn interaction_task(&self, universe: &Universe, symbol: spek_core::InteractionSymbol) -> Option<Value> {
        self.tasks.iter().copied().find(|t| {
            matches!(
                universe.get(*t),
                Some(spek_core::ValueData::TaskState(spek_core::TaskStateData::Interaction { symbol: s, .. }))
                    if *s == symbol
            )
        })
    }

    /// Replaces `old` with `new` at the same position, preserving the
    /// position-based identity `AbsoluteFrame` references rely on.
    pub fn replace_task(&mut self, old: Value, new: Value) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| **t == old) {
            *slot = new;
        }
    }

    /// Structural equality by task position: the two collections must have
    /// the same length, with each position's task `bequals` its counterpart
    /// at the same position under the same identity bijection.
    pub fn bequals(&self, other: &Self, universe: &Universe, identity: &mut rustc_hash::FxHashMap<ValueId, ValueId>) -> bool {
        self.tasks.len() == other.tasks.len()
            && self.tasks.iter().zip(other.tasks.iter()).all(|(&a, &b)| universe.bequals(a, b, identity))
    }

    pub fn equals(&self, other: &Self, universe: &Universe) -> bool {
        let mut identity = rustc_hash::FxHashMap::default();
        self.bequals(other, universe, &mut identity)
    }

    /// `xor`s every task's hash together, seeded so the empty machine does
    /// not collide with the empty-everything-else hash.
    pub fn hash(&self, universe: &Universe) -> u64 {
        const SEED: u64 = 4711;
        self.tasks.iter().fold(SEED, |acc, &t| acc ^ universe.hash(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_core::{InteractionSymbol, TaskStatus, TaskStateData, ValueData};

    #[test]
    fn replace_task_preserves_position() {
        let mut universe = Universe::new();
        let a = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let b = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Next,
            status: TaskStatus::Waiting,
        }));
        let mut machine = MachineState::new(vec![a, b]);
        let fresh = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        machine.replace_task(a, fresh);
        assert_eq!(machine.tasks(), &[fresh, b]);
    }

    #[test]
    fn interaction_task_finds_by_symbol() {
        let mut universe = Universe::new();
        let tick = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let machine = MachineState::new(vec![tick]);
        assert_eq!(machine.interaction_task(&universe, InteractionSymbol::Tick), Some(tick));
        assert_eq!(machine.interaction_task(&universe, InteractionSymbol::Next), None);
    }

    #[test]
    fn hash_is_order_independent_xor() {
        let mut universe = Universe::new();
        let a = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let b = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Next,
            status: TaskStatus::Waiting,
        }));
        let m1 = MachineState::new(vec![a, b]);
        let m2 = MachineState::new(vec![b, a]);
        assert_eq!(m1.hash(&universe), m2.hash(&universe));
    }

    #[test]
    fn equals_matches_under_task_renaming() {
        let mut universe = Universe::new();
        let a = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let b = universe.alloc(ValueData::TaskState(TaskStateData::Interaction {
            symbol: InteractionSymbol::Tick,
            status: TaskStatus::Waiting,
        }));
        let m1 = MachineState::new(vec![a]);
        let m2 = MachineState::new(vec![b]);
        assert!(m1.equals(&m2, &universe));
    }
}
