//! A labelled transition system: a sealed graph of states decorated with
//! content, connected by labelled edges. States and transitions are
//! addressed by index rather than by reference identity, since Rust has no
//! analogue of the original's `id(self)`-based hashing.

use serde::{Deserialize, Serialize};

/// An edge label. `None` denotes a silent (internal, unobservable) move;
/// `Some(task_index)` denotes the task whose execution produced the edge.
pub type Label = Option<usize>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub label: Label,
    pub target: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateNode<T> {
    pub content: T,
    pub transitions: Vec<Transition>,
}

/// A sealed LTS: states and transitions are fixed once built. Serializable
/// for content types that are themselves `Serialize`/`Deserialize` — in
/// practice the graph-based scenarios, whose `String` labels carry no
/// arena handles; a machine-backed scenario's `MachineState` content is
/// tied to its own `Universe` and isn't snapshotted this way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lts<T> {
    states: Vec<StateNode<T>>,
    initial: usize,
}

impl<T> Lts<T> {
    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn state(&self, idx: usize) -> &StateNode<T> {
        &self.states[idx]
    }

    pub fn content(&self, idx: usize) -> &T {
        &self.states[idx].content
    }

    pub fn transitions(&self, idx: usize) -> &[Transition] {
        &self.states[idx].transitions
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All state indices reachable from the initial state (including it).
    pub fn reachable_states(&self) -> Vec<usize> {
        let mut reached = Vec::new();
        let mut seen = vec![false; self.states.len()];
        let mut agenda = vec![self.initial];
        while let Some(s) = agenda.pop() {
            if seen[s] {
                continue;
            }
            seen[s] = true;
            reached.push(s);
            for t in &self.states[s].transitions {
                agenda.push(t.target);
            }
        }
        reached
    }
}

/// Assembles an LTS directly from pre-built states. Use `state_space` when
/// states arise from interning content; use this when the edges themselves
/// are the point, e.g. a hand-written reference LTS with a `None`-labelled
/// transition that no task index could produce.
pub fn from_parts<T>(states: Vec<StateNode<T>>, initial: usize) -> Lts<T> {
    Lts { states, initial }
}

/// Builds an LTS from an iterator of `(content, successors)` pairs, where
/// `successors` is every `(task_index, successor_content)` pair reachable
/// from `content` in one scheduled step. The origin of the first pair
/// yielded becomes the LTS's initial state. States compare equal by the
/// caller-supplied `eq` predicate, which lets machine-state content use
/// `bequals` instead of `PartialEq`.
pub fn state_space<T: Clone>(
    transitions: impl IntoIterator<Item = (T, Vec<(usize, T)>)>,
    mut eq: impl FnMut(&T, &T) -> bool,
) -> Lts<T> {
    let mut states: Vec<StateNode<T>> = Vec::new();
    let mut initial = None;

    let mut intern = |states: &mut Vec<StateNode<T>>, content: T| -> usize {
        if let Some(pos) = states.iter().position(|s| eq(&s.content, &content)) {
            return pos;
        }
        states.push(StateNode {
            content,
            transitions: Vec::new(),
        });
        states.len() - 1
    };

    for (content, successors) in transitions {
        let origin = intern(&mut states, content);
        if initial.is_none() {
            initial = Some(origin);
        }
        for (idx, target_content) in successors {
            let target = intern(&mut states, target_content);
            let edge = Transition {
                label: Some(idx),
                target,
            };
            if !states[origin]
                .transitions
                .iter()
                .any(|t| t.target == edge.target && t.label == edge.label)
            {
                states[origin].transitions.push(edge);
            }
        }
    }

    Lts {
        states,
        initial: initial.expect("state_space requires at least one transition record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_space_dedups_states_by_content() {
        let transitions = vec![(0i32, vec![(0usize, 1i32)]), (1i32, vec![(0usize, 0i32)])];
        let lts = state_space(transitions, |a, b| a == b);
        assert_eq!(lts.len(), 2);
        assert_eq!(lts.transitions(lts.initial()).len(), 1);
    }
}
