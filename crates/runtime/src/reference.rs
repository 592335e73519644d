//! Reference read/write: the indirection layer between terms/instructions
//! and the machine state. A reference is a [`Value`] carrying
//! [`ReferenceData`]; every variant below implements the same two
//! operations the original gives each `Reference` subclass.

use spek_core::{ReferenceData, SpekError, SpekResult, Universe, Value, ValueData};

use crate::machine::MachineState;
use crate::task::top_frame;

/// Dereferences `reference` in the context of `task`/`machine`.
pub fn read(universe: &Universe, reference: Value, task: Value, machine: &MachineState) -> SpekResult<Value> {
    let data = reference_data(universe, reference)?;
    match data {
        ReferenceData::Frame(index) => {
            let frame = top_frame(universe, task)?;
            let locals = frame_locals(universe, frame)?;
            locals
                .get(*index)
                .copied()
                .ok_or_else(|| SpekError::reference_error("frame slot out of range"))
        }
        ReferenceData::AbsoluteFrame {
            task_id,
            frame_offset,
            slot_index,
        } => {
            let target_task = machine.task_by_id(*task_id)?;
            let frame = frame_at_offset(universe, target_task, *frame_offset)?;
            let locals = frame_locals(universe, frame)?;
            locals
                .get(*slot_index)
                .copied()
                .ok_or_else(|| SpekError::reference_error("absolute frame slot out of range"))
        }
        ReferenceData::ReturnValue => stack_slot(universe, task, StackSlot::Returned),
        ReferenceData::Exception => stack_slot(universe, task, StackSlot::Exception),
        ReferenceData::Field { compound, field_index } => match universe.get(*compound) {
            Some(ValueData::Compound { fields, .. }) => fields
                .get(*field_index)
                .copied()
                .ok_or_else(|| SpekError::attribute_error("field index out of range")),
            _ => Err(SpekError::type_error("not a compound value")),
        },
        ReferenceData::Item { container, index } => read_item(universe, *container, *index),
        ReferenceData::Name { namespace, name } => match universe.get(*namespace) {
            Some(ValueData::Namespace(entries)) => entries
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .ok_or_else(|| SpekError::attribute_error(format!("no name '{name}' in namespace"))),
            _ => Err(SpekError::type_error("not a namespace value")),
        },
        ReferenceData::Cell(inner_ref) => {
            let cell = read(universe, *inner_ref, task, machine)?;
            match universe.get(cell) {
                Some(ValueData::Cell(v)) => Ok(*v),
                _ => Err(SpekError::type_error("reference does not resolve to a cell")),
            }
        }
        ReferenceData::VRef(v) => Ok(*v),
    }
}

/// Writes `value` through `reference`. Fails with `ReferenceError` for the
/// read-only `VRef` variant.
pub fn write(
    universe: &mut Universe,
    reference: Value,
    value: Value,
    task: Value,
    machine: &MachineState,
) -> SpekResult<()> {
    let data = reference_data(universe, reference)?.clone();
    match data {
        ReferenceData::Frame(index) => {
            let frame = top_frame(universe, task)?;
            ensure_frame_length(universe, frame, index + 1)?;
            let locals = frame_locals_mut(universe, frame)?;
            locals[index] = value;
            Ok(())
        }
        ReferenceData::AbsoluteFrame {
            task_id,
            frame_offset,
            slot_index,
        } => {
            let target_task = machine.task_by_id(task_id)?;
            let frame = frame_at_offset(universe, target_task, frame_offset)?;
            ensure_frame_length(universe, frame, slot_index + 1)?;
            let locals = frame_locals_mut(universe, frame)?;
            locals[slot_index] = value;
            Ok(())
        }
        ReferenceData::ReturnValue => set_stack_slot(universe, task, StackSlot::Returned, value),
        ReferenceData::Exception => set_stack_slot(universe, task, StackSlot::Exception, value),
        ReferenceData::Field { compound, field_index } => match universe.get_mut(compound)? {
            ValueData::Compound { fields, .. } => {
                let slot = fields
                    .get_mut(field_index)
                    .ok_or_else(|| SpekError::attribute_error("field index out of range"))?;
                *slot = value;
                Ok(())
            }
            _ => Err(SpekError::type_error("not a compound value")),
        },
        ReferenceData::Item { container, index } => write_item(universe, container, index, value),
        ReferenceData::Name { namespace, name } => match universe.get_mut(namespace)? {
            ValueData::Namespace(entries) => {
                if let Some(entry) = entries.iter_mut().find(|(n, _)| *n == name) {
                    entry.1 = value;
                } else {
                    entries.push((name, value));
                }
                Ok(())
            }
            _ => Err(SpekError::type_error("not a namespace value")),
        },
        ReferenceData::Cell(inner_ref) => {
            let cell = read(universe, inner_ref, task, machine)?;
            match universe.get_mut(cell)? {
                ValueData::Cell(slot) => {
                    *slot = value;
                    Ok(())
                }
                _ => Err(SpekError::type_error("reference does not resolve to a cell")),
            }
        }
        ReferenceData::VRef(_) => Err(SpekError::reference_error("cannot write through a VRef")),
    }
}

fn reference_data(universe: &Universe, reference: Value) -> SpekResult<&ReferenceData> {
    match universe.get(reference) {
        Some(ValueData::Reference(r)) => Ok(r),
        _ => Err(SpekError::type_error("not a reference value")),
    }
}

fn frame_locals<'a>(universe: &'a Universe, frame: Value) -> SpekResult<&'a Vec<Value>> {
    match universe.get(frame) {
        Some(ValueData::Frame(f)) => Ok(&f.locals),
        _ => Err(SpekError::reference_error("not a frame value")),
    }
}

fn frame_locals_mut(universe: &mut Universe, frame: Value) -> SpekResult<&mut Vec<Value>> {
    match universe.get_mut(frame)? {
        ValueData::Frame(f) => Ok(&mut f.locals),
        _ => Err(SpekError::reference_error("not a frame value")),
    }
}

fn ensure_frame_length(universe: &mut Universe, frame: Value, len: usize) -> SpekResult<()> {
    if let ValueData::Frame(f) = universe.get_mut(frame)? {
        if f.locals.len() < len {
            f.resize(len);
        }
    }
    Ok(())
}

fn frame_at_offset(universe: &Universe, task: Value, offset: usize) -> SpekResult<Value> {
    match universe.get(task) {
        Some(ValueData::TaskState(spek_core::TaskStateData::Stack { stack, .. })) => stack
            .get(offset)
            .copied()
            .ok_or_else(|| SpekError::reference_error("frame offset out of range")),
        _ => Err(SpekError::reference_error("not a stack task")),
    }
}

enum StackSlot {
    Returned,
    Exception,
}

fn stack_slot(universe: &Universe, task: Value, which: StackSlot) -> SpekResult<Value> {
    match universe.get(task) {
        Some(ValueData::TaskState(spek_core::TaskStateData::Stack {
            exception, returned, ..
        })) => Ok(match which {
            StackSlot::Returned => *returned,
            StackSlot::Exception => *exception,
        }),
        _ => Err(SpekError::reference_error("not a stack task")),
    }
}

fn set_stack_slot(universe: &mut Universe, task: Value, which: StackSlot, value: Value) -> SpekResult<()> {
    match universe.get_mut(task)? {
        ValueData::TaskState(spek_core::TaskStateData::Stack {
            exception, returned, ..
        }) => {
            match which {
                StackSlot::Returned => *returned = value,
                StackSlot::Exception => *exception = value,
            }
            Ok(())
        }
        _ => Err(SpekError::reference_error("not a stack task")),
    }
}

fn read_item(universe: &Universe, container: Value, index: Value) -> SpekResult<Value> {
    match universe.get(container) {
        Some(ValueData::Tuple(items)) | Some(ValueData::List { items, .. }) => match index {
            Value::Int(i) if i >= 0 && (i as usize) < items.len() => Ok(items[i as usize]),
            Value::Int(_) => Err(SpekError::index_error("index out of range")),
            _ => Err(SpekError::type_error("index must be an int")),
        },
        Some(ValueData::Dict { entries, .. }) => entries
            .iter()
            .find(|(k, _)| universe.cequals(*k, index))
            .map(|(_, v)| *v)
            .ok_or_else(|| SpekError::key_error("key not found")),
        _ => Err(SpekError::type_error("value does not support item access")),
    }
}

fn write_item(universe: &mut Universe, container: Value, index: Value, value: Value) -> SpekResult<()> {
    match universe.get_mut(container)? {
        ValueData::List { items, mutation_token } => match index {
            Value::Int(i) if i >= 0 && (i as usize) < items.len() => {
                items[i as usize] = value;
                *mutation_token += 1;
                Ok(())
            }
            Value::Int(_) => Err(SpekError::index_error("index out of range")),
            _ => Err(SpekError::type_error("index must be an int")),
        },
        ValueData::Tuple(_) => Err(SpekError::type_error("tuples are immutable")),
        ValueData::Dict { entries, mutation_token } => {
            // Key comparison crosses numeric types like everything cequals does;
            // fall back to a fresh scratch universe-free comparison via equals().
            if let Some(entry) = entries.iter_mut().find(|(k, _)| values_cequal_approx(*k, index)) {
                entry.1 = value;
            } else {
                entries.push((index, value));
            }
            *mutation_token += 1;
            Ok(())
        }
        _ => Err(SpekError::type_error("value does not support item assignment")),
    }
}

/// `Universe::cequals` needs `&Universe`, which `write_item` only holds
/// mutably; atomics (the only keys a well-typed dict uses today) compare
/// fine without it.
fn values_cequal_approx(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x as f64 == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::None, Value::None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spek_core::{FrameData, TaskStatus};

    fn make_frame_task(universe: &mut Universe) -> Value {
        let loc = universe.alloc(ValueData::ProgramLocation { program: 0, index: 0 });
        let frame = universe.alloc(ValueData::Frame(FrameData {
            location: loc,
            locals: vec![Value::None, Value::None],
        }));
        universe.alloc(ValueData::TaskState(spek_core::TaskStateData::Stack {
            status: TaskStatus::Running,
            stack: vec![frame],
            exception: Value::None,
            returned: Value::None,
        }))
    }

    #[test]
    fn frame_reference_round_trips() {
        let mut universe = Universe::new();
        let task = make_frame_task(&mut universe);
        let machine = MachineState::new(vec![task]);
        let r = universe.alloc(ValueData::Reference(ReferenceData::Frame(1)));
        write(&mut universe, r, Value::Int(42), task, &machine).unwrap();
        assert_eq!(read(&universe, r, task, &machine).unwrap(), Value::Int(42));
    }

    #[test]
    fn frame_reference_grows_frame_on_write() {
        let mut universe = Universe::new();
        let task = make_frame_task(&mut universe);
        let machine = MachineState::new(vec![task]);
        let r = universe.alloc(ValueData::Reference(ReferenceData::Frame(5)));
        write(&mut universe, r, Value::Bool(true), task, &machine).unwrap();
        assert_eq!(read(&universe, r, task, &machine).unwrap(), Value::Bool(true));
    }

    #[test]
    fn vref_write_fails() {
        let mut universe = Universe::new();
        let task = make_frame_task(&mut universe);
        let machine = MachineState::new(vec![task]);
        let r = universe.alloc(ValueData::Reference(ReferenceData::VRef(Value::Int(1))));
        assert!(write(&mut universe, r, Value::Int(2), task, &machine).is_err());
        assert_eq!(read(&universe, r, task, &machine).unwrap(), Value::Int(1));
    }

    #[test]
    fn cell_reference_shares_writes() {
        let mut universe = Universe::new();
        let task = make_frame_task(&mut universe);
        let machine = MachineState::new(vec![task]);
        let cell = universe.alloc(ValueData::Cell(Value::Int(0)));
        let cell_slot = universe.alloc(ValueData::Reference(ReferenceData::Frame(0)));
        write(&mut universe, cell_slot, cell, task, &machine).unwrap();
        let cell_ref = universe.alloc(ValueData::Reference(ReferenceData::Cell(cell_slot)));
        write(&mut universe, cell_ref, Value::Int(9), task, &machine).unwrap();
        assert_eq!(read(&universe, cell_ref, task, &machine).unwrap(), Value::Int(9));
    }
}
