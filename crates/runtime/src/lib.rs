//! Spek Runtime: the task machine. References, terms, instructions, the
//! per-task run loop, the machine state tasks live in, and the schedulers
//! the state-space explorer drives over that machine state.
//!
//! # Modules
//!
//! - `reference`: read/write over the `ReferenceData` variants.
//! - `term`: the pure, side-effect-free term evaluator.
//! - `procedure`: the three procedure forms and `initiate`.
//! - `instruction`: the instruction set and the task-burst step function.
//! - `task`: `enabled`/`run`/`cancel` over a single task.
//! - `machine`: the ordered task collection and its equalities.
//! - `scheduler`: `schedule_all`/`schedule_nonzeno`.

pub mod instruction;
pub mod machine;
pub mod procedure;
pub mod reference;
pub mod scheduler;
pub mod task;
pub mod term;

pub use instruction::{Instruction, ProgramTable, StackProgram, NO_HANDLER};
pub use machine::MachineState;
pub use procedure::{initiate, Initiate, IntrinsicFn, IntrinsicRegistry};
pub use term::{ArithOp, BoolOp, CmpOp, EvalCtx, Term, UnaryOp};
