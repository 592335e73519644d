//! Spek Core: the value substrate for the Spek state-space explorer.
//!
//! Every runtime object is a [`Value`]; non-atomic values live in a
//! [`Universe`]'s generational arena so that object identity is a stable
//! index rather than a host pointer, and bijective equality can be built
//! over those indices.
//!
//! # Modules
//!
//! - `error`: the Spek error kinds (`TypeError`, `KeyError`, ...).
//! - `value`: the `Value` enum, the arena, sealing, and the four equalities.
//! - `data`: heap payload structs for non-atomic values.
//! - `types`: `Type`, C3 MRO, and the built-in type/exception bootstrap.

pub mod data;
pub mod error;
pub mod types;
pub mod value;

pub use data::{
    FrameData, FutureData, FutureStatus, InteractionSymbol, IteratorData, ProcedureData,
    PropertyData, ReferenceData, TaskStateData, TaskStatus,
};
pub use error::{SpekError, SpekResult};
pub use types::{Builtins, Member, TypeData, bootstrap, field_layout, mro, subtypeof};
pub use value::{Universe, Value, ValueData, ValueId, pack_exception};
