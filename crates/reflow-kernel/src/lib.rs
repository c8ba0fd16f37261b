//! Dispatch/reduction engine: build a handler registry once, then reduce
//! actions against state values through change-tracking draft sessions.

pub mod action;
pub mod error;
mod reduce;
pub mod registry;

pub use action::Action;
pub use error::{BuildError, ReduceError};
pub use registry::{Handler, HandlerRegistry, InitialState, Predicate, RegistryBuilder};

pub use reflow_value::{Draft, DraftError, Finalized, MapKey, Value};
