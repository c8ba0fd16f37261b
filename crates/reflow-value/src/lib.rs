//! Deterministic value model plus the change-tracking draft layer.

mod draft;
mod value;

pub use draft::{Draft, DraftError, Finalized};
pub use value::{JsonConvertError, MapKey, Value, ValueMap, ValueRecord};

#[cfg(test)]
mod tests;
