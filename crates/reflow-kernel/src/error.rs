use reflow_value::DraftError;
use thiserror::Error;

/// Registry construction failures. All are programming defects in handler
/// registration; a failed build leaves no usable registry behind.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate case registration for discriminant '{0}'")]
    DuplicateCase(String),
    #[error("default handler registered twice")]
    DuplicateDefault,
    #[error("registration attempted after the registry was built")]
    RegistrationAfterBuild,
}

/// Reduction-time failures, surfaced synchronously to the `reduce` caller.
/// Nothing is committed when a reduction fails: the state prior to the
/// call is unaffected.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("handler for '{kind}' both mutated its draft and returned a new value")]
    AmbiguousUpdate { kind: String },
    #[error("draft error: {0}")]
    Draft(#[from] DraftError),
}
