//! Reduction engine: runs the applicable handler pipeline for one action
//! over successive draft sessions.

use reflow_value::{Draft, Value};

use crate::action::Action;
use crate::error::ReduceError;
use crate::registry::{Handler, HandlerRegistry, Matcher};

impl HandlerRegistry {
    /// Reduce one action against the previous state. On the first call
    /// (no previous state) the initial-state provider supplies the input.
    ///
    /// Execution order: the exact case for the action's discriminant (if
    /// any), then every predicate entry whose predicate accepts the
    /// action, in registration order — a pipeline where each handler
    /// consumes the previous handler's output. The default handler runs
    /// only when nothing else did. When no handler runs at all, the input
    /// state is returned as-is, identity preserved.
    pub fn reduce(&self, previous: Option<&Value>, action: &Action) -> Result<Value, ReduceError> {
        let mut current = match previous {
            Some(value) => value.clone(),
            None => (self.initial)(),
        };
        let mut ran = false;

        if let Some(&index) = self.case_index.get(action.kind.as_str()) {
            let entry = &self.entries[index];
            if let Matcher::Case(kind) = &entry.matcher {
                log::trace!("action '{}': exact case '{kind}'", action.kind);
            }
            current = apply_handler(current, &entry.handler, action)?;
            ran = true;
        }

        for entry in &self.entries {
            if let Matcher::Predicate(predicate) = &entry.matcher
                && predicate(action)
            {
                log::trace!("action '{}': matcher accepted", action.kind);
                current = apply_handler(current, &entry.handler, action)?;
                ran = true;
            }
        }

        if !ran {
            if let Some(default) = &self.default {
                log::trace!("action '{}': default handler", action.kind);
                current = apply_handler(current, default, action)?;
            } else {
                log::trace!("action '{}': no handler matched", action.kind);
            }
        }

        Ok(current)
    }
}

/// Run one handler over a fresh draft session. The session is owned by
/// this frame: created immediately before the call, finalized immediately
/// after, never retained.
fn apply_handler(value: Value, handler: &Handler, action: &Action) -> Result<Value, ReduceError> {
    let mut draft = Draft::new(value);
    let returned = handler(&mut draft, action)?;
    match returned {
        Some(replacement) => {
            if draft.is_touched() {
                return Err(ReduceError::AmbiguousUpdate {
                    kind: action.kind.clone(),
                });
            }
            Ok(replacement)
        }
        None => Ok(draft.finalize().value),
    }
}
