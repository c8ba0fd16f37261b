use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use reflow_value::{Draft, DraftError, Value};

use crate::action::Action;
use crate::error::BuildError;

/// Handler invoked with a draft of the current state and the action. It
/// may mutate the draft in place, or return `Ok(Some(..))` to replace the
/// state wholesale. Doing both in one invocation is rejected at reduction
/// time.
pub type Handler =
    Arc<dyn Fn(&mut Draft, &Action) -> Result<Option<Value>, DraftError> + Send + Sync>;

/// Predicate matcher evaluated against every dispatched action.
pub type Predicate = Arc<dyn Fn(&Action) -> bool + Send + Sync>;

/// Initial-state provider, invoked only when `reduce` is called without a
/// previous state.
pub type InitialState = Arc<dyn Fn() -> Value + Send + Sync>;

pub(crate) enum Matcher {
    Case(String),
    Predicate(Predicate),
}

pub(crate) struct Entry {
    pub(crate) matcher: Matcher,
    pub(crate) handler: Handler,
}

/// Immutable dispatch table: one ordered list of case and predicate
/// entries, a discriminant lookup for exact dispatch, and at most one
/// default handler. Built once via [`RegistryBuilder`], then safely
/// shareable across any number of concurrent `reduce` calls.
pub struct HandlerRegistry {
    pub(crate) entries: Vec<Entry>,
    pub(crate) case_index: HashMap<String, usize>,
    pub(crate) default: Option<Handler>,
    pub(crate) initial: InitialState,
}

impl HandlerRegistry {
    /// Builder-callback construction form. The closure receives the
    /// registration accumulator and may fail with a [`BuildError`].
    pub fn build<F>(initial: Value, build_fn: F) -> Result<Self, BuildError>
    where
        F: FnOnce(&mut RegistryBuilder) -> Result<(), BuildError>,
    {
        Self::build_with(move || initial.clone(), build_fn)
    }

    /// Like [`HandlerRegistry::build`] but with a lazy initial-state
    /// provider, invoked only on the first reduction.
    pub fn build_with<I, F>(initial: I, build_fn: F) -> Result<Self, BuildError>
    where
        I: Fn() -> Value + Send + Sync + 'static,
        F: FnOnce(&mut RegistryBuilder) -> Result<(), BuildError>,
    {
        let mut builder = RegistryBuilder::new();
        build_fn(&mut builder)?;
        builder.build(Arc::new(initial))
    }

    /// Map-object construction form: cases populate exact-match entries in
    /// the map's key order, matchers in sequence order.
    pub fn from_parts(
        initial: Value,
        cases: IndexMap<String, Handler>,
        matchers: Vec<(Predicate, Handler)>,
        default: Option<Handler>,
    ) -> Result<Self, BuildError> {
        let mut builder = RegistryBuilder::new();
        for (kind, handler) in cases {
            builder.push_case(kind, handler)?;
        }
        for (predicate, handler) in matchers {
            builder.push_matcher(predicate, handler)?;
        }
        if let Some(handler) = default {
            builder.push_default(handler)?;
        }
        builder.build(Arc::new(move || initial.clone()))
    }

    pub fn has_case(&self, kind: &str) -> bool {
        self.case_index.contains_key(kind)
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Number of ordered entries (cases plus matchers; the default is a
    /// distinguished fallback, not an entry).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handlers and predicates are opaque closures, so the debug rendering
/// summarizes the dispatch shape instead: case discriminants, matcher
/// count, and whether a default is set.
impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cases: Vec<&str> = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.matcher {
                Matcher::Case(kind) => Some(kind.as_str()),
                Matcher::Predicate(_) => None,
            })
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("cases", &cases)
            .field("matchers", &(self.entries.len() - cases.len()))
            .field("default", &self.default.is_some())
            .finish_non_exhaustive()
    }
}

/// Registration-time accumulator for a [`HandlerRegistry`]. Registration
/// is build-time only: once [`RegistryBuilder::build`] has run, any
/// further registration (or a second build) is rejected.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
    case_index: HashMap<String, usize>,
    default: Option<Handler>,
    finalized: bool,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exact-discriminant handler. Each discriminant may be
    /// registered at most once.
    pub fn add_case<H>(&mut self, kind: impl Into<String>, handler: H) -> Result<&mut Self, BuildError>
    where
        H: Fn(&mut Draft, &Action) -> Result<Option<Value>, DraftError> + Send + Sync + 'static,
    {
        self.push_case(kind.into(), Arc::new(handler))?;
        Ok(self)
    }

    /// Register a predicate handler, appended after all previously added
    /// entries in call order.
    pub fn add_matcher<P, H>(&mut self, predicate: P, handler: H) -> Result<&mut Self, BuildError>
    where
        P: Fn(&Action) -> bool + Send + Sync + 'static,
        H: Fn(&mut Draft, &Action) -> Result<Option<Value>, DraftError> + Send + Sync + 'static,
    {
        self.push_matcher(Arc::new(predicate), Arc::new(handler))?;
        Ok(self)
    }

    /// Set the singular default handler, invoked only when no case and no
    /// matcher ran.
    pub fn add_default<H>(&mut self, handler: H) -> Result<&mut Self, BuildError>
    where
        H: Fn(&mut Draft, &Action) -> Result<Option<Value>, DraftError> + Send + Sync + 'static,
    {
        self.push_default(Arc::new(handler))?;
        Ok(self)
    }

    /// Finalize the accumulated registrations into an immutable registry.
    pub fn build(&mut self, initial: InitialState) -> Result<HandlerRegistry, BuildError> {
        self.ensure_open()?;
        self.finalized = true;
        let entries = std::mem::take(&mut self.entries);
        let case_index = std::mem::take(&mut self.case_index);
        let default = self.default.take();
        log::debug!(
            "built handler registry: {} case(s), {} matcher(s), default={}",
            case_index.len(),
            entries.len() - case_index.len(),
            default.is_some(),
        );
        Ok(HandlerRegistry {
            entries,
            case_index,
            default,
            initial,
        })
    }

    pub(crate) fn push_case(&mut self, kind: String, handler: Handler) -> Result<(), BuildError> {
        self.ensure_open()?;
        if self.case_index.contains_key(&kind) {
            return Err(BuildError::DuplicateCase(kind));
        }
        self.case_index.insert(kind.clone(), self.entries.len());
        self.entries.push(Entry {
            matcher: Matcher::Case(kind),
            handler,
        });
        Ok(())
    }

    pub(crate) fn push_matcher(
        &mut self,
        predicate: Predicate,
        handler: Handler,
    ) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.entries.push(Entry {
            matcher: Matcher::Predicate(predicate),
            handler,
        });
        Ok(())
    }

    pub(crate) fn push_default(&mut self, handler: Handler) -> Result<(), BuildError> {
        self.ensure_open()?;
        if self.default.is_some() {
            return Err(BuildError::DuplicateDefault);
        }
        self.default = Some(handler);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), BuildError> {
        if self.finalized {
            return Err(BuildError::RegistrationAfterBuild);
        }
        Ok(())
    }
}
