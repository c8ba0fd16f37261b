//! Change-tracking draft sessions over immutable values.
//!
//! A [`Draft`] wraps a [`Value`] so handler code can look like in-place
//! mutation while the original stays untouched. Reads proxy to the base
//! value; writes are recorded against a lazily-built shadow of the touched
//! spine. [`Draft::finalize`] rebuilds only touched nodes, reusing the
//! original `Arc` for everything else, and reports whether anything
//! changed at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::value::{MapKey, Value};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("expected {expected} but draft holds {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("record has no field '{0}'")]
    MissingField(String),
    #[error("map has no key '{0}'")]
    MissingKey(MapKey),
    #[error("list index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Outcome of [`Draft::finalize`]. When `changed` is false, `value` is the
/// draft's base, identical allocation included.
#[derive(Debug)]
pub struct Finalized {
    pub changed: bool,
    pub value: Value,
}

/// One mutation-recording session over a single immutable value.
///
/// A draft is scoped to one handler invocation: the engine creates it
/// immediately before the call and finalizes it immediately after. Child
/// drafts for nested composites are created lazily on first access, so a
/// deep mutation never forces an eager copy of the whole structure.
pub struct Draft {
    base: Value,
    wrote: bool,
    node: Node,
}

enum Node {
    /// No write and no entered child at this node; reads go to the base.
    Clean,
    /// Wholesale replacement recorded via [`Draft::set`].
    Replaced(Value),
    /// Spine shadow of a record; entries become child drafts when entered.
    Record(IndexMap<String, Slot>),
    List(Vec<Slot>),
    Map(BTreeMap<MapKey, Slot>),
}

enum Slot {
    /// Entry still sharing the base's value.
    Shared(Value),
    /// Entry entered as a nested draft.
    Entered(Box<Draft>),
}

impl Slot {
    fn snapshot(&self) -> Value {
        match self {
            Slot::Shared(value) => value.clone(),
            Slot::Entered(draft) => draft.snapshot(),
        }
    }

    fn is_touched(&self) -> bool {
        match self {
            Slot::Shared(_) => false,
            Slot::Entered(draft) => draft.is_touched(),
        }
    }

    fn finalize(self) -> Finalized {
        match self {
            Slot::Shared(value) => Finalized {
                changed: false,
                value,
            },
            Slot::Entered(draft) => draft.finalize(),
        }
    }

    fn enter(&mut self) -> &mut Draft {
        if let Slot::Shared(value) = self {
            let base = value.clone();
            *self = Slot::Entered(Box::new(Draft::new(base)));
        }
        match self {
            Slot::Entered(draft) => draft,
            Slot::Shared(_) => unreachable!("slot was just entered"),
        }
    }
}

impl Draft {
    /// Begin a draft session over `value`.
    pub fn new(value: Value) -> Self {
        Self {
            base: value,
            wrote: false,
            node: Node::Clean,
        }
    }

    /// Kind of the value this draft currently represents.
    pub fn kind(&self) -> &'static str {
        match &self.node {
            Node::Clean => self.base.kind(),
            Node::Replaced(value) => value.kind(),
            Node::Record(_) => "record",
            Node::List(_) => "list",
            Node::Map(_) => "map",
        }
    }

    /// True iff any write was recorded at or below this node. Entering a
    /// child for reading does not mark the draft touched.
    pub fn is_touched(&self) -> bool {
        if self.wrote {
            return true;
        }
        match &self.node {
            Node::Clean | Node::Replaced(_) => false,
            Node::Record(shadow) => shadow.values().any(Slot::is_touched),
            Node::List(shadow) => shadow.iter().any(Slot::is_touched),
            Node::Map(shadow) => shadow.values().any(Slot::is_touched),
        }
    }

    /// Fully-materialized plain copy of the draft as it currently stands.
    /// Does not finalize and does not mark anything touched.
    pub fn snapshot(&self) -> Value {
        match &self.node {
            Node::Clean => self.base.clone(),
            Node::Replaced(value) => value.clone(),
            Node::Record(shadow) => Value::Record(Arc::new(
                shadow
                    .iter()
                    .map(|(key, slot)| (key.clone(), slot.snapshot()))
                    .collect(),
            )),
            Node::List(shadow) => {
                Value::List(Arc::new(shadow.iter().map(Slot::snapshot).collect()))
            }
            Node::Map(shadow) => Value::Map(Arc::new(
                shadow
                    .iter()
                    .map(|(key, slot)| (key.clone(), slot.snapshot()))
                    .collect(),
            )),
        }
    }

    /// Materialize recorded mutations. Untouched drafts yield the base
    /// value unchanged (same allocation); touched composites are rebuilt
    /// with untouched children keeping their original `Arc`s.
    pub fn finalize(self) -> Finalized {
        let mut changed = self.wrote;
        match self.node {
            Node::Clean => Finalized {
                changed: false,
                value: self.base,
            },
            Node::Replaced(value) => Finalized {
                changed: true,
                value,
            },
            Node::Record(shadow) => {
                let mut fields = IndexMap::with_capacity(shadow.len());
                for (key, slot) in shadow {
                    let entry = slot.finalize();
                    changed |= entry.changed;
                    fields.insert(key, entry.value);
                }
                if changed {
                    Finalized {
                        changed: true,
                        value: Value::Record(Arc::new(fields)),
                    }
                } else {
                    Finalized {
                        changed: false,
                        value: self.base,
                    }
                }
            }
            Node::List(shadow) => {
                let mut items = Vec::with_capacity(shadow.len());
                for slot in shadow {
                    let entry = slot.finalize();
                    changed |= entry.changed;
                    items.push(entry.value);
                }
                if changed {
                    Finalized {
                        changed: true,
                        value: Value::List(Arc::new(items)),
                    }
                } else {
                    Finalized {
                        changed: false,
                        value: self.base,
                    }
                }
            }
            Node::Map(shadow) => {
                let mut entries = BTreeMap::new();
                for (key, slot) in shadow {
                    let entry = slot.finalize();
                    changed |= entry.changed;
                    entries.insert(key, entry.value);
                }
                if changed {
                    Finalized {
                        changed: true,
                        value: Value::Map(Arc::new(entries)),
                    }
                } else {
                    Finalized {
                        changed: false,
                        value: self.base,
                    }
                }
            }
        }
    }

    // ---- reads -------------------------------------------------------

    pub fn as_bool(&self) -> Option<bool> {
        self.scalar().and_then(|value| value.as_bool())
    }

    pub fn as_int(&self) -> Option<i64> {
        self.scalar().and_then(|value| value.as_int())
    }

    pub fn as_text(&self) -> Option<&str> {
        self.scalar().and_then(|value| value.as_text())
    }

    /// Current value of a record field, reading through any recorded
    /// writes. Non-mutating: no shadow is created.
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match &self.node {
            Node::Clean => self.base.field(name).cloned(),
            Node::Replaced(value) => value.field(name).cloned(),
            Node::Record(shadow) => shadow.get(name).map(Slot::snapshot),
            Node::List(_) | Node::Map(_) => None,
        }
    }

    /// Current value of a list element, reading through recorded writes.
    pub fn get_item(&self, index: usize) -> Option<Value> {
        match &self.node {
            Node::Clean => self.base.item(index).cloned(),
            Node::Replaced(value) => value.item(index).cloned(),
            Node::List(shadow) => shadow.get(index).map(Slot::snapshot),
            Node::Record(_) | Node::Map(_) => None,
        }
    }

    /// Current value under a map key, reading through recorded writes.
    pub fn get_key(&self, key: &MapKey) -> Option<Value> {
        match &self.node {
            Node::Clean => self.base.as_map().and_then(|map| map.get(key)).cloned(),
            Node::Replaced(value) => value.as_map().and_then(|map| map.get(key)).cloned(),
            Node::Map(shadow) => shadow.get(key).map(Slot::snapshot),
            Node::Record(_) | Node::List(_) => None,
        }
    }

    pub fn contains_field(&self, name: &str) -> bool {
        match &self.node {
            Node::Clean => self.base.field(name).is_some(),
            Node::Replaced(value) => value.field(name).is_some(),
            Node::Record(shadow) => shadow.contains_key(name),
            Node::List(_) | Node::Map(_) => false,
        }
    }

    /// Element count of the composite this draft holds; `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match &self.node {
            Node::Clean => composite_len(&self.base),
            Node::Replaced(value) => composite_len(value),
            Node::Record(shadow) => Some(shadow.len()),
            Node::List(shadow) => Some(shadow.len()),
            Node::Map(shadow) => Some(shadow.len()),
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    fn scalar(&self) -> Option<&Value> {
        match &self.node {
            Node::Clean => Some(&self.base),
            Node::Replaced(value) => Some(value),
            Node::Record(_) | Node::List(_) | Node::Map(_) => None,
        }
    }

    // ---- writes ------------------------------------------------------

    /// Replace the whole value under this draft. Also the scalar write
    /// path: a counter draft is updated via `set(n + 1)`.
    pub fn set(&mut self, value: impl Into<Value>) {
        self.wrote = true;
        self.node = Node::Replaced(value.into());
    }

    /// Write a record field, inserting it if absent.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), DraftError> {
        let shadow = self.enter_record()?;
        shadow.insert(name.into(), Slot::Shared(value.into()));
        self.wrote = true;
        Ok(())
    }

    /// Delete a record field. Later fields shift up, preserving order.
    pub fn remove_field(&mut self, name: &str) -> Result<(), DraftError> {
        let shadow = self.enter_record()?;
        if shadow.shift_remove(name).is_none() {
            return Err(DraftError::MissingField(name.to_owned()));
        }
        self.wrote = true;
        Ok(())
    }

    /// Nested draft for a record field, created on first access.
    pub fn field_mut(&mut self, name: &str) -> Result<&mut Draft, DraftError> {
        let shadow = self.enter_record()?;
        let slot = shadow
            .get_mut(name)
            .ok_or_else(|| DraftError::MissingField(name.to_owned()))?;
        Ok(slot.enter())
    }

    /// Overwrite a list element in place.
    pub fn set_item(&mut self, index: usize, value: impl Into<Value>) -> Result<(), DraftError> {
        let shadow = self.enter_list()?;
        let len = shadow.len();
        let slot = shadow
            .get_mut(index)
            .ok_or(DraftError::IndexOutOfBounds { index, len })?;
        *slot = Slot::Shared(value.into());
        self.wrote = true;
        Ok(())
    }

    /// Append to a list.
    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), DraftError> {
        let shadow = self.enter_list()?;
        shadow.push(Slot::Shared(value.into()));
        self.wrote = true;
        Ok(())
    }

    /// Insert into a list at `index`, shifting later elements down.
    pub fn insert_item(&mut self, index: usize, value: impl Into<Value>) -> Result<(), DraftError> {
        let shadow = self.enter_list()?;
        let len = shadow.len();
        if index > len {
            return Err(DraftError::IndexOutOfBounds { index, len });
        }
        shadow.insert(index, Slot::Shared(value.into()));
        self.wrote = true;
        Ok(())
    }

    /// Remove a list element, shifting later elements up.
    pub fn remove_item(&mut self, index: usize) -> Result<(), DraftError> {
        let shadow = self.enter_list()?;
        let len = shadow.len();
        if index >= len {
            return Err(DraftError::IndexOutOfBounds { index, len });
        }
        shadow.remove(index);
        self.wrote = true;
        Ok(())
    }

    /// Swap two list elements (reordering is a tracked write).
    pub fn swap_items(&mut self, a: usize, b: usize) -> Result<(), DraftError> {
        let shadow = self.enter_list()?;
        let len = shadow.len();
        let out_of_bounds = if a >= len { Some(a) } else if b >= len { Some(b) } else { None };
        if let Some(index) = out_of_bounds {
            return Err(DraftError::IndexOutOfBounds { index, len });
        }
        shadow.swap(a, b);
        self.wrote = true;
        Ok(())
    }

    /// Shorten a list to at most `len` elements.
    pub fn truncate(&mut self, len: usize) -> Result<(), DraftError> {
        let shadow = self.enter_list()?;
        if len < shadow.len() {
            shadow.truncate(len);
            self.wrote = true;
        }
        Ok(())
    }

    /// Nested draft for a list element, created on first access.
    pub fn item_mut(&mut self, index: usize) -> Result<&mut Draft, DraftError> {
        let shadow = self.enter_list()?;
        let len = shadow.len();
        let slot = shadow
            .get_mut(index)
            .ok_or(DraftError::IndexOutOfBounds { index, len })?;
        Ok(slot.enter())
    }

    /// Write a map entry, inserting it if absent.
    pub fn set_key(&mut self, key: impl Into<MapKey>, value: impl Into<Value>) -> Result<(), DraftError> {
        let shadow = self.enter_map()?;
        shadow.insert(key.into(), Slot::Shared(value.into()));
        self.wrote = true;
        Ok(())
    }

    /// Delete a map entry.
    pub fn remove_key(&mut self, key: &MapKey) -> Result<(), DraftError> {
        let shadow = self.enter_map()?;
        if shadow.remove(key).is_none() {
            return Err(DraftError::MissingKey(key.clone()));
        }
        self.wrote = true;
        Ok(())
    }

    /// Nested draft for a map entry, created on first access.
    pub fn key_mut(&mut self, key: &MapKey) -> Result<&mut Draft, DraftError> {
        let shadow = self.enter_map()?;
        let slot = shadow
            .get_mut(key)
            .ok_or_else(|| DraftError::MissingKey(key.clone()))?;
        Ok(slot.enter())
    }

    // ---- shadow materialization -------------------------------------

    fn enter_record(&mut self) -> Result<&mut IndexMap<String, Slot>, DraftError> {
        let source = match &self.node {
            Node::Record(_) => None,
            Node::Clean => Some(expect_record(&self.base)?),
            Node::Replaced(value) => Some(expect_record(value)?),
            Node::List(_) | Node::Map(_) => {
                return Err(DraftError::KindMismatch {
                    expected: "record",
                    found: self.kind(),
                });
            }
        };
        if let Some(fields) = source {
            let shadow = fields
                .iter()
                .map(|(key, value)| (key.clone(), Slot::Shared(value.clone())))
                .collect();
            self.node = Node::Record(shadow);
        }
        match &mut self.node {
            Node::Record(shadow) => Ok(shadow),
            _ => unreachable!("node was just materialized as a record"),
        }
    }

    fn enter_list(&mut self) -> Result<&mut Vec<Slot>, DraftError> {
        let source = match &self.node {
            Node::List(_) => None,
            Node::Clean => Some(expect_list(&self.base)?),
            Node::Replaced(value) => Some(expect_list(value)?),
            Node::Record(_) | Node::Map(_) => {
                return Err(DraftError::KindMismatch {
                    expected: "list",
                    found: self.kind(),
                });
            }
        };
        if let Some(items) = source {
            let shadow = items.iter().map(|value| Slot::Shared(value.clone())).collect();
            self.node = Node::List(shadow);
        }
        match &mut self.node {
            Node::List(shadow) => Ok(shadow),
            _ => unreachable!("node was just materialized as a list"),
        }
    }

    fn enter_map(&mut self) -> Result<&mut BTreeMap<MapKey, Slot>, DraftError> {
        let source = match &self.node {
            Node::Map(_) => None,
            Node::Clean => Some(expect_map(&self.base)?),
            Node::Replaced(value) => Some(expect_map(value)?),
            Node::Record(_) | Node::List(_) => {
                return Err(DraftError::KindMismatch {
                    expected: "map",
                    found: self.kind(),
                });
            }
        };
        if let Some(entries) = source {
            let shadow = entries
                .iter()
                .map(|(key, value)| (key.clone(), Slot::Shared(value.clone())))
                .collect();
            self.node = Node::Map(shadow);
        }
        match &mut self.node {
            Node::Map(shadow) => Ok(shadow),
            _ => unreachable!("node was just materialized as a map"),
        }
    }
}

fn composite_len(value: &Value) -> Option<usize> {
    match value {
        Value::List(items) => Some(items.len()),
        Value::Map(entries) => Some(entries.len()),
        Value::Record(fields) => Some(fields.len()),
        _ => None,
    }
}

fn expect_record(value: &Value) -> Result<Arc<IndexMap<String, Value>>, DraftError> {
    match value {
        Value::Record(fields) => Ok(fields.clone()),
        other => Err(DraftError::KindMismatch {
            expected: "record",
            found: other.kind(),
        }),
    }
}

fn expect_list(value: &Value) -> Result<Arc<Vec<Value>>, DraftError> {
    match value {
        Value::List(items) => Ok(items.clone()),
        other => Err(DraftError::KindMismatch {
            expected: "list",
            found: other.kind(),
        }),
    }
}

fn expect_map(value: &Value) -> Result<Arc<BTreeMap<MapKey, Value>>, DraftError> {
    match value {
        Value::Map(entries) => Ok(entries.clone()),
        other => Err(DraftError::KindMismatch {
            expected: "map",
            found: other.kind(),
        }),
    }
}
