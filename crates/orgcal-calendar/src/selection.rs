//! Persisted user choices: which organizations are selected and which
//! calendar keys are visible.

use std::collections::BTreeSet;
use std::sync::Arc;

use orgcal_core::{keys, KeyValueStore, KeyValueStoreExt};

use crate::error::CalendarError;

/// Set of strings mirrored to one storage key on every change.
struct PersistedSet {
    kv: Arc<dyn KeyValueStore>,
    key: &'static str,
    items: BTreeSet<String>,
}

impl PersistedSet {
    fn load(kv: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        let items = kv
            .get_json_or_default::<Vec<String>>(key)
            .into_iter()
            .collect();
        Self { kv, key, items }
    }

    fn set(&mut self, item: &str, present: bool) -> Result<bool, CalendarError> {
        if self.items.contains(item) == present {
            return Ok(false);
        }
        let mut next = self.items.clone();
        if present {
            next.insert(item.to_string());
        } else {
            next.remove(item);
        }
        self.replace(next)?;
        Ok(true)
    }

    fn replace(&mut self, next: BTreeSet<String>) -> Result<(), CalendarError> {
        let list: Vec<&String> = next.iter().collect();
        self.kv.set_json(self.key, &list)?;
        self.items = next;
        Ok(())
    }
}

/// Organizations the user checked. Drives active calendars and imports.
pub struct OrganizationSelection {
    inner: PersistedSet,
}

impl OrganizationSelection {
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: PersistedSet::load(kv, keys::SELECTED_ORGS),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.items.contains(name)
    }

    /// Select or deselect; returns whether anything changed.
    pub fn set_selected(&mut self, name: &str, selected: bool) -> Result<bool, CalendarError> {
        self.inner.set(name, selected)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }
}

/// Calendar keys whose events are rendered.
pub struct VisibilitySet {
    inner: PersistedSet,
}

impl VisibilitySet {
    pub fn load(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: PersistedSet::load(kv, keys::VISIBLE),
        }
    }

    pub fn contains(&self, calendar_key: &str) -> bool {
        self.inner.items.contains(calendar_key)
    }

    pub fn set_visible(&mut self, calendar_key: &str, visible: bool) -> Result<bool, CalendarError> {
        self.inner.set(calendar_key, visible)
    }

    /// Show every given key, but only while the set is still empty.
    ///
    /// Returns whether the set was initialized.
    pub fn initialize_if_empty<'a>(
        &mut self,
        calendar_keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<bool, CalendarError> {
        if !self.inner.items.is_empty() {
            return Ok(false);
        }
        let next: BTreeSet<String> = calendar_keys.into_iter().map(str::to_string).collect();
        if next.is_empty() {
            return Ok(false);
        }
        tracing::debug!("Showing all {} active calendars", next.len());
        self.inner.replace(next)?;
        Ok(true)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.items.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }
}
