//! Handle table: wire handle → decoded value.

use crate::constants::BASE_WIRE_HANDLE;
use crate::types::{GenericValue, Handle};

/// Result of looking a handle up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandleLookup<'a> {
    /// Never assigned (or assigned before the last reset).
    Unknown,
    /// Assigned, but the referent is still being decoded.
    Pending,
    Resolved(&'a GenericValue),
}

/// Sequential handle assignment starting at [`BASE_WIRE_HANDLE`].
///
/// Arrays and objects are stored as [`GenericValue::Array`] /
/// [`GenericValue::Object`] pointing into the graph arena, so they resolve as
/// soon as their handle is assigned. Class descriptors stay pending until
/// their super chain is complete.
#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    entries: Vec<Option<GenericValue>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle the next assignment will receive.
    pub fn next_handle(&self) -> Handle {
        BASE_WIRE_HANDLE + self.entries.len() as Handle
    }

    /// Assigns the next handle. `None` installs a placeholder to be filled
    /// with [`HandleTable::fill`].
    pub fn assign(&mut self, value: Option<GenericValue>) -> Handle {
        let handle = self.next_handle();
        self.entries.push(value);
        handle
    }

    /// Replaces the value stored for `handle`. Returns `false` for a handle
    /// this table never assigned.
    pub fn fill(&mut self, handle: Handle, value: GenericValue) -> bool {
        match self.slot(handle) {
            Some(i) => {
                self.entries[i] = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, handle: Handle) -> HandleLookup<'_> {
        match self.slot(handle) {
            Some(i) => match &self.entries[i] {
                Some(v) => HandleLookup::Resolved(v),
                None => HandleLookup::Pending,
            },
            None => HandleLookup::Unknown,
        }
    }

    /// Drops every assignment; the next handle is the base again.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles whose referent was never filled in.
    pub fn pending(&self) -> impl Iterator<Item = Handle> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_none())
            .map(|(i, _)| BASE_WIRE_HANDLE + i as Handle)
    }

    fn slot(&self, handle: Handle) -> Option<usize> {
        let i = handle.checked_sub(BASE_WIRE_HANDLE)? as usize;
        (i < self.entries.len()).then_some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequentially_from_base() {
        let mut table = HandleTable::new();
        assert_eq!(table.assign(Some(GenericValue::Null)), 0x7e_0000);
        assert_eq!(table.assign(None), 0x7e_0001);
        assert_eq!(table.next_handle(), 0x7e_0002);
    }

    #[test]
    fn placeholder_resolves_after_fill() {
        let mut table = HandleTable::new();
        let h = table.assign(None);
        assert_eq!(table.get(h), HandleLookup::Pending);
        assert_eq!(table.pending().collect::<Vec<_>>(), vec![h]);
        assert!(table.fill(h, GenericValue::String("x".into())));
        assert_eq!(
            table.get(h),
            HandleLookup::Resolved(&GenericValue::String("x".into()))
        );
        assert_eq!(table.pending().count(), 0);
    }

    #[test]
    fn unknown_handles_below_base_and_past_end() {
        let mut table = HandleTable::new();
        table.assign(Some(GenericValue::Null));
        assert_eq!(table.get(0), HandleLookup::Unknown);
        assert_eq!(table.get(0x7e_0001), HandleLookup::Unknown);
        assert!(!table.fill(0x7e_0005, GenericValue::Null));
    }

    #[test]
    fn clear_restarts_numbering() {
        let mut table = HandleTable::new();
        table.assign(Some(GenericValue::Null));
        table.assign(Some(GenericValue::Null));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.get(0x7e_0000), HandleLookup::Unknown);
        assert_eq!(table.assign(None), 0x7e_0000);
    }
}
