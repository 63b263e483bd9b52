//! Tab bookkeeping shared by the session engines.

use super::{SessionError, TabId, PRIMARY_TAB};

/// Open tabs by id. Closed ids are handed out again, so the table never
/// grows past the most tabs open at once.
#[derive(Debug)]
pub(crate) struct TabSlots<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for TabSlots<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> TabSlots<T> {
    /// Table holding only the primary tab.
    pub fn with_primary(primary: T) -> Self {
        Self {
            slots: vec![Some(primary)],
        }
    }

    pub fn get(&self, id: TabId) -> Result<&T, SessionError> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(SessionError::UnknownTab(id))
    }

    pub fn get_mut(&mut self, id: TabId) -> Result<&mut T, SessionError> {
        self.slots
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(SessionError::UnknownTab(id))
    }

    /// Store a tab in the lowest free slot.
    pub fn insert(&mut self, tab: T) -> TabId {
        match self.slots.iter().position(Option::is_none) {
            Some(id) => {
                self.slots[id] = Some(tab);
                id
            }
            None => {
                self.slots.push(Some(tab));
                self.slots.len() - 1
            }
        }
    }

    /// Take a secondary tab out of the table. The primary tab stays.
    pub fn remove(&mut self, id: TabId) -> Result<T, SessionError> {
        if id == PRIMARY_TAB {
            return Err(SessionError::UnknownTab(id));
        }
        let tab = self
            .slots
            .get_mut(id)
            .and_then(Option::take)
            .ok_or(SessionError::UnknownTab(id))?;
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        Ok(tab)
    }

    /// Number of open tabs.
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|t| t.is_some()).count()
    }

    /// Drop every secondary tab.
    pub fn keep_primary(&mut self) {
        self.slots.truncate(1);
    }

    /// Take every open tab, leaving the table empty.
    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.slots.drain(..).flatten()
    }

    #[cfg(test)]
    fn slots(&self) -> usize {
        self.slots.len()
    }
}
