//! Observer lists for session notifications.

use std::fmt;

type Slot<T> = Box<dyn FnMut(&mut T) + Send>;

/// A list of observers notified in registration order.
///
/// Slots receive mutable access to the payload so that, for example, an
/// observer of a fresh request can fill in its headers and body.
pub struct Signal<T: ?Sized> {
    slots: Vec<Slot<T>>,
}

impl<T: ?Sized> Signal<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Registers an observer.
    pub fn connect<F>(&mut self, slot: F)
    where
        F: FnMut(&mut T) + Send + 'static,
    {
        self.slots.push(Box::new(slot));
    }

    pub fn emit(&mut self, value: &mut T) {
        for slot in &mut self.slots {
            slot(value);
        }
    }

    pub fn disconnect_all(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T: ?Sized> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("slots", &self.slots.len()).finish()
    }
}
