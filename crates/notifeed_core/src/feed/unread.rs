//! Unread counter maintained alongside the reconciled map.
//!
//! # Invariants
//! - `get()` equals the number of entries with `read == false` after every
//!   insert, read-flag transition or removal reported to it.

use crate::model::notification::Notification;

/// Incrementally maintained unread count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadCounter {
    unread: usize,
}

impl UnreadCounter {
    pub fn get(&self) -> usize {
        self.unread
    }

    pub fn on_insert(&mut self, read: bool) {
        if !read {
            self.unread += 1;
        }
    }

    pub fn on_read_change(&mut self, was_read: bool, now_read: bool) {
        match (was_read, now_read) {
            (false, true) => self.unread = self.unread.saturating_sub(1),
            (true, false) => self.unread += 1,
            _ => {}
        }
    }

    pub fn on_remove(&mut self, read: bool) {
        if !read {
            self.unread = self.unread.saturating_sub(1);
        }
    }
}

/// Full recount over a notification set.
pub fn count_unread<'a>(notifications: impl IntoIterator<Item = &'a Notification>) -> usize {
    notifications
        .into_iter()
        .filter(|notification| notification.is_unread())
        .count()
}

#[cfg(test)]
mod tests {
    use super::UnreadCounter;

    #[test]
    fn tracks_transitions_without_underflow() {
        let mut counter = UnreadCounter::default();
        counter.on_insert(false);
        counter.on_insert(true);
        assert_eq!(counter.get(), 1);

        counter.on_read_change(false, true);
        assert_eq!(counter.get(), 0);
        counter.on_read_change(true, true);
        assert_eq!(counter.get(), 0);

        counter.on_read_change(true, false);
        assert_eq!(counter.get(), 1);

        counter.on_remove(false);
        counter.on_remove(false);
        assert_eq!(counter.get(), 0);
    }
}
