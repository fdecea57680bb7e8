//! Grouping keys for throttled events

use std::hash::Hash;

/// Maps an event to the key it is throttled under.
///
/// Implemented for every `FnMut(&T) -> K` closure and for [`Unkeyed`].
pub trait KeyOf<T> {
    /// Key type; events sharing a key share a throttle window.
    type Key: Hash + Eq + Clone;

    fn key_of(&mut self, event: &T) -> Self::Key;
}

impl<T, K, F> KeyOf<T> for F
where
    F: FnMut(&T) -> K,
    K: Hash + Eq + Clone,
{
    type Key = K;

    fn key_of(&mut self, event: &T) -> K {
        self(event)
    }
}

/// Every event shares one implicit key, so the whole stream is throttled as one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unkeyed;

impl<T> KeyOf<T> for Unkeyed {
    type Key = ();

    fn key_of(&mut self, _event: &T) {}
}
