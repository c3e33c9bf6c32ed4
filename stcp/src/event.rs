//! Wake reasons for the per-connection event loop.

use std::fmt;

/// One reason the engine may be woken.
///
/// Variants are declared in service priority order: when several are
/// signalled at once the engine handles the first one in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Event {
    /// A deadline passed.
    Timeout,
    /// A datagram is waiting to be received.
    NetworkData,
    /// The application has bytes to send.
    AppData,
    /// The application asked to close its half of the stream.
    AppClose,
}

impl Event {
    pub const ALL: [Event; 4] = [
        Event::Timeout,
        Event::NetworkData,
        Event::AppData,
        Event::AppClose,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// A set of [`Event`]s.  Used both for the interest passed to
/// [`crate::host::Host::wait_for_event`] and for what it reports back.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSet {
    bits: u8,
}

impl EventSet {
    pub const fn empty() -> Self {
        EventSet { bits: 0 }
    }

    pub fn insert(&mut self, event: Event) {
        self.bits |= event.bit();
    }

    pub fn with(mut self, event: Event) -> Self {
        self.insert(event);
        self
    }

    pub fn contains(&self, event: Event) -> bool {
        self.bits & event.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// The highest-priority event in the set.
    pub fn first(&self) -> Option<Event> {
        self.iter().next()
    }

    /// Iterate in service priority order.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        Event::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl FromIterator<Event> for EventSet {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let mut set = EventSet::empty();
        for event in iter {
            set.insert(event);
        }
        set
    }
}

impl From<Event> for EventSet {
    fn from(event: Event) -> Self {
        EventSet::empty().with(event)
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
