//! Wire frame helpers. Frame shapes follow the `nostr` crate's own
//! `ClientMessage`/`RelayMessage` types (reused here rather than
//! hand-rolled, since they already encode exactly the JSON arrays in
//! `["EVENT", ...]` / `["REQ", sub_id, filter, ...]` / `["OK", ...]` form).

use std::collections::VecDeque;

use nostr_sdk::{ClientMessage, Event, EventId, Filter, RelayMessage, SubscriptionId};

use crate::error::{Error, Result};

pub fn encode_event(event: &Event) -> String {
    ClientMessage::event(event.clone()).as_json()
}

pub fn encode_req(sub_id: &SubscriptionId, filters: &[Filter]) -> String {
    ClientMessage::req(sub_id.clone(), filters.to_vec()).as_json()
}

pub fn encode_close(sub_id: &SubscriptionId) -> String {
    ClientMessage::close(sub_id.clone()).as_json()
}

pub fn decode(text: &str) -> Result<RelayMessage> {
    RelayMessage::from_json(text).map_err(|e| Error::MalformedFrame(e.to_string()))
}

/// An id set bounded at `capacity` entries; when full, the oldest half is
/// discarded. Mirrors the original client's `_seen_events` trimming so
/// `listen()` never yields the same event id twice while it's remembered.
pub struct DedupSet {
    capacity: usize,
    order: VecDeque<EventId>,
    seen: std::collections::HashSet<EventId>,
}

impl DedupSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            seen: std::collections::HashSet::new(),
        }
    }

    /// Returns `true` if this id has not been seen before (and records it).
    pub fn insert_if_new(&mut self, id: EventId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id);
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            let half = self.order.len() / 2;
            for _ in 0..half {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::Keys;

    fn fake_id(i: u64) -> EventId {
        use nostr_sdk::{EventBuilder, Kind};
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, format!("msg-{i}"))
            .sign_with_keys(&keys)
            .unwrap();
        event.id
    }

    #[test]
    fn rejects_a_repeated_id() {
        let mut set = DedupSet::new(10);
        let id = fake_id(1);
        assert!(set.insert_if_new(id));
        assert!(!set.insert_if_new(id));
    }

    #[test]
    fn halves_when_capacity_exceeded() {
        let mut set = DedupSet::new(4);
        for i in 0..6 {
            set.insert_if_new(fake_id(i));
        }
        assert!(set.len() <= 4);
    }
}
