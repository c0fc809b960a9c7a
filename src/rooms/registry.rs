//! In-memory room membership.
//!
//! The registry is the only owner of the room → members mapping. Everything
//! else goes through [`Registry::join`], [`Registry::leave`] and
//! [`Registry::with_members`]. One lock guards the whole table, so a count is
//! never observed mid-mutation.

use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub type HandleId = Uuid;

/// One live connection, as seen by the registry and the dispatcher.
#[derive(Debug, Clone)]
pub struct Handle {
    id: HandleId,
    tx: mpsc::Sender<Utf8Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
    Closed,
}

impl Handle {
    pub fn new(tx: mpsc::Sender<Utf8Bytes>) -> Self {
        Self { id: Uuid::now_v7(), tx }
    }

    /// A handle plus the receiving end of its bounded outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Never waits: a full queue drops the frame for this handle only.
    pub fn push(&self, frame: Utf8Bytes) -> Result<(), PushError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

/// What a successful [`Registry::leave`] did to the handle's room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    Remaining { room: String, count: usize },
    /// The last member left and the room entry was dropped.
    TornDown { room: String },
}

/// Read-only view of one room's members, only valid under the registry lock.
#[derive(Clone, Copy)]
pub struct Members<'a>(Option<&'a HashMap<HandleId, Handle>>);

impl<'a> Members<'a> {
    pub fn len(self) -> usize {
        self.0.map_or(0, HashMap::len)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn iter(self) -> impl Iterator<Item = &'a Handle> {
        self.0.into_iter().flat_map(HashMap::values)
    }
}

/// Outcome of [`Registry::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// Live count of the joined room.
    pub count: usize,
    pub moved_from: Option<Departure>,
}

#[derive(Default)]
pub struct Registry {
    inner: Mutex<Rooms>,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<String, HashMap<HandleId, Handle>>,
    room_of: HashMap<HandleId, String>,
}

impl Rooms {
    fn remove(&mut self, id: HandleId) -> Option<Departure> {
        let room = self.room_of.remove(&id)?;
        let members = self.members.get_mut(&room)?;
        members.remove(&id);

        if members.is_empty() {
            self.members.remove(&room);
            Some(Departure::TornDown { room })
        } else {
            let count = members.len();
            Some(Departure::Remaining { room, count })
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle` to `room`, creating the room if needed.
    ///
    /// Joining the room the handle is already in changes nothing. A handle
    /// that belongs to another room is moved, so it is never in two rooms;
    /// the old room's [`Departure`] comes back in [`Joined::moved_from`].
    pub fn join(&self, room: &str, handle: Handle) -> Joined {
        let mut guard = self.inner.lock();
        let rooms = &mut *guard;

        let moved_from = match rooms.room_of.get(&handle.id).cloned() {
            Some(current) if current == room => {
                let count = rooms.members.get(room).map_or(0, HashMap::len);
                return Joined { count, moved_from: None };
            }
            Some(_) => rooms.remove(handle.id),
            None => None,
        };

        rooms.room_of.insert(handle.id, room.to_owned());
        let members = rooms.members.entry(room.to_owned()).or_default();
        members.insert(handle.id, handle);
        Joined { count: members.len(), moved_from }
    }

    /// Removes `handle` from its room. `None` if it was not a member, which
    /// makes repeated calls harmless.
    pub fn leave(&self, handle: &Handle) -> Option<Departure> {
        self.inner.lock().remove(handle.id)
    }

    /// Live member count; 0 for rooms with nobody connected.
    pub fn count_of(&self, room: &str) -> usize {
        self.inner.lock().members.get(room).map_or(0, HashMap::len)
    }

    /// Codes of every room with at least one live member.
    pub fn rooms(&self) -> Vec<String> {
        self.inner.lock().members.keys().cloned().collect()
    }

    /// Runs `f` over the members of `room` while holding the lock. `f` must not block.
    pub fn with_members<R>(&self, room: &str, f: impl FnOnce(Members<'_>) -> R) -> R {
        let guard = self.inner.lock();
        f(Members(guard.members.get(room)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn handle() -> Handle {
        Handle::channel(8).0
    }

    #[test]
    fn join_counts_members_per_room() {
        let registry = Registry::new();
        assert_eq!(registry.join("AAAAAA", handle()).count, 1);
        assert_eq!(registry.join("AAAAAA", handle()).count, 2);
        assert_eq!(registry.join("BBBBBB", handle()).count, 1);

        assert_eq!(registry.count_of("AAAAAA"), 2);
        assert_eq!(registry.count_of("BBBBBB"), 1);
        assert_eq!(registry.count_of("CCCCCC"), 0);
    }

    #[test]
    fn leave_reports_remaining_then_teardown() {
        let registry = Registry::new();
        let (a, b) = (handle(), handle());
        registry.join("AAAAAA", a.clone());
        registry.join("AAAAAA", b.clone());

        assert_eq!(
            registry.leave(&a),
            Some(Departure::Remaining { room: "AAAAAA".into(), count: 1 })
        );
        assert_eq!(registry.leave(&b), Some(Departure::TornDown { room: "AAAAAA".into() }));
        assert!(registry.rooms().is_empty());
    }

    #[test]
    fn second_leave_is_a_noop() {
        let registry = Registry::new();
        let (a, b) = (handle(), handle());
        registry.join("AAAAAA", a.clone());
        registry.join("AAAAAA", b);

        assert!(registry.leave(&a).is_some());
        assert_eq!(registry.leave(&a), None);
        assert_eq!(registry.count_of("AAAAAA"), 1);
    }

    #[test]
    fn leave_without_join_is_a_noop() {
        let registry = Registry::new();
        assert_eq!(registry.leave(&handle()), None);
    }

    #[test]
    fn rejoining_the_same_room_does_not_duplicate() {
        let registry = Registry::new();
        let a = handle();
        assert_eq!(registry.join("AAAAAA", a.clone()), Joined { count: 1, moved_from: None });
        assert_eq!(registry.join("AAAAAA", a.clone()), Joined { count: 1, moved_from: None });
        assert_eq!(registry.count_of("AAAAAA"), 1);
    }

    #[test]
    fn joining_another_room_moves_the_handle() {
        let registry = Registry::new();
        let (a, b) = (handle(), handle());
        registry.join("AAAAAA", a.clone());
        registry.join("AAAAAA", b);

        let joined = registry.join("BBBBBB", a.clone());
        assert_eq!(joined.count, 1);
        assert_eq!(joined.moved_from, Some(Departure::Remaining { room: "AAAAAA".into(), count: 1 }));
        assert_eq!(registry.count_of("AAAAAA"), 1);
        assert_eq!(registry.leave(&a), Some(Departure::TornDown { room: "BBBBBB".into() }));
    }

    #[test]
    fn net_count_matches_outstanding_joins() {
        let registry = Registry::new();
        let handles: Vec<_> = (0..10).map(|_| handle()).collect();

        for (i, h) in handles.iter().enumerate() {
            assert_eq!(registry.join("AAAAAA", h.clone()).count, i + 1);
        }
        for (i, h) in handles.iter().enumerate() {
            let left = registry.leave(h);
            let outstanding = handles.len() - i - 1;
            assert_eq!(registry.count_of("AAAAAA"), outstanding);
            if outstanding == 0 {
                assert_eq!(left, Some(Departure::TornDown { room: "AAAAAA".into() }));
                assert!(!registry.rooms().contains(&"AAAAAA".to_owned()));
            } else {
                assert!(registry.rooms().contains(&"AAAAAA".to_owned()));
            }
        }
    }

    #[test]
    fn moving_the_last_member_tears_the_old_room_down() {
        let registry = Registry::new();
        let a = handle();
        registry.join("AAAAAA", a.clone());

        let joined = registry.join("BBBBBB", a);
        assert_eq!(joined.moved_from, Some(Departure::TornDown { room: "AAAAAA".into() }));
        assert_eq!(registry.rooms(), vec!["BBBBBB".to_owned()]);
    }

    #[test]
    fn with_members_sees_the_room_snapshot() {
        let registry = Registry::new();
        let a = handle();
        registry.join("AAAAAA", a.clone());

        let ids: Vec<_> = registry.with_members("AAAAAA", |m| m.iter().map(Handle::id).collect());
        assert_eq!(ids, vec![a.id()]);
        assert!(registry.with_members("BBBBBB", |m| m.is_empty()));
    }

    #[test]
    fn push_to_dropped_receiver_is_closed() {
        let (h, rx) = Handle::channel(1);
        drop(rx);
        assert_eq!(h.push(Utf8Bytes::from_static("x")), Err(PushError::Closed));
    }

    #[test]
    fn push_to_full_queue_is_full() {
        let (h, _rx) = Handle::channel(1);
        assert_eq!(h.push(Utf8Bytes::from_static("x")), Ok(()));
        assert_eq!(h.push(Utf8Bytes::from_static("y")), Err(PushError::Full));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_and_leaves_settle() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();

        for i in 0..64 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let h = handle();
                registry.join("AAAAAA", h.clone());
                if i % 2 == 0 {
                    registry.leave(&h);
                    registry.leave(&h);
                }
                h
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            kept.push(task.await.unwrap());
        }

        assert_eq!(registry.count_of("AAAAAA"), 32);
        for h in &kept {
            registry.leave(h);
        }
        assert_eq!(registry.count_of("AAAAAA"), 0);
        assert!(registry.rooms().is_empty());
    }
}
