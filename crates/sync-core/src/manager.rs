//! Room lifecycle and authorization.
//!
//! The room manager owns every live room. Handlers mutate room and
//! connection state, then queue replies and broadcasts on an [`Outgoing`]
//! queue; they never write to a socket themselves.
//!
//! A room is either open or gone. Creation and destruction happen inside a
//! single handler call, so no intermediate state is observable.

use std::collections::HashMap;
use sync_protocol::{DemoStatus, RelayMessage};
use sync_transport::ConnectionId;
use thiserror::Error;
use tracing::{debug, info};

use crate::message::Outgoing;
use crate::registry::Registry;
use crate::room::{allocate_room_id, RandomRoomIds, Room, RoomId, RoomIdSource};

/// Error text sent when joining a room that does not exist.
pub const ROOM_NOT_FOUND_MESSAGE: &str = "Room does not exist.";

/// Room errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// No live room has this id.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// The connection is not allowed to act on the room.
    #[error("Connection {connection} is not the creator of room {room}")]
    Unauthorized {
        /// Room the action targeted.
        room: RoomId,
        /// Connection that attempted it.
        connection: ConnectionId,
    },

    /// The connection is not in any room.
    #[error("Connection {0} is not in a room")]
    NotInRoom(ConnectionId),
}

/// What a join request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection became a member.
    Joined,
    /// The connection was already in the room; nothing changed.
    AlreadyMember,
}

/// Owner of all live rooms.
pub struct RoomManager {
    /// Rooms indexed by id.
    rooms: HashMap<RoomId, Room>,
    /// Candidate id generator.
    ids: Box<dyn RoomIdSource>,
}

impl RoomManager {
    /// Create a manager with randomly generated room ids.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_source(Box::new(RandomRoomIds::new()))
    }

    /// Create a manager drawing room ids from `ids`.
    #[must_use]
    pub fn with_id_source(ids: Box<dyn RoomIdSource>) -> Self {
        Self {
            rooms: HashMap::new(),
            ids,
        }
    }

    /// Look up a room.
    #[must_use]
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Ids of all live rooms.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    /// Create a room owned by `requester` and reply with its id.
    ///
    /// A requester that is already in a room leaves it first.
    pub fn create_room(
        &mut self,
        registry: &mut Registry,
        requester: &ConnectionId,
        out: &mut Outgoing,
    ) -> RoomId {
        self.leave_room(registry, requester, out);

        let rooms = &self.rooms;
        let room_id = allocate_room_id(self.ids.as_mut(), |candidate| rooms.contains_key(candidate));

        self.rooms
            .insert(room_id.clone(), Room::new(room_id.clone(), requester.clone()));
        registry.set_current_room(requester, Some(room_id.clone()));

        info!(room = %room_id, creator = %requester, rooms = self.rooms.len(), "Created room");

        out.push(requester.clone(), RelayMessage::room_created(room_id.clone()));
        room_id
    }

    /// Add `requester` to a room.
    ///
    /// Joining an unknown room replies with `RoomFailedToJoin`. Joining the
    /// room one is already in (including one's own room) changes nothing and
    /// sends nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomNotFound`] if no such room exists.
    pub fn join_room(
        &mut self,
        registry: &mut Registry,
        requester: &ConnectionId,
        room_id: &str,
        out: &mut Outgoing,
    ) -> Result<JoinOutcome, RoomError> {
        let Some(room) = self.rooms.get(room_id) else {
            out.push(
                requester.clone(),
                RelayMessage::room_failed_to_join(ROOM_NOT_FOUND_MESSAGE),
            );
            return Err(RoomError::RoomNotFound(room_id.to_string()));
        };

        if room.is_creator(requester) || room.is_member(requester) {
            debug!(room = %room_id, connection = %requester, "Already in room, join ignored");
            return Ok(JoinOutcome::AlreadyMember);
        }

        self.leave_room(registry, requester, out);

        // The room cannot have been destroyed by that leave: the requester is
        // not its creator.
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Err(RoomError::RoomNotFound(room_id.to_string()));
        };
        room.add_member(requester.clone());
        registry.set_current_room(requester, Some(room_id.to_string()));

        debug!(
            room = %room_id,
            connection = %requester,
            members = room.member_count(),
            "Joined room"
        );

        out.push(requester.clone(), RelayMessage::room_joined(room_id));
        Ok(JoinOutcome::Joined)
    }

    /// Destroy a room on behalf of `requester`.
    ///
    /// Nothing is sent when the room is unknown or the requester is not its
    /// creator.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomNotFound`] or [`RoomError::Unauthorized`].
    pub fn destroy_room(
        &mut self,
        registry: &mut Registry,
        requester: &ConnectionId,
        room_id: &str,
        out: &mut Outgoing,
    ) -> Result<(), RoomError> {
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        if !room.is_creator(requester) {
            return Err(RoomError::Unauthorized {
                room: room_id.to_string(),
                connection: requester.clone(),
            });
        }

        self.destroy(registry, room_id, out);
        Ok(())
    }

    /// Take `connection` out of its current room.
    ///
    /// A creator leaving destroys the room. Any other member is removed and
    /// `LeftRoom` goes to the remaining members and back to the leaver.
    /// Returns the room that was left, if any.
    pub fn leave_room(
        &mut self,
        registry: &mut Registry,
        connection: &ConnectionId,
        out: &mut Outgoing,
    ) -> Option<RoomId> {
        let room_id = registry.current_room(connection)?.clone();

        let Some(room) = self.rooms.get_mut(&room_id) else {
            registry.set_current_room(connection, None);
            return Some(room_id);
        };

        if room.is_creator(connection) {
            self.destroy(registry, &room_id, out);
            return Some(room_id);
        }

        room.remove_member(connection);
        registry.set_current_room(connection, None);

        debug!(
            room = %room_id,
            connection = %connection,
            members = room.member_count(),
            "Left room"
        );

        let notice = RelayMessage::left_room(room_id.clone(), connection.as_str());
        out.push_all(room.recipients(false), &notice);
        out.push(connection.clone(), notice);

        Some(room_id)
    }

    /// Send `message` to every member of a room, in join order.
    ///
    /// The creator is added when `include_creator` is set and it is not a
    /// member. Unknown rooms are ignored.
    pub fn broadcast(
        &self,
        room_id: &str,
        message: &RelayMessage,
        include_creator: bool,
        out: &mut Outgoing,
    ) {
        if let Some(room) = self.rooms.get(room_id) {
            out.push_all(room.recipients(include_creator), message);
        }
    }

    /// Record the playback state reported by a room's creator and relay it
    /// to the other members.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotInRoom`] if the reporter has no room, or
    /// [`RoomError::Unauthorized`] if it did not create its room.
    pub fn update_demo_state(
        &mut self,
        registry: &Registry,
        reporter: &ConnectionId,
        status: DemoStatus,
        out: &mut Outgoing,
    ) -> Result<(), RoomError> {
        let room_id = registry
            .current_room(reporter)
            .ok_or_else(|| RoomError::NotInRoom(reporter.clone()))?;

        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))?;

        if !room.is_creator(reporter) {
            return Err(RoomError::Unauthorized {
                room: room_id.clone(),
                connection: reporter.clone(),
            });
        }

        room.set_playback(status.clone());

        let message = RelayMessage::room_demo_state(status);
        let others = room
            .recipients(false)
            .into_iter()
            .filter(|member| member != reporter);
        out.push_all(others, &message);

        Ok(())
    }

    /// Broadcast `DestroyRoom` to the members, then delete the room.
    fn destroy(&mut self, registry: &mut Registry, room_id: &str, out: &mut Outgoing) {
        self.broadcast(room_id, &RelayMessage::destroy_room(room_id), true, out);

        if let Some(room) = self.rooms.remove(room_id) {
            for member in room.recipients(true) {
                if registry.current_room(&member).map(String::as_str) == Some(room_id) {
                    registry.set_current_room(&member, None);
                }
            }
            info!(room = %room_id, rooms = self.rooms.len(), "Destroyed room");
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{is_valid_room_id, RandomRoomIds};
    use std::collections::HashSet;
    use sync_transport::Outbox;
    use tokio::sync::mpsc;

    struct Scripted(Vec<&'static str>);

    impl RoomIdSource for Scripted {
        fn candidate(&mut self) -> RoomId {
            self.0.remove(0).to_string()
        }
    }

    fn connect(registry: &mut Registry) -> ConnectionId {
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        registry.register(Box::new(tx) as Box<dyn Outbox>, None)
    }

    fn seeded() -> RoomManager {
        RoomManager::with_id_source(Box::new(RandomRoomIds::seeded(1)))
    }

    fn messages_for(out: &Outgoing, target: &ConnectionId) -> Vec<RelayMessage> {
        out.deliveries()
            .iter()
            .filter(|d| &d.target == target)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn test_create_room_replies_with_id() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);

        assert!(is_valid_room_id(&room_id));
        assert_eq!(out.deliveries().len(), 1);
        assert_eq!(
            messages_for(&out, &alice),
            vec![RelayMessage::room_created(room_id.clone())]
        );
        let room = rooms.room(&room_id).unwrap();
        assert_eq!(room.creator(), &alice);
        assert_eq!(room.members(), &[alice.clone()]);
        assert_eq!(registry.current_room(&alice), Some(&room_id));
    }

    #[test]
    fn test_created_ids_are_unique() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let mut out = Outgoing::new();

        let ids: HashSet<RoomId> = (0..500)
            .map(|_| {
                let peer = connect(&mut registry);
                rooms.create_room(&mut registry, &peer, &mut out)
            })
            .collect();

        assert_eq!(ids.len(), 500);
        assert_eq!(rooms.room_count(), 500);
        assert!(ids.iter().all(|id| is_valid_room_id(id)));
    }

    #[test]
    fn test_create_room_retries_on_collision() {
        let mut registry = Registry::new();
        let mut rooms =
            RoomManager::with_id_source(Box::new(Scripted(vec!["AAAAA", "AAAAA", "BBBBB"])));
        let mut out = Outgoing::new();

        let a = connect(&mut registry);
        let b = connect(&mut registry);
        assert_eq!(rooms.create_room(&mut registry, &a, &mut out), "AAAAA");
        assert_eq!(rooms.create_room(&mut registry, &b, &mut out), "BBBBB");
    }

    #[test]
    fn test_join_room() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        out.drain();

        let outcome = rooms.join_room(&mut registry, &bob, &room_id, &mut out);
        assert_eq!(outcome, Ok(JoinOutcome::Joined));
        assert_eq!(
            messages_for(&out, &bob),
            vec![RelayMessage::room_joined(room_id.clone())]
        );
        assert!(messages_for(&out, &alice).is_empty());
        assert_eq!(rooms.room(&room_id).unwrap().members(), &[alice, bob.clone()]);
        assert_eq!(registry.current_room(&bob), Some(&room_id));
    }

    #[test]
    fn test_join_nonexistent_room() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let outcome = rooms.join_room(&mut registry, &bob, "ZZZZZ", &mut out);

        assert_eq!(outcome, Err(RoomError::RoomNotFound("ZZZZZ".to_string())));
        assert_eq!(
            out.deliveries(),
            &[crate::message::Delivery::new(
                bob.clone(),
                RelayMessage::room_failed_to_join("Room does not exist.")
            )]
        );
        assert_eq!(rooms.room_count(), 0);
        assert!(registry.current_room(&bob).is_none());
    }

    #[test]
    fn test_creator_joining_own_room_is_noop() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        out.drain();

        let outcome = rooms.join_room(&mut registry, &alice, &room_id, &mut out);

        assert_eq!(outcome, Ok(JoinOutcome::AlreadyMember));
        assert!(out.is_empty());
        assert_eq!(rooms.room(&room_id).unwrap().members(), &[alice.clone()]);
        assert_eq!(registry.current_room(&alice), Some(&room_id));
    }

    #[test]
    fn test_member_cannot_double_join() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        out.drain();

        let outcome = rooms.join_room(&mut registry, &bob, &room_id, &mut out);

        assert_eq!(outcome, Ok(JoinOutcome::AlreadyMember));
        assert!(out.is_empty());
        assert_eq!(rooms.room(&room_id).unwrap().member_count(), 2);
    }

    #[test]
    fn test_join_leaves_previous_room() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let carol = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let first = rooms.create_room(&mut registry, &alice, &mut out);
        let second = rooms.create_room(&mut registry, &carol, &mut out);
        rooms.join_room(&mut registry, &bob, &first, &mut out).unwrap();
        out.drain();

        rooms.join_room(&mut registry, &bob, &second, &mut out).unwrap();

        let left = RelayMessage::left_room(first.clone(), bob.as_str());
        assert_eq!(messages_for(&out, &alice), vec![left.clone()]);
        assert_eq!(
            messages_for(&out, &bob),
            vec![left, RelayMessage::room_joined(second.clone())]
        );
        assert!(!rooms.room(&first).unwrap().is_member(&bob));
        assert!(rooms.room(&second).unwrap().is_member(&bob));
        assert_eq!(registry.current_room(&bob), Some(&second));
    }

    #[test]
    fn test_destroy_by_creator_broadcasts_and_removes() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let carol = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        rooms.join_room(&mut registry, &carol, &room_id, &mut out).unwrap();
        out.drain();

        rooms
            .destroy_room(&mut registry, &alice, &room_id, &mut out)
            .unwrap();

        let order: Vec<&ConnectionId> = out.deliveries().iter().map(|d| &d.target).collect();
        assert_eq!(order, vec![&alice, &bob, &carol]);
        assert!(out
            .deliveries()
            .iter()
            .all(|d| d.message == RelayMessage::destroy_room(room_id.clone())));

        assert!(!rooms.room_exists(&room_id));
        assert!(registry.current_room(&bob).is_none());
        assert!(registry.current_room(&alice).is_none());

        // The id now behaves as nonexistent.
        out.drain();
        assert_eq!(
            rooms.join_room(&mut registry, &bob, &room_id, &mut out),
            Err(RoomError::RoomNotFound(room_id))
        );
    }

    #[test]
    fn test_destroy_by_non_creator_is_silent() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        out.drain();

        let result = rooms.destroy_room(&mut registry, &bob, &room_id, &mut out);

        assert!(matches!(result, Err(RoomError::Unauthorized { .. })));
        assert!(out.is_empty());
        assert_eq!(rooms.room(&room_id).unwrap().member_count(), 2);
        assert_eq!(registry.current_room(&bob), Some(&room_id));
    }

    #[test]
    fn test_destroy_unknown_room_is_silent() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let mut out = Outgoing::new();

        let result = rooms.destroy_room(&mut registry, &alice, "nope1", &mut out);

        assert_eq!(result, Err(RoomError::RoomNotFound("nope1".to_string())));
        assert!(out.is_empty());
    }

    #[test]
    fn test_creator_leaving_destroys_room() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        out.drain();

        assert_eq!(
            rooms.leave_room(&mut registry, &alice, &mut out),
            Some(room_id.clone())
        );

        assert_eq!(
            messages_for(&out, &bob),
            vec![RelayMessage::destroy_room(room_id.clone())]
        );
        assert!(!rooms.room_exists(&room_id));
        assert!(registry.current_room(&bob).is_none());
    }

    #[test]
    fn test_member_leaving_notifies_and_keeps_room() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let carol = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        rooms.join_room(&mut registry, &carol, &room_id, &mut out).unwrap();
        out.drain();

        rooms.leave_room(&mut registry, &bob, &mut out);

        let notice = RelayMessage::left_room(room_id.clone(), bob.as_str());
        let order: Vec<&ConnectionId> = out.deliveries().iter().map(|d| &d.target).collect();
        assert_eq!(order, vec![&alice, &carol, &bob]);
        assert!(out.deliveries().iter().all(|d| d.message == notice));

        let room = rooms.room(&room_id).unwrap();
        assert_eq!(room.members(), &[alice, carol]);
        assert!(registry.current_room(&bob).is_none());
    }

    #[test]
    fn test_leave_without_room_is_noop() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let mut out = Outgoing::new();

        assert_eq!(rooms.leave_room(&mut registry, &alice, &mut out), None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_create_room_leaves_current_room() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let first = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &first, &mut out).unwrap();
        out.drain();

        let second = rooms.create_room(&mut registry, &alice, &mut out);

        assert!(!rooms.room_exists(&first));
        assert!(rooms.room_exists(&second));
        assert_eq!(
            messages_for(&out, &bob),
            vec![RelayMessage::destroy_room(first)]
        );
        assert_eq!(registry.current_room(&alice), Some(&second));
    }

    #[test]
    fn test_broadcast_unknown_room_is_noop() {
        let rooms = seeded();
        let mut out = Outgoing::new();

        rooms.broadcast("ghost", &RelayMessage::Ready, true, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_demo_state_from_creator_is_relayed() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        out.drain();

        let status = DemoStatus::playing(450, 9000, 7.5, "match1.dem");
        rooms
            .update_demo_state(&registry, &alice, status.clone(), &mut out)
            .unwrap();

        assert_eq!(
            out.deliveries(),
            &[crate::message::Delivery::new(
                bob,
                RelayMessage::room_demo_state(status.clone())
            )]
        );
        assert_eq!(rooms.room(&room_id).unwrap().playback(), &status);
    }

    #[test]
    fn test_demo_state_from_member_is_dropped() {
        let mut registry = Registry::new();
        let mut rooms = seeded();
        let alice = connect(&mut registry);
        let bob = connect(&mut registry);
        let loner = connect(&mut registry);
        let mut out = Outgoing::new();

        let room_id = rooms.create_room(&mut registry, &alice, &mut out);
        rooms.join_room(&mut registry, &bob, &room_id, &mut out).unwrap();
        out.drain();

        let status = DemoStatus::playing(1, 2, 0.1, "x.dem");
        assert!(matches!(
            rooms.update_demo_state(&registry, &bob, status.clone(), &mut out),
            Err(RoomError::Unauthorized { .. })
        ));
        assert_eq!(
            rooms.update_demo_state(&registry, &loner, status, &mut out),
            Err(RoomError::NotInRoom(loner))
        );
        assert!(out.is_empty());
        assert!(!rooms.room(&room_id).unwrap().playback().currently_playing);
    }
}
