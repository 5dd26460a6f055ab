//! Room abstraction for the relay.
//!
//! Rooms are ephemeral groups of connections created by one connection, the
//! creator. Members are kept in join order, which is also broadcast order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sync_protocol::DemoStatus;
use sync_transport::ConnectionId;
use tracing::trace;

/// A room identifier.
pub type RoomId = String;

/// Length of a room identifier.
pub const ROOM_ID_LENGTH: usize = 5;

/// Characters room identifiers are drawn from.
pub const ROOM_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Check that a string has the shape of a room identifier.
#[must_use]
pub fn is_valid_room_id(id: &str) -> bool {
    id.len() == ROOM_ID_LENGTH && id.bytes().all(|b| ROOM_ID_ALPHABET.contains(&b))
}

/// Source of candidate room identifiers.
///
/// Candidates need not be unique; the room manager rejects collisions.
pub trait RoomIdSource: Send {
    /// Produce the next candidate identifier.
    fn candidate(&mut self) -> RoomId;
}

/// Uniformly random room identifiers.
pub struct RandomRoomIds {
    rng: StdRng,
}

impl RandomRoomIds {
    /// Create a source seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Create a deterministic source.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomRoomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomIdSource for RandomRoomIds {
    fn candidate(&mut self) -> RoomId {
        (0..ROOM_ID_LENGTH)
            .map(|_| ROOM_ID_ALPHABET[self.rng.random_range(0..ROOM_ID_ALPHABET.len())] as char)
            .collect()
    }
}

/// Draw candidates until one is not taken.
pub fn allocate_room_id(
    source: &mut dyn RoomIdSource,
    is_taken: impl Fn(&str) -> bool,
) -> RoomId {
    loop {
        let candidate = source.candidate();
        if !is_taken(&candidate) {
            return candidate;
        }
        trace!(room = %candidate, "Room id collision, retrying");
    }
}

/// A room of connections.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room identifier.
    id: RoomId,
    /// Connection that created the room.
    creator: ConnectionId,
    /// Members in join order. The creator is always the first member.
    members: Vec<ConnectionId>,
    /// Last playback state reported by the creator.
    playback: DemoStatus,
}

impl Room {
    /// Create a room whose sole member is its creator.
    #[must_use]
    pub fn new(id: impl Into<RoomId>, creator: ConnectionId) -> Self {
        Self {
            id: id.into(),
            members: vec![creator.clone()],
            creator,
            playback: DemoStatus::idle(),
        }
    }

    /// Get the room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the creator.
    #[must_use]
    pub fn creator(&self) -> &ConnectionId {
        &self.creator
    }

    /// Check if a connection created this room.
    #[must_use]
    pub fn is_creator(&self, connection_id: &ConnectionId) -> bool {
        &self.creator == connection_id
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn is_member(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains(connection_id)
    }

    /// Members in join order.
    #[must_use]
    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Append a member.
    ///
    /// Returns `false` if the connection was already a member.
    pub fn add_member(&mut self, connection_id: ConnectionId) -> bool {
        if self.is_member(&connection_id) {
            return false;
        }
        self.members.push(connection_id);
        true
    }

    /// Remove a member, keeping the order of the rest.
    ///
    /// Returns `true` if the connection was a member.
    pub fn remove_member(&mut self, connection_id: &ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != connection_id);
        self.members.len() != before
    }

    /// Connections a broadcast reaches, in delivery order.
    ///
    /// The creator is appended when `include_creator` is set and it is not
    /// already among the members.
    #[must_use]
    pub fn recipients(&self, include_creator: bool) -> Vec<ConnectionId> {
        let mut recipients = self.members.clone();
        if include_creator && !self.is_member(&self.creator) {
            recipients.push(self.creator.clone());
        }
        recipients
    }

    /// Last reported playback state.
    #[must_use]
    pub fn playback(&self) -> &DemoStatus {
        &self.playback
    }

    /// Replace the playback state.
    pub fn set_playback(&mut self, status: DemoStatus) {
        self.playback = status;
    }
}
