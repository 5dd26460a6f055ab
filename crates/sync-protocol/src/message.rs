//! Message types for the relay protocol.
//!
//! Messages are value types with no identity. They are the unit of transport
//! between peers and the relay.

use serde::{Deserialize, Serialize};

/// Message kind identifiers.
///
/// This is the closed set of `type` discriminants the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ready,
    CreateRoom,
    JoinRoom,
    DestroyRoom,
    RoomCreated,
    RoomJoined,
    RoomFailedToJoin,
    LeftRoom,
    RoomDemoState,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [MessageKind; 9] = [
        MessageKind::Ready,
        MessageKind::CreateRoom,
        MessageKind::JoinRoom,
        MessageKind::DestroyRoom,
        MessageKind::RoomCreated,
        MessageKind::RoomJoined,
        MessageKind::RoomFailedToJoin,
        MessageKind::LeftRoom,
        MessageKind::RoomDemoState,
    ];

    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Ready => "ready",
            MessageKind::CreateRoom => "create_room",
            MessageKind::JoinRoom => "join_room",
            MessageKind::DestroyRoom => "destroy_room",
            MessageKind::RoomCreated => "room_created",
            MessageKind::RoomJoined => "room_joined",
            MessageKind::RoomFailedToJoin => "room_failed_to_join",
            MessageKind::LeftRoom => "left_room",
            MessageKind::RoomDemoState => "room_demo_state",
        }
    }

    /// Look up a kind by its wire name.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether peers are allowed to send this kind to the relay.
    #[must_use]
    pub fn is_client_to_server(self) -> bool {
        matches!(
            self,
            MessageKind::CreateRoom
                | MessageKind::JoinRoom
                | MessageKind::DestroyRoom
                | MessageKind::RoomDemoState
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playback state of a replay on one peer.
///
/// Everything except `currently_playing` is absent until a peer reports an
/// actual playback position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoStatus {
    /// Whether a replay is being played right now.
    pub currently_playing: bool,
    /// Current tick of the replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tick: Option<u64>,
    /// Total number of ticks in the replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ticks: Option<u64>,
    /// Total playtime of the replay in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_playtime_minutes: Option<f64>,
    /// File name of the replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl DemoStatus {
    /// Status reporting that nothing is playing.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// Status reporting an active playback position.
    #[must_use]
    pub fn playing(
        current_tick: u64,
        total_ticks: u64,
        total_playtime_minutes: f64,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            currently_playing: true,
            current_tick: Some(current_tick),
            total_ticks: Some(total_ticks),
            total_playtime_minutes: Some(total_playtime_minutes),
            file_name: Some(file_name.into()),
        }
    }
}

/// A relay protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    /// Sent once to every new connection.
    #[serde(rename = "ready")]
    Ready,

    /// Ask the relay to create a room owned by the sender.
    #[serde(rename = "create_room")]
    CreateRoom,

    /// Ask to join an existing room.
    #[serde(rename = "join_room")]
    JoinRoom {
        /// Room to join.
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Destroy a room. Sent by the creator, broadcast by the relay.
    #[serde(rename = "destroy_room")]
    DestroyRoom {
        /// Room being destroyed.
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// A room was created for the requester.
    #[serde(rename = "room_created")]
    RoomCreated {
        /// Identifier of the new room.
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// The requester joined a room.
    #[serde(rename = "room_joined")]
    RoomJoined {
        /// Identifier of the joined room.
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// A join request failed.
    #[serde(rename = "room_failed_to_join")]
    RoomFailedToJoin {
        /// Human-readable reason.
        error: String,
    },

    /// A member left a room.
    #[serde(rename = "left_room")]
    LeftRoom {
        /// Room that was left.
        #[serde(rename = "roomId")]
        room_id: String,
        /// Connection that left.
        #[serde(rename = "connectionId")]
        connection_id: String,
    },

    /// Playback position of the room's creator.
    #[serde(rename = "room_demo_state")]
    RoomDemoState {
        /// Reported playback state.
        #[serde(rename = "demoStatus")]
        demo_status: DemoStatus,
    },
}

impl RelayMessage {
    /// Get the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            RelayMessage::Ready => MessageKind::Ready,
            RelayMessage::CreateRoom => MessageKind::CreateRoom,
            RelayMessage::JoinRoom { .. } => MessageKind::JoinRoom,
            RelayMessage::DestroyRoom { .. } => MessageKind::DestroyRoom,
            RelayMessage::RoomCreated { .. } => MessageKind::RoomCreated,
            RelayMessage::RoomJoined { .. } => MessageKind::RoomJoined,
            RelayMessage::RoomFailedToJoin { .. } => MessageKind::RoomFailedToJoin,
            RelayMessage::LeftRoom { .. } => MessageKind::LeftRoom,
            RelayMessage::RoomDemoState { .. } => MessageKind::RoomDemoState,
        }
    }

    /// Create a new JoinRoom message.
    #[must_use]
    pub fn join_room(room_id: impl Into<String>) -> Self {
        RelayMessage::JoinRoom {
            room_id: room_id.into(),
        }
    }

    /// Create a new DestroyRoom message.
    #[must_use]
    pub fn destroy_room(room_id: impl Into<String>) -> Self {
        RelayMessage::DestroyRoom {
            room_id: room_id.into(),
        }
    }

    /// Create a new RoomCreated message.
    #[must_use]
    pub fn room_created(room_id: impl Into<String>) -> Self {
        RelayMessage::RoomCreated {
            room_id: room_id.into(),
        }
    }

    /// Create a new RoomJoined message.
    #[must_use]
    pub fn room_joined(room_id: impl Into<String>) -> Self {
        RelayMessage::RoomJoined {
            room_id: room_id.into(),
        }
    }

    /// Create a new RoomFailedToJoin message.
    #[must_use]
    pub fn room_failed_to_join(error: impl Into<String>) -> Self {
        RelayMessage::RoomFailedToJoin {
            error: error.into(),
        }
    }

    /// Create a new LeftRoom message.
    #[must_use]
    pub fn left_room(room_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        RelayMessage::LeftRoom {
            room_id: room_id.into(),
            connection_id: connection_id.into(),
        }
    }

    /// Create a new RoomDemoState message.
    #[must_use]
    pub fn room_demo_state(demo_status: DemoStatus) -> Self {
        RelayMessage::RoomDemoState { demo_status }
    }
}
