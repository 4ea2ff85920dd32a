//! RoomService Twirp JSON models

use serde::{Deserialize, Serialize};

/// `livekit.RoomService/ListRooms` request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRoomsRequest {
    /// Restrict the listing to these room names (empty lists every room)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

/// `livekit.RoomService/ListRooms` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRoomsResponse {
    #[serde(default)]
    pub rooms: Vec<Room>,
}

/// A LiveKit room
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub sid: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "numParticipants")]
    pub num_participants: u32,

    #[serde(default, alias = "maxParticipants")]
    pub max_participants: u32,

    #[serde(default)]
    pub metadata: String,
}

/// `livekit.RoomService/DeleteRoom` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRoomRequest {
    pub room: String,
}

/// Twirp error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwirpError {
    pub code: String,
    #[serde(default)]
    pub msg: String,
}

impl TwirpError {
    pub fn is_not_found(&self) -> bool {
        self.code == "not_found"
    }
}

/// Video grant carried inside an access token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_list: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_admin: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_create: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// API key
    pub iss: String,

    /// Identity
    pub sub: String,

    pub nbf: i64,

    pub exp: i64,

    pub video: VideoGrant,
}
