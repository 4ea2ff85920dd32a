//! LiveKit collaborators: the CLI, access tokens and the room service

pub mod cli;
pub mod rooms;
pub mod token;

pub use cli::LiveKitCli;
pub use rooms::{HttpRoomService, RoomService};
