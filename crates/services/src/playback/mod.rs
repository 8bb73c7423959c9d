//! Lesson transition control and media lifecycle.

mod controller;
mod media;

pub use controller::{
    Generation, PlaybackSession, PlaybackSessionController, SelectRejection, SessionTicket,
};
pub use media::{
    EmbedNode, MediaHandle, PlayerFactory, TeardownReport, initialize_embedded_players,
    teardown_media,
};

#[cfg(test)]
pub(crate) use media::testing;
