//! wiim-linkplay-core
//!
//! Source-agnostic control-plane library for WiiM and LinkPlay-based
//! network audio devices: profile detection, connection resolution, HTTP
//! polling, UPnP event subscription, state reconciliation, and multiroom
//! group management behind one per-device [`Player`](player::Player)
//! facade.
//!
//! This crate owns none of the surfaces built on top of it — no HTTP API,
//! no MQTT bridge, no discovery loop, no persistence. Callers drive
//! `refresh()` on their own schedule, wire their own HTTP server's
//! `NOTIFY` route to [`Player::handle_upnp_notify`](player::Player::handle_upnp_notify),
//! and decide what to do with an SSDP response using [`discovery`].

// =============================================================================
// Lints
// =============================================================================

#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod cover_art;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod group;
pub mod model;
pub mod parser;
pub mod player;
pub mod profile;
pub mod sync;
pub mod transport;
pub mod upnp;

pub use error::Error;
pub use group::Group;
pub use model::{DeviceInfo, PlayState, PlayerStatus, RepeatMode, Role};
pub use player::{Player, PlayerOptions};
pub use profile::{resolve_profile, DeviceProfile};
