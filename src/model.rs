//! Canonical, source-agnostic data model (spec.md §3).
//!
//! Everything past the [`crate::parser`] boundary is one of these typed
//! structs/enums — never a raw `serde_json::Value` or `HashMap<String,
//! String>` (spec.md §9: "use a tagged union / variant for parsed values,
//! not untyped maps, past the Parser boundary").

use serde::{Deserialize, Serialize};

/// Immutable, mostly-static identity of a device. Refreshed only on an
/// explicit `Player::refresh(full=true)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub uuid: String,
    pub name: String,
    pub model: String,
    pub firmware: String,
    pub mac: String,
    pub vendor: Option<String>,
    pub generation: Option<u8>,
    pub wmrm_version: Option<String>,
    pub ssid: Option<String>,
    pub wifi_channel: Option<u8>,
    pub preset_key: Option<String>,
    pub input_list: Option<Vec<String>>,
}

impl DeviceInfo {
    /// Major version number of `wmrm_version` (e.g. "4.2" -> 4), used by
    /// the Group layer to refuse cross-major grouping (spec.md §4.7, P10).
    pub fn wmrm_major(&self) -> Option<u32> {
        self.wmrm_version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .and_then(|major| major.parse().ok())
    }
}

/// Playback state, after alias normalization in the Parser. `stop`/`stopped`
/// are folded into `Pause` before this type is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Play,
    Pause,
    Idle,
    Buffering,
}

impl Default for PlayState {
    fn default() -> Self {
        PlayState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Solo,
    Master,
    Slave,
}

impl Default for Role {
    fn default() -> Self {
        Role::Solo
    }
}

/// Canonical, fully-normalized player status. This is what every getter on
/// [`crate::player::Player`] reads (from [`crate::sync::MergedState`]), and
/// what the Parser (`crate::parser`) produces from raw device dictionaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub play_state: PlayState,
    pub position_s: Option<f64>,
    pub duration_s: Option<f64>,
    pub volume: u8,
    pub muted: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub source_name: Option<String>,
    pub shuffle: Option<bool>,
    pub repeat: Option<RepeatMode>,
    pub loop_mode_raw: Option<u8>,
    pub eq_preset: Option<String>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub bit_rate: Option<u32>,
    pub role: Role,
    pub group_id: Option<String>,
    pub master_uuid: Option<String>,
    pub master_ip: Option<String>,
}

impl PlayerStatus {
    /// Invariant checked by P5: role == slave iff group_id != "0" and
    /// master_uuid != own uuid.
    pub fn is_authoritative_slave(&self, own_uuid: &str) -> bool {
        match (&self.group_id, &self.master_uuid) {
            (Some(gid), Some(master)) => gid != "0" && master != own_uuid,
            _ => false,
        }
    }
}
