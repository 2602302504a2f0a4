//! Parser & Normalization (spec.md §4.5).
//!
//! Pure, stateless transforms from raw device dictionaries
//! (`serde_json::Value`) into the canonical [`crate::model::PlayerStatus`].
//! This is the single place allowed to accept "anything" — everything
//! downstream of here is typed (spec.md §9).

use serde_json::Value;

use crate::cover_art::embedded_logo_url;
use crate::model::{DeviceInfo, PlayState, RepeatMode, Role};
use crate::profile::{DeviceProfile, LoopModeScheme};
use crate::sync::{fields, FieldValue};

/// Normalize a raw play-state/transport-state string into [`PlayState`].
/// Covers both the device HTTP vocabulary and the UPnP
/// `TransportState` vocabulary (spec.md §4.5).
pub fn normalize_play_state(raw: &str) -> PlayState {
    match raw.to_ascii_lowercase().as_str() {
        "play" | "playing" => PlayState::Play,
        "pause" | "paused" | "stop" | "stopped" | "paused_playback" => PlayState::Pause,
        "none" | "no_media_present" => PlayState::Idle,
        "load" | "loading" | "transitioning" | "buffering" => PlayState::Buffering,
        _ => PlayState::Idle,
    }
}

/// Decode loop_mode into (shuffle, repeat) per the active profile's scheme
/// (spec.md §6 table). Never rejects a value: unknown raw values map to
/// `(None, None)`.
pub fn decode_loop_mode(scheme: LoopModeScheme, raw: u8) -> (Option<bool>, Option<RepeatMode>) {
    use LoopModeScheme::*;
    use RepeatMode::*;
    match (scheme, raw) {
        (Wiim, 0) | (Arylic, 0) => (Some(false), Some(All)),
        (Wiim, 1) | (Arylic, 1) => (Some(false), Some(One)),
        (Wiim, 2) | (Arylic, 2) => (Some(true), Some(All)),
        (Wiim, 3) | (Arylic, 3) => (Some(true), Some(Off)),
        (Wiim, 4) | (Arylic, 4) => (Some(false), Some(Off)),
        // WiiM raw=5 is an accepted no-op synonym for 4 (spec.md §6, P7, §9 open question).
        (Wiim, 5) => (Some(false), Some(Off)),
        (Arylic, 5) => (Some(true), Some(One)),
        (Legacy, r) => decode_loop_mode(Wiim, r),
        _ => (None, None),
    }
}

/// Re-encode `(shuffle, repeat)` back into a raw loop_mode value for the
/// given scheme. Inverse of [`decode_loop_mode`] except for the documented
/// `wiim, raw=5` no-op slot, which re-encodes to `4` (P7).
pub fn encode_loop_mode(scheme: LoopModeScheme, shuffle: bool, repeat: RepeatMode) -> u8 {
    use LoopModeScheme::*;
    use RepeatMode::*;
    match (scheme, shuffle, repeat) {
        (Wiim, false, All) | (Arylic, false, All) => 0,
        (Wiim, false, One) | (Arylic, false, One) => 1,
        (Wiim, true, All) | (Arylic, true, All) => 2,
        (Wiim, true, Off) | (Arylic, true, Off) => 3,
        (Wiim, false, Off) | (Arylic, false, Off) => 4,
        (Arylic, true, One) => 5,
        (Legacy, s, r) => encode_loop_mode(Wiim, s, r),
        // No combination maps to Arylic-style (true, One) under the WiiM scheme.
        (Wiim, true, One) => 2,
    }
}

/// Accept µs, ms, or s and convert to seconds. Disambiguated by magnitude:
/// values that would exceed 10 hours if interpreted as ms are assumed to
/// actually be µs. Negative values are dropped (returns `None`).
pub fn normalize_time_value(raw: i64) -> Option<f64> {
    if raw < 0 {
        return None;
    }
    const TEN_HOURS_S: i64 = 10 * 60 * 60;
    const TEN_HOURS_MS: i64 = TEN_HOURS_S * 1000;
    if raw > TEN_HOURS_MS {
        // Implausible even as milliseconds (> 10h) -> must be microseconds.
        Some(raw as f64 / 1_000_000.0)
    } else if raw > TEN_HOURS_S {
        // Implausible as seconds (> 10h) but plausible as milliseconds.
        Some(raw as f64 / 1_000.0)
    } else {
        Some(raw as f64)
    }
}

/// Clamp `position <= duration` when both are known (spec.md §3 invariant).
pub fn clamp_position(position: Option<f64>, duration: Option<f64>) -> Option<f64> {
    match (position, duration) {
        (Some(p), Some(d)) if p > d => Some(d),
        (Some(p), _) => Some(p),
        _ => None,
    }
}

/// Detect an even-length hex string of printable-ASCII-when-decoded text
/// and decode it to UTF-8; otherwise return the input unchanged.
pub fn decode_hex_text(raw: &str) -> String {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return raw.to_string();
    }
    if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return raw.to_string();
    }
    match hex::decode(raw) {
        Ok(bytes) if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') => {
            String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string())
        }
        _ => raw.to_string(),
    }
}

/// Validate/normalize a cover-art URL: reject empty/"unknown"/placeholder
/// strings and anything that doesn't parse as a URL, falling back to the
/// embedded-logo sentinel (spec.md §4.5, §3 invariant: never empty/"unknown").
pub fn normalize_cover_art(raw: Option<&str>) -> String {
    match raw {
        Some(s) => {
            let trimmed = s.trim();
            let is_placeholder = trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("unknown")
                || trimmed.eq_ignore_ascii_case("none")
                || trimmed.eq_ignore_ascii_case("null");
            if is_placeholder {
                embedded_logo_url()
            } else if url::Url::parse(trimmed).is_ok() {
                trimmed.to_string()
            } else {
                embedded_logo_url()
            }
        }
        None => embedded_logo_url(),
    }
}

/// Map a raw `mode` value to a stable source id. `mode=0` must never
/// produce `source="idle"` — idle is a play-state, not a source
/// (spec.md §4.5). Codes `32`/`36`/`37` are the internet-radio family
/// (`live_radio`/`tunein`/`iheartradio`) that `SHUFFLE_REPEAT_BLACKLIST`
/// (player.rs) disables shuffle/repeat for — keep the two tables in sync.
pub fn mode_to_source(mode: &str) -> Option<String> {
    let known = [
        ("0", "idle_input"),
        ("1", "airplay"),
        ("2", "dlna"),
        ("10", "network"),
        ("11", "usb"),
        ("20", "bluetooth"),
        ("31", "spotify"),
        ("32", "live_radio"),
        ("36", "tunein"),
        ("37", "iheartradio"),
        ("40", "line_in"),
        ("41", "bluetooth"),
        ("43", "optical"),
        ("47", "line_in2"),
        ("51", "usbdac"),
        ("99", "multiroom"),
    ];
    known
        .iter()
        .find(|(raw, _)| *raw == mode)
        .map(|(_, source)| source.to_string())
        .or_else(|| Some(format!("mode_{mode}")))
}

/// Read a field from a raw JSON object by any of several possible keys
/// (devices are inconsistent about `vol` vs `volume`, etc).
pub fn get_any<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

pub fn as_i64_lenient(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_str_lenient(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build a [`DeviceInfo`] from a raw `getStatusEx` dictionary. Infallible:
/// missing keys simply leave the corresponding field empty/`None`, which
/// is what [`crate::profile::resolve_profile`]'s failure mode expects
/// (spec.md §4.1).
pub fn parse_device_info(raw: &Value) -> DeviceInfo {
    let text = |keys: &[&str]| -> String {
        get_any(raw, keys)
            .and_then(as_str_lenient)
            .map(|s| decode_hex_text(&s))
            .unwrap_or_default()
    };
    let opt_text = |keys: &[&str]| -> Option<String> {
        get_any(raw, keys)
            .and_then(as_str_lenient)
            .map(|s| decode_hex_text(&s))
            .filter(|s| !s.is_empty())
    };

    DeviceInfo {
        uuid: text(&["uuid", "UUID"]),
        name: text(&["DeviceName", "device_name", "name"]),
        model: text(&["project", "model", "hardware"]),
        firmware: text(&["firmware", "FW_Version"]),
        mac: text(&["MAC", "mac"]),
        vendor: opt_text(&["vendor", "manufacturer"]),
        generation: get_any(raw, &["generation"]).and_then(as_i64_lenient).map(|v| v as u8),
        wmrm_version: opt_text(&["wmrm_version", "group"]),
        ssid: opt_text(&["ssid", "essid"]),
        wifi_channel: get_any(raw, &["WifiChannel", "wifi_channel"])
            .and_then(as_i64_lenient)
            .map(|v| v as u8),
        preset_key: opt_text(&["preset_key"]),
        input_list: opt_text(&["plm_support", "input_list"])
            .map(|s| s.split(',').map(|p| p.trim().to_string()).collect()),
    }
}

/// Extract the canonical player-status field set from a raw
/// `getPlayerStatusEx`/`getStatusEx` dictionary, applying every
/// normalization rule in spec.md §4.5 (alias mapping, hex decode, unit
/// disambiguation, loop-mode decode, cover-art fallback). The caller feeds
/// the result straight into [`crate::sync::StateSynchronizer::update_from_http`].
pub fn parse_status_fields(raw: &Value, profile: &DeviceProfile) -> Vec<(&'static str, FieldValue)> {
    let mut out = Vec::new();

    if let Some(status) = get_any(raw, &["status", "state"]).and_then(|v| v.as_str()) {
        out.push((fields::PLAY_STATE, FieldValue::PlayState(normalize_play_state(status))));
    }

    let duration = get_any(raw, &["totlen"])
        .and_then(as_i64_lenient)
        .and_then(normalize_time_value);
    let position_raw = get_any(raw, &["curpos"])
        .and_then(as_i64_lenient)
        .and_then(normalize_time_value);
    let position = clamp_position(position_raw, duration);
    if let Some(d) = duration {
        out.push((fields::DURATION, FieldValue::F64(d)));
    }
    if let Some(p) = position {
        out.push((fields::POSITION, FieldValue::F64(p)));
    }

    if let Some(v) = get_any(raw, &["vol"]).and_then(as_i64_lenient) {
        out.push((fields::VOLUME, FieldValue::U8(v.clamp(0, 100) as u8)));
    }
    if let Some(m) = get_any(raw, &["mute"]).and_then(as_i64_lenient) {
        out.push((fields::MUTED, FieldValue::Bool(m != 0)));
    }

    for (key, field) in [
        ("Title", fields::TITLE),
        ("Artist", fields::ARTIST),
        ("Album", fields::ALBUM),
    ] {
        if let Some(raw_text) = get_any(raw, &[key]).and_then(|v| v.as_str()) {
            out.push((field, FieldValue::Str(decode_hex_text(raw_text))));
        }
    }

    let cover = get_any(raw, &["cover_url", "cover", "albumart_uri"]).and_then(|v| v.as_str());
    out.push((fields::IMAGE_URL, FieldValue::Str(normalize_cover_art(cover))));

    if let Some(mode) = get_any(raw, &["mode"]).and_then(as_str_lenient) {
        if let Some(source) = mode_to_source(&mode) {
            out.push((fields::SOURCE, FieldValue::Str(source)));
        }
    }

    if let Some(loop_mode) = get_any(raw, &["loop"]).and_then(as_i64_lenient) {
        let raw_mode = loop_mode.clamp(0, 255) as u8;
        let (shuffle, repeat) = decode_loop_mode(profile.loop_mode_scheme, raw_mode);
        out.push((fields::LOOP_MODE_RAW, FieldValue::U8(raw_mode)));
        if let Some(s) = shuffle {
            out.push((fields::SHUFFLE, FieldValue::Bool(s)));
        }
        if let Some(r) = repeat {
            out.push((fields::REPEAT, FieldValue::Repeat(r)));
        }
    }

    if let Some(eq) = get_any(raw, &["eq", "EQ"]).and_then(as_str_lenient) {
        out.push((fields::EQ_PRESET, FieldValue::Str(eq)));
    }

    if let Some(codec) = get_any(raw, &["type", "codec"]).and_then(as_str_lenient) {
        out.push((fields::CODEC, FieldValue::Str(codec)));
    }
    if let Some(rate) = get_any(raw, &["sample_rate", "SampleRate"]).and_then(as_i64_lenient) {
        out.push((fields::SAMPLE_RATE, FieldValue::F64(rate as f64)));
    }
    if let Some(depth) = get_any(raw, &["bit_depth", "BitDepth"]).and_then(as_i64_lenient) {
        out.push((fields::BIT_DEPTH, FieldValue::U8(depth.clamp(0, 64) as u8)));
    }
    if let Some(rate) = get_any(raw, &["bitrate", "BitRate"]).and_then(as_i64_lenient) {
        out.push((fields::BIT_RATE, FieldValue::F64(rate as f64)));
    }

    out
}

/// Extract canonical metadata fields from a `getMetaInfo` response, whose
/// payload nests under a `metaData` object (spec.md §4.6 step 4: "On track
/// change ... re-fetch metadata"). Applies the same hex-decode and
/// cover-art normalization as [`parse_status_fields`]. An unsupported
/// device returns an empty list (`getMetaInfo` "may be empty list =
/// unsupported", spec.md §6), which the caller treats as a no-op.
pub fn parse_meta_info_fields(raw: &Value) -> Vec<(&'static str, FieldValue)> {
    let mut out = Vec::new();
    let Some(meta) = raw.get("metaData") else {
        return out;
    };

    for (key, field) in [
        ("title", fields::TITLE),
        ("artist", fields::ARTIST),
        ("album", fields::ALBUM),
    ] {
        if let Some(raw_text) = get_any(meta, &[key]).and_then(|v| v.as_str()) {
            out.push((field, FieldValue::Str(decode_hex_text(raw_text))));
        }
    }

    if let Some(cover) = get_any(meta, &["albumArtURI", "cover_url", "cover"]).and_then(|v| v.as_str()) {
        out.push((fields::IMAGE_URL, FieldValue::Str(normalize_cover_art(Some(cover)))));
    }

    out
}

/// Result of resolving a device's authoritative group role from its raw
/// `getStatusEx` self-fields (spec.md §4.6 step 3, §8 P5). `mode=99`
/// ("multiroom" source) is deliberately not consulted here — only `group`
/// and the master identity fields, due to a known firmware bug where
/// `mode` lags the actual group state.
pub struct SelfGroupInfo {
    pub role: Role,
    pub group_id: Option<String>,
    pub master_uuid: Option<String>,
    pub master_ip: Option<String>,
}

/// Parse the self-reported group fields. A device is `slave` iff `group`
/// is not `"0"` and the reported master id differs from `own_uuid`
/// (the sole authority for role per spec.md §8 P5 — never derived from
/// local `Group` set membership).
pub fn parse_self_group_info(raw: &Value, own_uuid: &str) -> SelfGroupInfo {
    let group_id = get_any(raw, &["group"]).and_then(as_str_lenient);
    let master_uuid = get_any(raw, &["master_uuid", "host_uuid"]).and_then(as_str_lenient);
    let master_ip = get_any(raw, &["master_ip", "host"]).and_then(as_str_lenient);

    let is_slave = match (&group_id, &master_uuid) {
        (Some(gid), Some(master)) => gid != "0" && master != own_uuid,
        _ => false,
    };

    SelfGroupInfo {
        role: if is_slave { Role::Slave } else { Role::Solo },
        group_id,
        master_uuid,
        master_ip,
    }
}

/// One entry from a `multiroom:getSlaveList` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveEntry {
    pub uuid: String,
    pub ip: String,
}

/// Parse the authoritative slave list from `multiroom:getSlaveList` (the
/// fallback endpoint used when the primary status response's `slaves`
/// field is null, spec.md §4.6 step 3). A non-empty list makes the device
/// a `master`.
pub fn parse_slave_list(raw: &Value) -> Vec<SlaveEntry> {
    let Some(list) = get_any(raw, &["slaves", "slave_list"]).and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|entry| {
            let uuid = get_any(entry, &["uuid"]).and_then(as_str_lenient)?;
            let ip = get_any(entry, &["ip"]).and_then(as_str_lenient).unwrap_or_default();
            Some(SlaveEntry { uuid, ip })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn stop_normalizes_to_pause() {
        assert_eq!(normalize_play_state("stopped"), PlayState::Pause);
        assert_eq!(normalize_play_state("stop"), PlayState::Pause);
    }

    #[test]
    fn none_normalizes_to_idle() {
        assert_eq!(normalize_play_state("none"), PlayState::Idle);
    }

    #[test]
    fn upnp_paused_playback_normalizes() {
        assert_eq!(normalize_play_state("PAUSED_PLAYBACK"), PlayState::Pause);
        assert_eq!(normalize_play_state("NO_MEDIA_PRESENT"), PlayState::Idle);
        assert_eq!(normalize_play_state("TRANSITIONING"), PlayState::Buffering);
    }

    #[test]
    fn loop_mode_cross_vendor_agreement() {
        assert_eq!(
            decode_loop_mode(LoopModeScheme::Arylic, 3),
            (Some(true), Some(RepeatMode::Off))
        );
        assert_eq!(
            decode_loop_mode(LoopModeScheme::Wiim, 3),
            (Some(true), Some(RepeatMode::Off))
        );
    }

    #[test]
    fn wiim_raw_5_is_noop_synonym_for_4() {
        assert_eq!(
            decode_loop_mode(LoopModeScheme::Wiim, 5),
            (Some(false), Some(RepeatMode::Off))
        );
        assert_eq!(encode_loop_mode(LoopModeScheme::Wiim, false, RepeatMode::Off), 4);
    }

    #[test]
    fn loop_mode_round_trips() {
        for raw in 0u8..=4 {
            let (shuffle, repeat) = decode_loop_mode(LoopModeScheme::Wiim, raw);
            let re = encode_loop_mode(LoopModeScheme::Wiim, shuffle.unwrap(), repeat.unwrap());
            assert_eq!(re, raw);
        }
        for raw in 0u8..=5 {
            let (shuffle, repeat) = decode_loop_mode(LoopModeScheme::Arylic, raw);
            let re = encode_loop_mode(LoopModeScheme::Arylic, shuffle.unwrap(), repeat.unwrap());
            assert_eq!(re, raw);
        }
    }

    #[test]
    fn unknown_loop_mode_value_is_accepted_not_rejected() {
        assert_eq!(decode_loop_mode(LoopModeScheme::Wiim, 200), (None, None));
    }

    #[test]
    fn mode_zero_is_not_source_idle() {
        let source = mode_to_source("0").unwrap();
        assert_ne!(source, "idle");
    }

    #[test]
    fn internet_radio_modes_map_to_blacklisted_source_ids() {
        // These three raw codes are the only way real device data can ever
        // produce the non-airplay, non-slave entries of
        // `player::SHUFFLE_REPEAT_BLACKLIST` — keep the tables in sync.
        assert_eq!(mode_to_source("32").as_deref(), Some("live_radio"));
        assert_eq!(mode_to_source("36").as_deref(), Some("tunein"));
        assert_eq!(mode_to_source("37").as_deref(), Some("iheartradio"));
    }

    #[test]
    fn time_value_disambiguates_by_magnitude() {
        // 12 hours in ms would be implausible -> treated as µs -> ~0.0432s... actually
        // use a realistic µs duration for a track: 245_000_000 us = 245s
        assert_eq!(normalize_time_value(245_000_000), Some(245.0));
        assert_eq!(normalize_time_value(245_000), Some(245.0));
        assert_eq!(normalize_time_value(245), Some(245.0));
    }

    #[test]
    fn negative_time_value_is_dropped() {
        assert_eq!(normalize_time_value(-5), None);
    }

    #[test]
    fn position_never_exceeds_duration() {
        assert_eq!(clamp_position(Some(300.0), Some(200.0)), Some(200.0));
        assert_eq!(clamp_position(Some(100.0), Some(200.0)), Some(100.0));
    }

    #[test]
    fn hex_metadata_text_is_decoded() {
        // "Daft Punk" hex-encoded
        let hex = "4461667420 50756e6b".replace(' ', "");
        assert_eq!(decode_hex_text(&hex), "Daft Punk");
    }

    #[test]
    fn non_hex_text_passes_through() {
        assert_eq!(decode_hex_text("Daft Punk"), "Daft Punk");
    }

    #[test]
    fn placeholder_cover_art_falls_back_to_logo() {
        assert_eq!(normalize_cover_art(Some("unknown")), embedded_logo_url());
        assert_eq!(normalize_cover_art(Some("")), embedded_logo_url());
        assert_eq!(normalize_cover_art(None), embedded_logo_url());
    }

    #[test]
    fn valid_cover_art_url_passes_through() {
        assert_eq!(
            normalize_cover_art(Some("http://10.0.0.5/art.jpg")),
            "http://10.0.0.5/art.jpg"
        );
    }

    #[test]
    fn invalid_cover_art_url_falls_back() {
        assert_eq!(normalize_cover_art(Some("not a url")), embedded_logo_url());
    }

    #[test]
    fn device_info_parses_known_keys() {
        let raw = serde_json::json!({
            "uuid": "FF31F09EE2A1",
            "DeviceName": "4c6976696e67526f6f6d", // "LivingRoom" hex
            "project": "WiiM_Pro_Plus",
            "firmware": "4.6.8020",
            "MAC": "AA:BB:CC:DD:EE:FF",
            "wmrm_version": "4.2",
        });
        let info = parse_device_info(&raw);
        assert_eq!(info.uuid, "FF31F09EE2A1");
        assert_eq!(info.name, "LivingRoom");
        assert_eq!(info.model, "WiiM_Pro_Plus");
        assert_eq!(info.wmrm_version.as_deref(), Some("4.2"));
    }

    #[test]
    fn status_fields_stop_normalizes_to_pause() {
        // Scenario 1 from spec.md §8.
        let raw = serde_json::json!({"status": "stopped"});
        let out = parse_status_fields(&raw, &crate::profile::DeviceProfile::wiim());
        assert!(out.contains(&(fields::PLAY_STATE, FieldValue::PlayState(PlayState::Pause))));
    }

    #[test]
    fn status_fields_decode_hex_metadata() {
        let raw = serde_json::json!({
            "Title": "4461667420 50756e6b".replace(' ', ""),
        });
        let out = parse_status_fields(&raw, &crate::profile::DeviceProfile::wiim());
        assert!(out.contains(&(fields::TITLE, FieldValue::Str("Daft Punk".to_string()))));
    }

    #[test]
    fn status_fields_clamp_position_to_duration() {
        let raw = serde_json::json!({"curpos": 300_000, "totlen": 200_000});
        let out = parse_status_fields(&raw, &crate::profile::DeviceProfile::wiim());
        assert!(out.contains(&(fields::POSITION, FieldValue::F64(200.0))));
    }

    #[test]
    fn self_group_info_identifies_slave() {
        let raw = serde_json::json!({"group": "1", "master_uuid": "OTHER"});
        let info = parse_self_group_info(&raw, "SELF");
        assert_eq!(info.role, Role::Slave);
    }

    #[test]
    fn self_group_info_is_solo_when_group_is_zero() {
        let raw = serde_json::json!({"group": "0", "master_uuid": "OTHER"});
        let info = parse_self_group_info(&raw, "SELF");
        assert_eq!(info.role, Role::Solo);
    }

    #[test]
    fn slave_list_parses_entries() {
        let raw = serde_json::json!({"slaves": [{"uuid": "A", "ip": "10.0.0.2"}, {"uuid": "B", "ip": "10.0.0.3"}]});
        let list = parse_slave_list(&raw);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].uuid, "A");
    }

    #[test]
    fn slave_list_empty_when_field_missing() {
        let raw = serde_json::json!({});
        assert!(parse_slave_list(&raw).is_empty());
    }

    #[test]
    fn meta_info_extracts_title_artist_album_and_cover() {
        let raw = serde_json::json!({
            "metaData": {
                "title": "Song",
                "artist": "Band",
                "album": "LP",
                "albumArtURI": "http://example.com/art.jpg",
            }
        });
        let fields = parse_meta_info_fields(&raw);
        assert!(fields.contains(&(crate::sync::fields::TITLE, FieldValue::Str("Song".to_string()))));
        assert!(fields.contains(&(crate::sync::fields::ARTIST, FieldValue::Str("Band".to_string()))));
        assert!(fields.contains(&(crate::sync::fields::ALBUM, FieldValue::Str("LP".to_string()))));
        assert!(fields.contains(&(
            crate::sync::fields::IMAGE_URL,
            FieldValue::Str("http://example.com/art.jpg".to_string())
        )));
    }

    #[test]
    fn meta_info_empty_when_unsupported() {
        // getMetaInfo "may be empty list = unsupported" (spec.md §6).
        let raw = serde_json::json!([]);
        assert!(parse_meta_info_fields(&raw).is_empty());
    }
}
