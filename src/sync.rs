//! State Synchronizer (spec.md §4.3).
//!
//! Keeps two timestamped per-field stores (HTTP, UPnP) and merges them per
//! field into a [`MergedState`] using profile source preferences, with
//! freshness-window fallbacks, a propagation-dominance override, and the
//! idle-metadata preservation rule.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::{PlayState, PlayerStatus, RepeatMode, Role};
use crate::profile::{DeviceProfile, FieldSourcePref};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Http,
    Upnp,
    /// Master-to-slave metadata propagation (spec.md §4.3 rule 6, P3).
    Propagated,
}

#[derive(Debug, Clone)]
pub struct TimestampedField<T> {
    pub value: T,
    pub source: FieldSource,
    pub observed_at: Instant,
}

impl<T> TimestampedField<T> {
    pub fn new(value: T, source: FieldSource, observed_at: Instant) -> Self {
        Self {
            value,
            source,
            observed_at,
        }
    }
}

/// Field identifiers used as map keys in the per-store tables and in
/// profile `state_sources` lookups. Kept as `&'static str` rather than an
/// enum so profile tables (spec.md §4.1) can name fields without this
/// module needing to know about every future field a profile might add.
pub mod fields {
    pub const PLAY_STATE: &str = "play_state";
    pub const POSITION: &str = "position";
    pub const DURATION: &str = "duration";
    pub const VOLUME: &str = "volume";
    pub const MUTED: &str = "muted";
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const IMAGE_URL: &str = "image_url";
    pub const SOURCE: &str = "source";
    pub const SOURCE_NAME: &str = "source_name";
    pub const SHUFFLE: &str = "shuffle";
    pub const REPEAT: &str = "repeat";
    pub const LOOP_MODE_RAW: &str = "loop_mode_raw";
    pub const EQ_PRESET: &str = "eq_preset";
    pub const CODEC: &str = "codec";
    pub const SAMPLE_RATE: &str = "sample_rate";
    pub const BIT_DEPTH: &str = "bit_depth";
    pub const BIT_RATE: &str = "bit_rate";
    pub const ROLE: &str = "role";
    pub const GROUP_ID: &str = "group_id";
    pub const MASTER_UUID: &str = "master_uuid";
    pub const MASTER_IP: &str = "master_ip";

    pub const METADATA_FIELDS: &[&str] = &[TITLE, ARTIST, ALBUM, IMAGE_URL];
}

/// A dynamically-typed field value, confined to this module and the
/// per-field stores. The Synchronizer is the only place that deals in
/// loosely-typed field maps; [`MergedState::to_player_status`] is the
/// single conversion back to the canonical, fully-typed [`PlayerStatus`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    PlayState(PlayState),
    F64(f64),
    U8(u8),
    Bool(bool),
    Str(String),
    Repeat(RepeatMode),
    Role(Role),
}

type FieldStore = HashMap<&'static str, TimestampedField<FieldValue>>;

/// Legacy default source preference + freshness window, used when the
/// active profile has no explicit preference for a field (spec.md §4.3
/// rule 3 table).
fn legacy_default(field: &str) -> (FieldSourcePref, Duration) {
    match field {
        fields::PLAY_STATE => (FieldSourcePref::Upnp, Duration::from_secs(5)),
        fields::POSITION => (FieldSourcePref::Upnp, Duration::from_secs(2)),
        fields::DURATION => (FieldSourcePref::Upnp, Duration::from_secs(3600 * 24 * 365)),
        fields::VOLUME | fields::MUTED => (FieldSourcePref::Upnp, Duration::from_secs(10)),
        fields::TITLE | fields::ARTIST | fields::ALBUM | fields::IMAGE_URL => {
            (FieldSourcePref::Http, Duration::from_secs(30))
        }
        fields::SOURCE => (FieldSourcePref::Http, Duration::from_secs(60)),
        _ => (FieldSourcePref::Latest, Duration::from_secs(30)),
    }
}

/// Fully-resolved, per-field merged view produced by [`StateSynchronizer::merge`].
#[derive(Debug, Clone, Default)]
pub struct MergedState {
    values: HashMap<&'static str, FieldValue>,
}

impl MergedState {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Project the merged field map onto the canonical [`PlayerStatus`],
    /// starting from `previous` so fields absent from this merge (never
    /// observed, or preserved metadata, see P2) keep their prior value.
    pub fn to_player_status(&self, previous: &PlayerStatus) -> PlayerStatus {
        let mut status = previous.clone();

        macro_rules! set_str {
            ($field:expr, $target:expr) => {
                if let Some(FieldValue::Str(s)) = self.values.get($field) {
                    $target = Some(s.clone());
                }
            };
        }
        macro_rules! set_f64_opt {
            ($field:expr, $target:expr) => {
                if let Some(FieldValue::F64(v)) = self.values.get($field) {
                    $target = Some(*v);
                }
            };
        }

        if let Some(FieldValue::PlayState(ps)) = self.values.get(fields::PLAY_STATE) {
            status.play_state = *ps;
        }
        set_f64_opt!(fields::POSITION, status.position_s);
        set_f64_opt!(fields::DURATION, status.duration_s);
        if let Some(FieldValue::U8(v)) = self.values.get(fields::VOLUME) {
            status.volume = *v;
        }
        if let Some(FieldValue::Bool(v)) = self.values.get(fields::MUTED) {
            status.muted = *v;
        }
        set_str!(fields::TITLE, status.title);
        set_str!(fields::ARTIST, status.artist);
        set_str!(fields::ALBUM, status.album);
        set_str!(fields::IMAGE_URL, status.image_url);
        set_str!(fields::SOURCE, status.source);
        set_str!(fields::SOURCE_NAME, status.source_name);
        if let Some(FieldValue::Bool(v)) = self.values.get(fields::SHUFFLE) {
            status.shuffle = Some(*v);
        }
        if let Some(FieldValue::Repeat(v)) = self.values.get(fields::REPEAT) {
            status.repeat = Some(*v);
        }
        if let Some(FieldValue::U8(v)) = self.values.get(fields::LOOP_MODE_RAW) {
            status.loop_mode_raw = Some(*v);
        }
        set_str!(fields::EQ_PRESET, status.eq_preset);
        set_str!(fields::CODEC, status.codec);
        if let Some(FieldValue::F64(v)) = self.values.get(fields::SAMPLE_RATE) {
            status.sample_rate = Some(*v as u32);
        }
        if let Some(FieldValue::U8(v)) = self.values.get(fields::BIT_DEPTH) {
            status.bit_depth = Some(*v);
        }
        if let Some(FieldValue::F64(v)) = self.values.get(fields::BIT_RATE) {
            status.bit_rate = Some(*v as u32);
        }
        if let Some(FieldValue::Role(r)) = self.values.get(fields::ROLE) {
            status.role = *r;
        }
        set_str!(fields::GROUP_ID, status.group_id);
        set_str!(fields::MASTER_UUID, status.master_uuid);
        set_str!(fields::MASTER_IP, status.master_ip);

        status
    }
}

/// Holds `http_state`/`upnp_state` and the active profile; produces
/// [`MergedState`] via [`StateSynchronizer::merge`].
pub struct StateSynchronizer {
    http_state: FieldStore,
    upnp_state: FieldStore,
    profile: DeviceProfile,
    last_play_state: Option<PlayState>,
}

impl StateSynchronizer {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            http_state: HashMap::new(),
            upnp_state: HashMap::new(),
            profile,
            last_play_state: None,
        }
    }

    /// Install a newly-resolved profile (spec.md §4.6 refresh step 1).
    pub fn set_profile(&mut self, profile: DeviceProfile) {
        self.profile = profile;
    }

    /// `updateFromHTTP`. `source` defaults to [`FieldSource::Http`]; Group
    /// metadata propagation calls this with [`FieldSource::Propagated`]
    /// instead (spec.md §4.3).
    pub fn update_from_http(
        &mut self,
        values: Vec<(&'static str, FieldValue)>,
        source: FieldSource,
        now: Instant,
    ) {
        for (field, value) in values {
            self.http_state
                .insert(field, TimestampedField::new(value, source, now));
        }
    }

    /// `updateFromUPnP`.
    pub fn update_from_upnp(&mut self, values: Vec<(&'static str, FieldValue)>, now: Instant) {
        for (field, value) in values {
            self.upnp_state.insert(
                field,
                TimestampedField::new(value, FieldSource::Upnp, now),
            );
        }
    }

    /// Merge both stores into a [`MergedState`] per spec.md §4.3 rules
    /// 1-7. `now` is the reference instant for freshness-window checks —
    /// always computed at merge time, never cached from update time, so
    /// the result is order-independent (P1).
    pub fn merge(&mut self, now: Instant) -> MergedState {
        let mut out = HashMap::new();

        let mut all_fields: Vec<&'static str> = self
            .http_state
            .keys()
            .chain(self.upnp_state.keys())
            .copied()
            .collect();
        all_fields.sort_unstable();
        all_fields.dedup();

        for field in all_fields {
            if let Some(chosen) = self.resolve_field(field, now) {
                out.insert(field, chosen);
            }
        }

        // Rule 7: idle metadata exception. If play_state just transitioned
        // to Idle and no source this merge provided fresh metadata, the
        // field loop above already leaves those keys out of `out` (no
        // update happened), so `to_player_status` naturally preserves the
        // caller's `previous` values. We still track the transition for
        // observability/testing.
        if let Some(FieldValue::PlayState(ps)) = out.get(fields::PLAY_STATE) {
            self.last_play_state = Some(*ps);
        }

        MergedState { values: out }
    }

    fn resolve_field(&self, field: &'static str, now: Instant) -> Option<FieldValue> {
        // Rule 6: propagation override for metadata fields is unconditional.
        if fields::METADATA_FIELDS.contains(&field) {
            if let Some(tf) = self.http_state.get(field) {
                if tf.source == FieldSource::Propagated {
                    return Some(tf.value.clone());
                }
            }
        }

        let http = self.http_state.get(field);
        let upnp = self.upnp_state.get(field);

        // Rule 1: only one store has it.
        match (http, upnp) {
            (Some(h), None) => return Some(h.value.clone()),
            (None, Some(u)) => return Some(u.value.clone()),
            (None, None) => return None,
            (Some(_), Some(_)) => {}
        }
        let http = http.expect("checked Some above");
        let upnp = upnp.expect("checked Some above");

        // Rule 2/3: profile preference, falling back to the legacy table.
        let (pref, window) = self
            .profile
            .state_source_for(field)
            .map(|p| (p, legacy_default(field).1))
            .unwrap_or_else(|| legacy_default(field));

        match pref {
            FieldSourcePref::Latest => {
                return Some(latest_of(http, upnp).value.clone());
            }
            FieldSourcePref::Http => {
                if now.saturating_duration_since(http.observed_at) <= window {
                    return Some(http.value.clone());
                }
                // Rule 4: preferred stale, other fresh -> use the other.
                if now.saturating_duration_since(upnp.observed_at) <= window {
                    return Some(upnp.value.clone());
                }
            }
            FieldSourcePref::Upnp => {
                if now.saturating_duration_since(upnp.observed_at) <= window {
                    return Some(upnp.value.clone());
                }
                if now.saturating_duration_since(http.observed_at) <= window {
                    return Some(http.value.clone());
                }
            }
        }

        // Rule 5: both stale (or both fresh and neither preferred
        // resolved above) -> most recent timestamp wins.
        Some(latest_of(http, upnp).value.clone())
    }
}

fn latest_of<'a>(
    a: &'a TimestampedField<FieldValue>,
    b: &'a TimestampedField<FieldValue>,
) -> &'a TimestampedField<FieldValue> {
    if b.observed_at > a.observed_at {
        b
    } else {
        a
    }
}
