//! Player: per-device facade (spec.md §4.6).
//!
//! Owns a [`Transport`], an optional UPnP subscription task, a
//! [`StateSynchronizer`], and the active [`DeviceProfile`]. All getters
//! read from merged state and never suspend; all commands follow the
//! universal "trust the API, handle preconditions, patch cache, notify"
//! pattern (spec.md §7) and never trigger an internal refresh — UPnP
//! events and the caller's own polling loop reconcile state instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock as AsyncRwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cover_art::CoverArtCache;
use crate::endpoint::LogicalEndpoint;
use crate::error::{DeviceContext, Error};
use crate::group::Group;
use crate::model::{DeviceInfo, PlayState, PlayerStatus, RepeatMode, Role};
use crate::parser;
use crate::profile::{resolve_profile, DeviceProfile, Protocol};
use crate::sync::{fields, FieldSource, FieldValue, StateSynchronizer};
use crate::transport::{ConnectHint, Transport};
use crate::upnp::health::HealthTracker;
use crate::upnp::UpnpSubscriber;

/// Sources for which shuffle/repeat are never controllable — setters raise
/// `UnsupportedOperation`, getters return `None` rather than a stale value
/// (spec.md §4.6).
const SHUFFLE_REPEAT_BLACKLIST: &[&str] = &["live_radio", "airplay", "tunein", "iheartradio"];

/// Minimum interval between "periodic" full-ish refreshes that also
/// re-fetch EQ/preset names and Bluetooth history (spec.md §4.6 step 5).
const PERIODIC_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Caller-supplied construction options (spec.md §3 "Lifecycle": host
/// address, optional port/protocol/profile).
#[derive(Debug, Clone, Default)]
pub struct PlayerOptions {
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    /// Skip profile detection entirely (spec.md §4.1: "callers may pass a
    /// pre-resolved Profile at construction").
    pub profile: Option<DeviceProfile>,
    /// Skip DeviceInfo's own uuid round-trip if the caller already knows it
    /// (used by Group's resolver to key without waiting on first refresh).
    pub known_uuid: Option<String>,
}

type StateChangedCallback = Box<dyn Fn(&PlayerStatus) + Send + Sync>;

/// Per-device facade. Cheap to hold behind `Arc<Player>`; Group holds
/// `Arc<Player>` for its master/slaves, and each Player holds a `Weak<Group>`
/// back-reference so slave command routing can find its master without an
/// ownership cycle (spec.md §9).
pub struct Player {
    host: String,
    transport: Transport,
    profile: AsyncRwLock<DeviceProfile>,
    device_info: AsyncRwLock<DeviceInfo>,
    sync: AsyncMutex<StateSynchronizer>,
    /// Previous merged projection, used both for P2 metadata preservation
    /// (`MergedState::to_player_status` needs a `previous`) and for change
    /// detection before firing `onStateChanged`.
    status: AsyncMutex<PlayerStatus>,
    /// Serializes refresh()/commands per spec.md §5 ordering guarantee.
    op_lock: AsyncMutex<()>,
    initialized: AtomicBool,
    /// True when `PlayerOptions::profile` was supplied at construction, in
    /// which case `refresh()` never re-resolves a Profile from device info
    /// (spec.md §4.1: "callers may pass a pre-resolved Profile at
    /// construction").
    profile_pinned: bool,
    last_track: AsyncMutex<Option<(String, String)>>,
    last_periodic_refresh: AsyncMutex<Option<Instant>>,
    on_state_changed: AsyncMutex<Option<StateChangedCallback>>,
    health: AsyncMutex<HealthTracker>,
    linked_group: AsyncMutex<Option<Weak<Group>>>,
    eq_presets: AsyncRwLock<Vec<String>>,
    preset_stations: AsyncRwLock<Vec<String>>,
    bluetooth_history: AsyncRwLock<Vec<String>>,
    audio_output_mode: AsyncRwLock<Option<String>>,
    upnp_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    upnp_shutdown: AsyncMutex<Option<CancellationToken>>,
    /// Per-player cover-art byte cache (spec.md §2, §3: TTL ~1h, ~10 entries,
    /// keyed by `image_url`). Separate from `transport`'s client because
    /// artwork is frequently served from a different host/port than the
    /// `httpapi.asp` control endpoint.
    cover_art: AsyncMutex<CoverArtCache>,
    cover_art_client: reqwest::Client,
}

impl Player {
    /// Construct a Player for `host`. No I/O happens here; profile
    /// detection and the first status fetch happen on the first
    /// `refresh()` (implicitly `full=true`), unless `options.profile` was
    /// supplied.
    pub fn new(host: impl Into<String>, options: PlayerOptions) -> Result<Self, Error> {
        let host = host.into();
        let profile_pinned = options.profile.is_some();
        let profile = options.profile.clone().unwrap_or_else(DeviceProfile::linkplay_default);
        let hint = ConnectHint {
            protocol: options.protocol,
            port: options.port,
        };
        let transport = Transport::new(host.clone(), &profile, hint)?;

        let mut device_info = DeviceInfo::default();
        if let Some(uuid) = options.known_uuid {
            device_info.uuid = uuid;
        }

        Ok(Self {
            host,
            transport,
            profile: AsyncRwLock::new(profile),
            device_info: AsyncRwLock::new(device_info),
            sync: AsyncMutex::new(StateSynchronizer::new(
                options.profile.unwrap_or_else(DeviceProfile::linkplay_default),
            )),
            status: AsyncMutex::new(PlayerStatus::default()),
            op_lock: AsyncMutex::new(()),
            initialized: AtomicBool::new(false),
            profile_pinned,
            last_track: AsyncMutex::new(None),
            last_periodic_refresh: AsyncMutex::new(None),
            on_state_changed: AsyncMutex::new(None),
            health: AsyncMutex::new(HealthTracker::new()),
            linked_group: AsyncMutex::new(None),
            eq_presets: AsyncRwLock::new(Vec::new()),
            preset_stations: AsyncRwLock::new(Vec::new()),
            bluetooth_history: AsyncRwLock::new(Vec::new()),
            audio_output_mode: AsyncRwLock::new(None),
            upnp_task: AsyncMutex::new(None),
            upnp_shutdown: AsyncMutex::new(None),
            cover_art: AsyncMutex::new(CoverArtCache::new()),
            cover_art_client: reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Install the `onStateChanged` callback. Must not itself call back
    /// synchronously into a mutating `Player` method (spec.md §9) — this
    /// is a documented contract, not something the type system enforces.
    pub async fn set_on_state_changed(&self, callback: impl Fn(&PlayerStatus) + Send + Sync + 'static) {
        *self.on_state_changed.lock().await = Some(Box::new(callback));
    }

    /// Snapshot of the current merged state. Never suspends (spec.md §5:
    /// "No public getter suspends").
    pub async fn status(&self) -> PlayerStatus {
        self.status.lock().await.clone()
    }

    pub async fn device_info(&self) -> DeviceInfo {
        self.device_info.read().await.clone()
    }

    pub async fn profile(&self) -> DeviceProfile {
        self.profile.read().await.clone()
    }

    pub async fn role(&self) -> Role {
        self.status.lock().await.role
    }

    /// This device's own uuid (spec.md §3 `DeviceInfo`), used by [`Group`]
    /// to detect role and build join/leave commands.
    pub(crate) async fn uuid(&self) -> String {
        self.device_info.read().await.uuid.clone()
    }

    /// Major version of `wmrm_version`, used by [`Group::join_group`] to
    /// refuse grouping incompatible generations before any device I/O
    /// (spec.md §4.7, P10).
    pub(crate) async fn wmrm_major(&self) -> Option<u32> {
        self.device_info.read().await.wmrm_major()
    }

    /// Issue a literal command string through this device's transport,
    /// bypassing the logical-endpoint fallback chain. Used by [`Group`] for
    /// multiroom commands (`setMultiroom:Master`, `ConnectMasterAp:...`,
    /// `multiroom:SlaveKickout:...`, `multiroom:Ungroup`) that are already
    /// fully formed by the caller (spec.md §4.7, §6).
    pub(crate) async fn transport_call(&self, command: &str) -> Result<serde_json::Value, Error> {
        self.transport.call(command).await
    }

    /// Optimistic role-field patch applied by [`Group`] right after a
    /// successful group-mutation command (spec.md §4.7 universal pattern:
    /// one API call, then patch cache, then notify — no internal refresh).
    /// The next `refresh()` reconciles against the device's authoritative
    /// group info regardless.
    pub(crate) async fn apply_group_role_patch(
        &self,
        role: Role,
        group_id: Option<String>,
        master_uuid: Option<String>,
        master_ip: Option<String>,
    ) {
        self.patch_and_notify(vec![
            (fields::ROLE, FieldValue::Role(role)),
            (
                fields::GROUP_ID,
                FieldValue::Str(group_id.unwrap_or_else(|| "0".to_string())),
            ),
            (fields::MASTER_UUID, FieldValue::Str(master_uuid.unwrap_or_default())),
            (fields::MASTER_IP, FieldValue::Str(master_ip.unwrap_or_default())),
        ])
        .await;
    }

    fn device_ctx_blocking(&self, model: String, firmware: String) -> DeviceContext {
        DeviceContext {
            host: self.host.clone(),
            model,
            firmware,
        }
    }

    async fn device_ctx(&self) -> DeviceContext {
        let info = self.device_info.read().await;
        self.device_ctx_blocking(info.model.clone(), info.firmware.clone())
    }

    /// Link this player to a Group (spec.md §9: weak back-reference, no
    /// ownership cycle). `None` unlinks.
    pub(crate) async fn set_linked_group(&self, group: Option<Weak<Group>>) {
        *self.linked_group.lock().await = group;
    }

    pub(crate) async fn linked_group(&self) -> Option<Arc<Group>> {
        self.linked_group.lock().await.as_ref().and_then(Weak::upgrade)
    }

    /// Clear the permanently-cached `(protocol, port)` tuple (spec.md §4.2,
    /// used after a firmware update forces re-detection on next refresh).
    pub async fn reprobe(&self) {
        self.transport.reprobe().await;
    }

    // ---------------------------------------------------------------
    // refresh()
    // ---------------------------------------------------------------

    /// Refresh merged state from the device (spec.md §4.6). The first
    /// call on a fresh Player is implicitly `full=true` regardless of the
    /// argument.
    pub async fn refresh(&self, full: bool) -> Result<(), Error> {
        let _guard = self.op_lock.lock().await;
        let full = full || !self.initialized.load(Ordering::Acquire);

        if full {
            self.refresh_device_info_and_profile().await?;
        }

        let now = Instant::now();
        let previous = self.status.lock().await.clone();

        let profile = self.profile.read().await.clone();
        let raw_status = self
            .transport
            .call_logical(LogicalEndpoint::PlayerStatus, &profile, "")
            .await?;
        let status_fields = parser::parse_status_fields(&raw_status, &profile);

        let own_uuid = self.device_info.read().await.uuid.clone();
        let group_fields = self.resolve_role(&profile, &own_uuid).await?;

        let mut all_fields = status_fields;
        all_fields.extend(group_fields);

        let merged = {
            let mut sync = self.sync.lock().await;
            sync.update_from_http(all_fields.clone(), FieldSource::Http, now);
            sync.merge(now)
        };

        for (field, _) in &all_fields {
            if crate::upnp::health::MONITORED_FIELDS.contains(field) {
                self.health.lock().await.note_http_change(field, now);
            }
        }

        let mut new_status = merged.to_player_status(&previous);

        if full {
            self.fetch_full_capabilities(&profile).await;
        }

        let track_changed = (new_status.title.as_deref(), new_status.artist.as_deref())
            != (previous.title.as_deref(), previous.artist.as_deref());
        if track_changed {
            self.remember_track(&new_status).await;
            self.fetch_track_change_capabilities(&profile, now).await;
            let remerged = self.sync.lock().await.merge(now);
            new_status = remerged.to_player_status(&previous);
        }

        if self.periodic_refresh_due(now).await {
            self.fetch_periodic_capabilities(&profile).await;
            *self.last_periodic_refresh.lock().await = Some(now);
        }

        if new_status.role == Role::Master {
            if let Some(group) = self.linked_group().await {
                group.propagate_metadata(&new_status).await;
            }
        }

        *self.status.lock().await = new_status.clone();
        self.initialized.store(true, Ordering::Release);

        if new_status != previous {
            debug!(host = %self.host, "player state changed");
            if let Some(cb) = self.on_state_changed.lock().await.as_ref() {
                cb(&new_status);
            }
        }

        Ok(())
    }

    async fn periodic_refresh_due(&self, now: Instant) -> bool {
        let mut last = self.last_periodic_refresh.lock().await;
        match *last {
            None => {
                *last = Some(now);
                false
            }
            Some(prev) => now.saturating_duration_since(prev) >= PERIODIC_REFRESH_INTERVAL,
        }
    }

    async fn remember_track(&self, status: &PlayerStatus) {
        *self.last_track.lock().await = Some((
            status.title.clone().unwrap_or_default(),
            status.artist.clone().unwrap_or_default(),
        ));
    }

    /// Fetch DeviceInfo and (re-)resolve the Profile unless the caller
    /// pinned one at construction (spec.md §4.6 step 1, §4.1).
    async fn refresh_device_info_and_profile(&self) -> Result<(), Error> {
        let profile_for_probe = self.profile.read().await.clone();
        let raw = self
            .transport
            .call_logical(LogicalEndpoint::GroupInfoSelf, &profile_for_probe, "")
            .await?;
        let info = parser::parse_device_info(&raw);
        *self.device_info.write().await = info.clone();

        if self.profile_pinned {
            debug!(host = %self.host, "profile pinned at construction; skipping re-detection");
            return Ok(());
        }

        let resolved = resolve_profile(&info);
        *self.profile.write().await = resolved.clone();
        self.sync.lock().await.set_profile(resolved);

        info!(host = %self.host, "resolved device profile");
        Ok(())
    }

    /// Determine authoritative role (spec.md §4.6 step 3, §8 P5). Skips
    /// the expensive slave-list endpoint unless a fast local indicator
    /// suggests this device might be a master (spec.md §4.7 "Role
    /// detection optimization").
    async fn resolve_role(
        &self,
        profile: &DeviceProfile,
        own_uuid: &str,
    ) -> Result<Vec<(&'static str, FieldValue)>, Error> {
        let raw = self
            .transport
            .call_logical(LogicalEndpoint::GroupInfoSelf, profile, "")
            .await?;
        let self_info = parser::parse_self_group_info(&raw, own_uuid);

        if self_info.role == Role::Slave {
            let slave_source = self
                .device_info
                .read()
                .await
                .name
                .clone();
            return Ok(vec![
                (fields::ROLE, FieldValue::Role(Role::Slave)),
                (
                    fields::GROUP_ID,
                    FieldValue::Str(self_info.group_id.unwrap_or_else(|| "0".to_string())),
                ),
                (
                    fields::MASTER_UUID,
                    FieldValue::Str(self_info.master_uuid.unwrap_or_default()),
                ),
                (
                    fields::MASTER_IP,
                    FieldValue::Str(self_info.master_ip.unwrap_or_default()),
                ),
                (fields::SOURCE_NAME, FieldValue::Str(slave_source)),
            ]);
        }

        let cached_no_slaves = self.linked_group().await.is_none();
        let source_hints_master = get_any_str(&raw, "slaves").is_some();
        if cached_no_slaves && !source_hints_master {
            return Ok(vec![(fields::ROLE, FieldValue::Role(Role::Solo))]);
        }

        let slave_raw = self
            .transport
            .call_logical(LogicalEndpoint::GroupInfoSlaveList, profile, "")
            .await
            .unwrap_or(serde_json::Value::Null);
        let slaves = parser::parse_slave_list(&slave_raw);

        let role = if slaves.is_empty() { Role::Solo } else { Role::Master };
        Ok(vec![(fields::ROLE, FieldValue::Role(role))])
    }

    /// Fetch the current EQ preset name via `EQGetStat` and record it in
    /// `eq_presets` if new (spec.md §4.6 steps 1/4/5). Best-effort: EQ is a
    /// profile-gated extra, not required for a usable merged state.
    async fn fetch_eq_preset(&self, profile: &DeviceProfile) {
        if !profile.endpoints.eq {
            return;
        }
        match self.transport.call("EQGetStat").await {
            Ok(v) => {
                if let Some(name) = v.get("EQStat").and_then(|v| v.as_str()) {
                    let mut presets = self.eq_presets.write().await;
                    if !presets.iter().any(|p| p == name) {
                        presets.push(name.to_string());
                    }
                }
            }
            Err(e) => warn!(host = %self.host, %e, "EQGetStat failed"),
        }
    }

    /// Fetch the preset-radio-station list via `getPresetInfo` (spec.md
    /// §4.6 steps 1/4/5). Best-effort: an empty/error response just leaves
    /// `preset_stations` as last known.
    async fn fetch_preset_stations(&self) {
        match self.transport.call("getPresetInfo").await {
            Ok(v) => {
                let names = get_any_str_list(&v, &["preset_list", "PresetList"]);
                if !names.is_empty() {
                    *self.preset_stations.write().await = names;
                }
            }
            Err(e) => warn!(host = %self.host, %e, "getPresetInfo failed"),
        }
    }

    /// Fetch paired/recently-seen Bluetooth device names via `getBTHistory`
    /// (spec.md §4.6 steps 1/5). Best-effort.
    async fn fetch_bluetooth_history(&self) {
        match self.transport.call("getBTHistory").await {
            Ok(v) => {
                let names = get_any_str_list(&v, &["history", "bt_history", "BTHistory"]);
                if !names.is_empty() {
                    *self.bluetooth_history.write().await = names;
                }
            }
            Err(e) => warn!(host = %self.host, %e, "getBTHistory failed"),
        }
    }

    /// Fetch the current audio-output hardware mode via
    /// `getNewAudioOutputHardwareMode` (spec.md §4.6 step 1). Best-effort.
    async fn fetch_audio_output_status(&self) {
        match self.transport.call("getNewAudioOutputHardwareMode").await {
            Ok(v) => {
                if let Some(mode) = parser::get_any(&v, &["hardware", "mode", "output"]).and_then(|v| v.as_str()) {
                    *self.audio_output_mode.write().await = Some(mode.to_string());
                }
            }
            Err(e) => warn!(host = %self.host, %e, "getNewAudioOutputHardwareMode failed"),
        }
    }

    /// Re-fetch richer track metadata via `getMetaInfo` and feed the result
    /// back into the Synchronizer as a fresh HTTP update (spec.md §4.6 step
    /// 4: "On track change ... re-fetch metadata"). Best-effort: an empty
    /// or unsupported response leaves the status-endpoint-derived metadata
    /// untouched.
    async fn refetch_metadata(&self, profile: &DeviceProfile, now: Instant) {
        let raw = match self
            .transport
            .call_logical(LogicalEndpoint::Metadata, profile, "")
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(host = %self.host, %e, "getMetaInfo failed");
                return;
            }
        };
        let meta_fields = parser::parse_meta_info_fields(&raw);
        if meta_fields.is_empty() {
            return;
        }
        self.sync
            .lock()
            .await
            .update_from_http(meta_fields, FieldSource::Http, now);
    }

    /// Fetch everything spec.md §4.6 step 1 (first refresh) and step 5
    /// (periodic refreshes ≥60s) require beyond the player-status/role
    /// calls already issued by `refresh()`: EQ preset, preset stations,
    /// audio-output status, Bluetooth history.
    async fn fetch_full_capabilities(&self, profile: &DeviceProfile) {
        self.fetch_eq_preset(profile).await;
        self.fetch_preset_stations().await;
        self.fetch_audio_output_status().await;
        self.fetch_bluetooth_history().await;
    }

    /// Fetch everything spec.md §4.6 step 4 (track change) requires beyond
    /// the player-status call already issued by `refresh()`: metadata,
    /// EQ preset, and the preset list.
    async fn fetch_track_change_capabilities(&self, profile: &DeviceProfile, now: Instant) {
        self.refetch_metadata(profile, now).await;
        self.fetch_eq_preset(profile).await;
        self.fetch_preset_stations().await;
    }

    /// Fetch everything spec.md §4.6 step 5 (periodic refreshes ≥60s)
    /// requires: EQ/preset names and Bluetooth history.
    async fn fetch_periodic_capabilities(&self, profile: &DeviceProfile) {
        self.fetch_eq_preset(profile).await;
        self.fetch_preset_stations().await;
        self.fetch_bluetooth_history().await;
    }

    // ---------------------------------------------------------------
    // Commands (universal pattern: precondition -> one API call ->
    // optimistic patch -> notify -> no internal refresh)
    // ---------------------------------------------------------------

    async fn command_playercmd(&self, suffix: &str) -> Result<(), Error> {
        let profile = self.profile.read().await.clone();
        self.transport
            .call_logical(LogicalEndpoint::PlayerCmd, &profile, suffix)
            .await?;
        Ok(())
    }

    pub(crate) async fn patch_and_notify(&self, updates: Vec<(&'static str, FieldValue)>) {
        let now = Instant::now();
        let previous = self.status.lock().await.clone();
        let merged = {
            let mut sync = self.sync.lock().await;
            sync.update_from_http(updates, FieldSource::Http, now);
            sync.merge(now)
        };
        let new_status = merged.to_player_status(&previous);
        *self.status.lock().await = new_status.clone();
        if new_status != previous {
            if let Some(cb) = self.on_state_changed.lock().await.as_ref() {
                cb(&new_status);
            }
        }
    }

    /// Route a slave-bound transport command to the group master (spec.md
    /// §4.7 command routing). Returns `Ok(Some(()))` when the command was
    /// routed (caller should skip its own local execution and, per
    /// scenario 4, skip the local optimistic update), `Ok(None)` when this
    /// Player should execute the command itself.
    async fn route_if_slave(&self) -> Result<bool, Error> {
        if self.role().await != Role::Slave {
            return Ok(false);
        }
        match self.linked_group().await {
            Some(_group) => Ok(true),
            None => Err(Error::inconsistent(
                "player reports slave role but has no linked Group; link or refresh first",
            )),
        }
    }

    async fn routed_master(&self) -> Result<Arc<Player>, Error> {
        let group = self.linked_group().await.ok_or_else(|| {
            Error::inconsistent("player reports slave role but has no linked Group; link or refresh first")
        })?;
        Ok(group.master())
    }

    pub async fn play(&self) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self.routed_master().await?.play_direct().await;
        }
        self.play_direct().await
    }

    async fn play_direct(&self) -> Result<(), Error> {
        self.command_playercmd("play").await?;
        self.patch_and_notify(vec![(fields::PLAY_STATE, FieldValue::PlayState(PlayState::Play))])
            .await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self.routed_master().await?.pause_direct().await;
        }
        self.pause_direct().await
    }

    async fn pause_direct(&self) -> Result<(), Error> {
        self.command_playercmd("pause").await?;
        self.patch_and_notify(vec![(fields::PLAY_STATE, FieldValue::PlayState(PlayState::Pause))])
            .await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self.routed_master().await?.resume_direct().await;
        }
        self.resume_direct().await
    }

    async fn resume_direct(&self) -> Result<(), Error> {
        self.command_playercmd("resume").await?;
        self.patch_and_notify(vec![(fields::PLAY_STATE, FieldValue::PlayState(PlayState::Play))])
            .await;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self.routed_master().await?.stop_direct().await;
        }
        self.stop_direct().await
    }

    async fn stop_direct(&self) -> Result<(), Error> {
        self.command_playercmd("stop").await?;
        // stop is normalized to pause; the Player never exposes a separate
        // stopped state (spec.md §4.6).
        self.patch_and_notify(vec![(fields::PLAY_STATE, FieldValue::PlayState(PlayState::Pause))])
            .await;
        Ok(())
    }

    pub async fn next(&self) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self.routed_master().await?.command_playercmd("next").await;
        }
        self.command_playercmd("next").await
    }

    pub async fn previous(&self) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self.routed_master().await?.command_playercmd("prev").await;
        }
        self.command_playercmd("prev").await
    }

    pub async fn seek(&self, position_s: u64) -> Result<(), Error> {
        if self.route_if_slave().await? {
            return self
                .routed_master()
                .await?
                .command_playercmd(&format!("seek:{position_s}"))
                .await;
        }
        self.command_playercmd(&format!("seek:{position_s}")).await?;
        self.patch_and_notify(vec![(fields::POSITION, FieldValue::F64(position_s as f64))])
            .await;
        Ok(())
    }

    /// `if current play_state is pause, call resume(); else if playing,
    /// call pause(); else call play()` — required to avoid restart-from-
    /// beginning on streaming sources (spec.md §4.6).
    pub async fn media_play_pause(&self) -> Result<(), Error> {
        match self.status().await.play_state {
            PlayState::Pause => self.resume().await,
            PlayState::Play => self.pause().await,
            PlayState::Idle | PlayState::Buffering => self.play().await,
        }
    }

    /// Volume and mute are never routed to the master for a slave —
    /// individual `set_volume`/`set_mute` apply only to this device
    /// (spec.md §4.7: "Volume and source are not propagated; mute is not
    /// propagated").
    pub async fn set_volume(&self, volume: u8) -> Result<(), Error> {
        let volume = volume.min(100);
        self.command_playercmd(&format!("vol:{volume}")).await?;
        self.patch_and_notify(vec![(fields::VOLUME, FieldValue::U8(volume))]).await;
        Ok(())
    }

    pub async fn set_mute(&self, muted: bool) -> Result<(), Error> {
        self.command_playercmd(&format!("mute:{}", u8::from(muted))).await?;
        self.patch_and_notify(vec![(fields::MUTED, FieldValue::Bool(muted))]).await;
        Ok(())
    }

    /// Accepts hyphen/underscore/space variants on setter input (spec.md
    /// §4.6: "a smart normalizer accepts hyphen/underscore/space variants
    /// on setter input").
    pub async fn set_source(&self, source: &str) -> Result<(), Error> {
        let normalized = normalize_source_name(source);
        self.command_playercmd(&format!("switchmode:{normalized}")).await?;
        self.patch_and_notify(vec![(fields::SOURCE, FieldValue::Str(normalized))]).await;
        Ok(())
    }

    fn current_source_blacklisted(status: &PlayerStatus) -> bool {
        status.role == Role::Slave
            || status
                .source
                .as_deref()
                .map(|s| SHUFFLE_REPEAT_BLACKLIST.contains(&s))
                .unwrap_or(false)
    }

    pub async fn shuffle(&self) -> Option<bool> {
        let status = self.status().await;
        if Self::current_source_blacklisted(&status) {
            return None;
        }
        status.shuffle
    }

    pub async fn repeat(&self) -> Option<RepeatMode> {
        let status = self.status().await;
        if Self::current_source_blacklisted(&status) {
            return None;
        }
        status.repeat
    }

    pub async fn set_shuffle(&self, shuffle: bool) -> Result<(), Error> {
        let repeat = self.status().await.repeat.unwrap_or(RepeatMode::All);
        self.set_loop_mode(shuffle, repeat).await
    }

    pub async fn set_repeat(&self, repeat: RepeatMode) -> Result<(), Error> {
        let shuffle = self.status().await.shuffle.unwrap_or(false);
        self.set_loop_mode(shuffle, repeat).await
    }

    async fn set_loop_mode(&self, shuffle: bool, repeat: RepeatMode) -> Result<(), Error> {
        let status = self.status().await;
        if Self::current_source_blacklisted(&status) {
            return Err(Error::unsupported(
                "set_loop_mode",
                "shuffle/repeat are not controllable for this source or while in slave role",
            ));
        }
        let profile = self.profile.read().await.clone();
        let raw = parser::encode_loop_mode(profile.loop_mode_scheme, shuffle, repeat);
        self.command_playercmd(&format!("loopmode:{raw}")).await?;
        self.patch_and_notify(vec![
            (fields::SHUFFLE, FieldValue::Bool(shuffle)),
            (fields::REPEAT, FieldValue::Repeat(repeat)),
        ])
        .await;
        Ok(())
    }

    /// Physical-input set for this device, filtered by a hardware table
    /// that excludes ports the firmware mis-reports (spec.md §4.6), plus
    /// the currently-active streaming source if any.
    pub async fn available_sources(&self) -> Vec<String> {
        let info = self.device_info.read().await;
        let mut sources = hardware_sources_for(&info.model);
        if let Some(active) = self.status().await.source {
            if !sources.contains(&active) {
                sources.push(active);
            }
        }
        sources
    }

    pub async fn eq_load(&self, preset: &str) -> Result<(), Error> {
        self.transport.call(&format!("EQLoad:{preset}")).await?;
        self.patch_and_notify(vec![(fields::EQ_PRESET, FieldValue::Str(preset.to_string()))])
            .await;
        Ok(())
    }

    pub async fn eq_presets(&self) -> Vec<String> {
        self.eq_presets.read().await.clone()
    }

    pub async fn preset_stations(&self) -> Vec<String> {
        self.preset_stations.read().await.clone()
    }

    pub async fn bluetooth_history(&self) -> Vec<String> {
        self.bluetooth_history.read().await.clone()
    }

    /// Current audio-output hardware mode (e.g. `"optical"`, `"line-out"`),
    /// as last reported by `getNewAudioOutputHardwareMode` (spec.md §4.6
    /// steps 1/5). `None` until the first full or periodic refresh.
    pub async fn audio_output_mode(&self) -> Option<String> {
        self.audio_output_mode.read().await.clone()
    }

    /// Fetch-through-cache for the current `image_url`'s bytes (spec.md §2,
    /// §3: per-player cover-art cache, TTL ~1h, ~10 entries). A `data:` URL
    /// (the embedded-logo sentinel) is served directly from the embedded
    /// constant without touching the cache or the network; a fetch failure
    /// for a real URL falls back to the same embedded bytes rather than
    /// erroring, since missing artwork is never fatal to playback control.
    pub async fn cover_art_bytes(&self) -> (Vec<u8>, String) {
        let url = self
            .status()
            .await
            .image_url
            .unwrap_or_else(crate::cover_art::embedded_logo_url);

        if url.starts_with("data:") {
            let (bytes, content_type) = CoverArtCache::embedded_logo();
            return (bytes.to_vec(), content_type.to_string());
        }

        if let Some(hit) = self.cover_art.lock().await.get(&url) {
            return hit;
        }

        match self.cover_art_client.get(&url).send().await {
            Ok(resp) => {
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("image/jpeg")
                    .to_string();
                match resp.bytes().await {
                    Ok(bytes) => {
                        let bytes = bytes.to_vec();
                        self.cover_art
                            .lock()
                            .await
                            .put(url, bytes.clone(), content_type.clone());
                        (bytes, content_type)
                    }
                    Err(e) => {
                        warn!(host = %self.host, %e, "cover art body read failed");
                        let (bytes, content_type) = CoverArtCache::embedded_logo();
                        (bytes.to_vec(), content_type.to_string())
                    }
                }
            }
            Err(e) => {
                warn!(host = %self.host, %e, "cover art fetch failed");
                let (bytes, content_type) = CoverArtCache::embedded_logo();
                (bytes.to_vec(), content_type.to_string())
            }
        }
    }

    // ---------------------------------------------------------------
    // Group-facing hooks (spec.md §4.7)
    // ---------------------------------------------------------------

    /// Master->slave metadata propagation target. Called by [`Group`]
    /// after a successful master refresh; marks the pushed fields
    /// `source=propagated` so they dominate any slave-local UPnP/HTTP
    /// update for the same field (spec.md §4.3 rule 6, P3).
    pub(crate) async fn apply_propagated_fields(&self, updates: Vec<(&'static str, FieldValue)>) {
        let now = Instant::now();
        let previous = self.status.lock().await.clone();
        let merged = {
            let mut sync = self.sync.lock().await;
            sync.update_from_http(updates, FieldSource::Propagated, now);
            sync.merge(now)
        };
        let new_status = merged.to_player_status(&previous);
        *self.status.lock().await = new_status.clone();
        if new_status != previous {
            if let Some(cb) = self.on_state_changed.lock().await.as_ref() {
                cb(&new_status);
            }
        }
    }

    /// Run the UPnP subscribe/renew loop for `description_url`, delivering
    /// `NOTIFY` bodies the caller's HTTP server receives at `callback_url`
    /// to [`Player::handle_upnp_notify`] (spec.md §4.4). The core does not
    /// run that HTTP server itself — wiring a `NOTIFY` endpoint into the
    /// embedding application's router is the caller's responsibility.
    pub async fn enable_upnp(self: &Arc<Self>, description_url: impl Into<String>, callback_url: impl Into<String>) {
        let description_url = description_url.into();
        let callback_url = callback_url.into();
        let shutdown = CancellationToken::new();
        *self.upnp_shutdown.lock().await = Some(shutdown.clone());

        let player = self.clone();
        let handle = tokio::spawn(async move {
            let subscriber = UpnpSubscriber::new(description_url);
            if let Err(e) = subscriber.run(&callback_url, shutdown).await {
                warn!(host = %player.host, %e, "upnp subscriber loop exited");
            }
        });
        *self.upnp_task.lock().await = Some(handle);
    }

    pub async fn disable_upnp(&self) {
        if let Some(shutdown) = self.upnp_shutdown.lock().await.take() {
            shutdown.cancel();
        }
        if let Some(handle) = self.upnp_task.lock().await.take() {
            handle.abort();
        }
    }

    /// Feed a GENA `NOTIFY` body delivered by the caller's HTTP server into
    /// the Synchronizer (spec.md §4.4). An empty parse result is the
    /// broken-subscription signal — logged as WARN and otherwise ignored,
    /// per spec.md §4.4 (auto-resubscribe, driven by [`UpnpSubscriber`],
    /// handles recovery).
    pub async fn handle_upnp_notify(&self, body: &str) {
        let update = match crate::upnp::parse_notify_body(body) {
            Ok(update) => update,
            Err(e) => {
                warn!(host = %self.host, %e, "malformed upnp notify body");
                return;
            }
        };

        if crate::upnp::is_broken_subscription_signal(&update) {
            warn!(host = %self.host, "upnp event delivered no state variables; treating as broken subscription");
            return;
        }

        let now = Instant::now();
        let previous = self.status.lock().await.clone();
        let merged = {
            let mut sync = self.sync.lock().await;
            for (field, _) in &update {
                if crate::upnp::health::MONITORED_FIELDS.contains(field) {
                    self.health.lock().await.note_upnp_event(field, now);
                }
            }
            sync.update_from_upnp(update, now);
            sync.merge(now)
        };
        let new_status = merged.to_player_status(&previous);
        *self.status.lock().await = new_status.clone();
        if new_status != previous {
            if let Some(cb) = self.on_state_changed.lock().await.as_ref() {
                cb(&new_status);
            }
        }
    }

    pub async fn upnp_is_healthy(&self) -> bool {
        self.health.lock().await.is_healthy()
    }
}

fn get_any_str<'a>(raw: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    raw.get(key)
}

/// Pull a flat list of display names out of whichever of `keys` is present
/// and is a JSON array. Array elements may be plain strings or objects
/// carrying a `name`/`ssid`/`title` field; anything else is skipped.
fn get_any_str_list(raw: &serde_json::Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        if let Some(arr) = raw.get(*key).and_then(|v| v.as_array()) {
            return arr
                .iter()
                .filter_map(|entry| match entry {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(_) => entry
                        .get("name")
                        .or_else(|| entry.get("ssid"))
                        .or_else(|| entry.get("title"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    _ => None,
                })
                .collect();
        }
    }
    Vec::new()
}

/// Hardware-input table excluding ports firmware mis-reports (spec.md
/// §4.6, e.g. a WiiM Pro falsely advertising USB).
fn hardware_sources_for(model: &str) -> Vec<String> {
    let model_lower = model.to_ascii_lowercase();
    let mut sources = vec![
        "bluetooth".to_string(),
        "line_in".to_string(),
        "optical".to_string(),
        "usb".to_string(),
        "network".to_string(),
    ];
    if model_lower.contains("wiim pro") && !model_lower.contains("plus") {
        sources.retain(|s| s != "usb");
    }
    sources
}

/// Accept hyphen/underscore/space variants on setter input; canonicalize
/// to the lower_snake_case stable source id (spec.md §4.6).
fn normalize_source_name(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}
