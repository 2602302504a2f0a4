//! Device Profile registry and resolver (spec.md §4.1).
//!
//! `resolve_profile` is a pure function: model-name substrings,
//! `wmrm_version`, and firmware version ranges in, one of the six
//! predefined [`DeviceProfile`]s out. It never fails — an unrecognized
//! device falls back to [`DeviceProfile::linkplay_default`].

use std::collections::HashMap;
use std::time::Duration;

use crate::model::DeviceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopModeScheme {
    Wiim,
    Arylic,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSourcePref {
    Http,
    Upnp,
    /// Take whichever store has the most recent timestamp, ignoring
    /// freshness windows (spec.md §4.3 merge rule 2).
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Ordered `(protocol, port)` pairs tried before falling back to the
    /// standard list in spec.md §4.2.
    pub preferred: Vec<(Protocol, u16)>,
    pub requires_client_cert: bool,
    pub response_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointFlags {
    pub metadata: bool,
    pub eq: bool,
    pub alarm: bool,
    pub enhanced_grouping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingConfig {
    pub uses_wifi_direct: bool,
    pub supports_enhanced_grouping: bool,
}

/// Immutable, value-type device profile. Cheap to clone; callers may cache
/// one and pass it to `Player::new` to skip re-detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub vendor: &'static str,
    pub generation: u8,
    pub loop_mode_scheme: LoopModeScheme,
    pub state_sources: HashMap<&'static str, FieldSourcePref>,
    pub connection: ConnectionConfig,
    pub endpoints: EndpointFlags,
    pub grouping: GroupingConfig,
}

impl DeviceProfile {
    pub fn state_source_for(&self, field: &str) -> Option<FieldSourcePref> {
        self.state_sources.get(field).copied()
    }

    fn base(vendor: &'static str, generation: u8, scheme: LoopModeScheme) -> Self {
        Self {
            vendor,
            generation,
            loop_mode_scheme: scheme,
            state_sources: HashMap::new(),
            connection: ConnectionConfig {
                preferred: vec![(Protocol::Https, 443), (Protocol::Http, 80)],
                requires_client_cert: false,
                response_timeout: Duration::from_secs(5),
            },
            endpoints: EndpointFlags {
                metadata: true,
                eq: true,
                alarm: true,
                enhanced_grouping: false,
            },
            grouping: GroupingConfig {
                uses_wifi_direct: false,
                supports_enhanced_grouping: false,
            },
        }
    }

    pub fn wiim() -> Self {
        let mut p = Self::base("WiiM", 2, LoopModeScheme::Wiim);
        p.connection.preferred = vec![(Protocol::Https, 443), (Protocol::Http, 80)];
        p.grouping.supports_enhanced_grouping = true;
        p
    }

    pub fn arylic() -> Self {
        let mut p = Self::base("Arylic", 2, LoopModeScheme::Arylic);
        p.connection.preferred = vec![(Protocol::Http, 80)];
        p
    }

    /// Original Audio Pro LinkPlay generation: WiFi-Direct grouping, no
    /// client cert, firmware predates the *Ex status endpoints.
    pub fn audio_pro_original() -> Self {
        let mut p = Self::base("Audio Pro", 1, LoopModeScheme::Legacy);
        p.connection.preferred = vec![(Protocol::Http, 80)];
        p.grouping.uses_wifi_direct = true;
        p.endpoints.eq = false;
        p
    }

    /// "W" generation: router-based grouping, still no client cert.
    pub fn audio_pro_w_generation() -> Self {
        let mut p = Self::base("Audio Pro", 2, LoopModeScheme::Legacy);
        p.connection.preferred = vec![(Protocol::Http, 80)];
        p
    }

    /// MkII generation requires mutual TLS and prefers `getStatusEx` over
    /// `getPlayerStatusEx` (the *Ex endpoint is unsupported on this fw).
    pub fn audio_pro_mkii() -> Self {
        let mut p = Self::base("Audio Pro", 3, LoopModeScheme::Legacy);
        p.connection.preferred = vec![(Protocol::Https, 8443)];
        p.connection.requires_client_cert = true;
        // mTLS handshake latency can run several seconds; the probe/total
        // timeout must be at least the profile's response_timeout (spec.md §4.2).
        p.connection.response_timeout = Duration::from_secs(8);
        p
    }

    pub fn linkplay_default() -> Self {
        let mut p = Self::base("LinkPlay", 2, LoopModeScheme::Legacy);
        p.state_sources.insert("play_state", FieldSourcePref::Upnp);
        p
    }
}

/// Firmware build below which Gen1 WiFi-Direct grouping is assumed when
/// `wmrm_version` itself doesn't disambiguate (spec.md §4.1 example).
const GEN1_FIRMWARE_CEILING: (u32, u32, u32, u32) = (4, 2, 8, 020);

fn parse_firmware(fw: &str) -> Option<(u32, u32, u32, u32)> {
    let parts: Vec<u32> = fw.split('.').filter_map(|p| p.parse().ok()).collect();
    if parts.len() < 4 {
        return None;
    }
    Some((parts[0], parts[1], parts[2], parts[3]))
}

/// Resolve a [`DeviceProfile`] from [`DeviceInfo`]. Pure and infallible:
/// unrecognized/missing model or firmware always yields the generic
/// LinkPlay profile (spec.md §4.1 failure mode).
pub fn resolve_profile(info: &DeviceInfo) -> DeviceProfile {
    let model = info.model.to_ascii_lowercase();

    if model.contains("wiim") {
        return DeviceProfile::wiim();
    }
    if model.contains("arylic") || model.contains("up2stream") {
        return DeviceProfile::arylic();
    }
    if model.contains("audio pro") || model.contains("audiopro") {
        if model.contains("mkii") || model.contains("mk ii") || model.contains("mk2") {
            return DeviceProfile::audio_pro_mkii();
        }
        let is_gen1 = info.wmrm_version.as_deref() == Some("2.0")
            || parse_firmware(&info.firmware)
                .map(|fw| fw < GEN1_FIRMWARE_CEILING)
                .unwrap_or(false);
        return if is_gen1 {
            DeviceProfile::audio_pro_original()
        } else {
            DeviceProfile::audio_pro_w_generation()
        };
    }

    DeviceProfile::linkplay_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn info(model: &str, firmware: &str, wmrm: Option<&str>) -> DeviceInfo {
        DeviceInfo {
            model: model.to_string(),
            firmware: firmware.to_string(),
            wmrm_version: wmrm.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_wiim_by_model_substring() {
        let p = resolve_profile(&info("WiiM Pro Plus", "4.6.8020", None));
        assert_eq!(p.vendor, "WiiM");
        assert_eq!(p.loop_mode_scheme, LoopModeScheme::Wiim);
    }

    #[test]
    fn resolves_arylic() {
        let p = resolve_profile(&info("Arylic S50 Pro", "1.0.0.0", None));
        assert_eq!(p.vendor, "Arylic");
        assert_eq!(p.loop_mode_scheme, LoopModeScheme::Arylic);
    }

    #[test]
    fn unrecognized_model_falls_back_to_generic() {
        let p = resolve_profile(&info("", "", None));
        assert_eq!(p.vendor, "LinkPlay");
    }

    #[test]
    fn audio_pro_gen1_detected_via_wmrm_version() {
        let p = resolve_profile(&info("Audio Pro A10", "9.9.9999", Some("2.0")));
        assert!(p.grouping.uses_wifi_direct);
    }

    #[test]
    fn audio_pro_gen1_detected_via_old_firmware() {
        let p = resolve_profile(&info("Audio Pro A10", "4.2.8019", None));
        assert!(p.grouping.uses_wifi_direct);
    }

    #[test]
    fn audio_pro_w_generation_not_gen1() {
        let p = resolve_profile(&info("Audio Pro A10 W", "4.2.8021", None));
        assert!(!p.grouping.uses_wifi_direct);
    }

    #[test]
    fn audio_pro_mkii_requires_client_cert() {
        let p = resolve_profile(&info("Audio Pro A10 MkII", "5.0.0.0", None));
        assert!(p.connection.requires_client_cert);
    }

    #[test]
    fn mtls_timeout_is_at_least_response_timeout() {
        let p = DeviceProfile::audio_pro_mkii();
        assert!(p.connection.response_timeout >= Duration::from_secs(5));
    }
}
