//! SSDP discovery hints (spec.md §6, §1 non-goal: "device discovery beyond
//! SSDP probing").
//!
//! The core does not run a background SSDP search loop; that belongs to
//! whatever caller is responsible for finding devices in the first place.
//! What the core *does* own is the judgment call of whether an SSDP
//! response the caller already collected is worth an API probe at all: a
//! denylist of known non-LinkPlay vendors (reject before probing), a
//! SERVER-string fast-path for known LinkPlay firmwares (accept without
//! probing), and everything else falls through to "probe it and find out".

use ssdp_client::{SearchTarget, URN};

/// `urn:schemas-upnp-org:device:MediaRenderer:1`, the search target callers
/// use to discover candidate renderers before handing responses here.
pub const MEDIA_RENDERER_URN: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Build the `ssdp_client::SearchTarget` for a MediaRenderer search. Thin
/// convenience so callers don't have to depend on `ssdp_client` themselves
/// just to parse this one URN (spec.md §6: "SSDP search for
/// `urn:schemas-upnp-org:device:MediaRenderer:1`").
pub fn media_renderer_search_target() -> Result<SearchTarget, ssdp_client::Error> {
    let urn: URN = MEDIA_RENDERER_URN.parse()?;
    Ok(SearchTarget::URN(urn))
}

/// Vendors whose SSDP responses are never LinkPlay devices, checked before
/// any API probe is attempted (spec.md §6 hard-coded denylist).
const DENYLIST: &[&str] = &["sonos", "samsung", "chromecast", "denon-heos", "heos", "roku"];

/// `SERVER` header substrings that positively identify a LinkPlay device
/// without needing an API probe (spec.md §6 "positive-match fast-path").
const FAST_PATH: &[&str] = &["wiim", "linkplay"];

/// What a caller should do with one SSDP search response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdpHint {
    /// Denylisted vendor signature (spec.md §6) — do not probe this host.
    Reject,
    /// `SERVER` string matched the LinkPlay fast-path — skip the probe and
    /// treat this as a device worth constructing a `Player` for.
    Accept,
    /// Looked like a generic `MediaRenderer` but isn't positively
    /// identified; the caller must still probe the logical `player_status`
    /// endpoint before trusting it (spec.md §6).
    NeedsProbe,
}

/// Classify a previously-collected SSDP response by its `SERVER` and `ST`
/// header values. Pure and infallible — this module never itself performs
/// an SSDP search or an HTTP probe (spec.md §1 non-goal).
pub fn classify_ssdp_response(server_header: &str, st_header: &str) -> SsdpHint {
    let server = server_header.to_ascii_lowercase();
    let st = st_header.to_ascii_lowercase();

    if DENYLIST.iter().any(|v| server.contains(v) || st.contains(v)) {
        return SsdpHint::Reject;
    }
    if FAST_PATH.iter().any(|v| server.contains(v)) {
        return SsdpHint::Accept;
    }
    if st.contains("mediarenderer") {
        return SsdpHint::NeedsProbe;
    }
    SsdpHint::Reject
}
