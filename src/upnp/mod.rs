//! UPnP Subscriber (spec.md §4.4).
//!
//! Subscribes (GENA `SUBSCRIBE`) to `AVTransport:1` and `RenderingControl:1`
//! on an already-known device's description URL, auto-resubscribes before
//! the granted timeout expires, and parses `LastChange` event bodies into
//! the canonical field set consumed by [`crate::sync::StateSynchronizer`].
//!
//! This is deliberately narrow: it assumes the device location is already
//! known (from the caller, not from SSDP discovery) and only ever talks to
//! that one device.

pub mod health;

use std::time::Duration;

use quick_xml::de::from_str as xml_from_str;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sync::FieldValue;

const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(300);
/// Resubscribe with headroom before the granted timeout lapses.
const RESUBSCRIBE_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DescriptionRoot {
    device: DescriptionDevice,
}

#[derive(Debug, Deserialize)]
struct DescriptionDevice {
    #[serde(rename = "serviceList")]
    service_list: Option<ServiceList>,
}

#[derive(Debug, Deserialize)]
struct ServiceList {
    service: Vec<ServiceDesc>,
}

#[derive(Debug, Deserialize)]
struct ServiceDesc {
    #[serde(rename = "serviceType")]
    service_type: String,
    #[serde(rename = "eventSubURL")]
    event_sub_url: Option<String>,
}

struct ServiceUrls {
    av_transport: Option<String>,
    rendering_control: Option<String>,
}

/// A field update parsed out of a `LastChange` event, handed to the
/// caller-supplied sink (normally `StateSynchronizer::update_from_upnp`).
pub type UpnpUpdate = Vec<(&'static str, FieldValue)>;

/// Subscribes to a single device's AVTransport/RenderingControl services
/// and streams parsed field updates on an mpsc channel.
pub struct UpnpSubscriber {
    client: Client,
    description_url: String,
}

impl UpnpSubscriber {
    pub fn new(description_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            description_url: description_url.into(),
        }
    }

    fn base_url(&self) -> Result<String, url::ParseError> {
        let parsed = url::Url::parse(&self.description_url)?;
        Ok(format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().map(|h| match parsed.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_string(),
            }).unwrap_or_default()
        ))
    }

    async fn fetch_service_urls(&self) -> anyhow::Result<ServiceUrls> {
        let xml = self
            .client
            .get(&self.description_url)
            .send()
            .await?
            .text()
            .await?;
        let root: DescriptionRoot = xml_from_str(&xml)?;
        let base = self.base_url()?;

        let mut av_transport = None;
        let mut rendering_control = None;
        if let Some(services) = root.device.service_list {
            for service in services.service {
                let full = service
                    .event_sub_url
                    .map(|u| format!("{base}{u}"));
                if service.service_type.contains("AVTransport") {
                    av_transport = full;
                } else if service.service_type.contains("RenderingControl") {
                    rendering_control = full;
                }
            }
        }

        Ok(ServiceUrls {
            av_transport,
            rendering_control,
        })
    }

    /// GENA `SUBSCRIBE` against one event sub URL. Returns the granted SID.
    async fn subscribe_one(&self, event_sub_url: &str, callback_url: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .request(reqwest::Method::from_bytes(b"SUBSCRIBE")?, event_sub_url)
            .header("CALLBACK", format!("<{callback_url}>"))
            .header("NT", "upnp:event")
            .header("TIMEOUT", format!("Second-{}", SUBSCRIBE_TIMEOUT.as_secs()))
            .send()
            .await?;
        let sid = resp
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(sid)
    }

    async fn renew_one(&self, event_sub_url: &str, sid: &str) -> anyhow::Result<()> {
        self.client
            .request(reqwest::Method::from_bytes(b"SUBSCRIBE")?, event_sub_url)
            .header("SID", sid)
            .header("TIMEOUT", format!("Second-{}", SUBSCRIBE_TIMEOUT.as_secs()))
            .send()
            .await?;
        Ok(())
    }

    /// Run the subscribe/renew loop until cancelled. `callback_url` is
    /// where the device will deliver `NOTIFY` event bodies — an HTTP
    /// server the caller runs (out of scope here); when it receives a
    /// `NOTIFY`, the caller hands the body to [`parse_notify_body`] and
    /// forwards the result to whatever channel feeds the Synchronizer.
    pub async fn run(&self, callback_url: &str, shutdown: CancellationToken) -> anyhow::Result<()> {
        let urls = self.fetch_service_urls().await?;

        let mut av_sid = None;
        let mut rc_sid = None;
        if let Some(url) = &urls.av_transport {
            av_sid = self.subscribe_one(url, callback_url).await.ok();
        }
        if let Some(url) = &urls.rendering_control {
            rc_sid = self.subscribe_one(url, callback_url).await.ok();
        }

        let mut renew_at = tokio::time::interval(SUBSCRIBE_TIMEOUT - RESUBSCRIBE_MARGIN);
        renew_at.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("upnp subscriber shutting down");
                    return Ok(());
                }
                _ = renew_at.tick() => {
                    if let (Some(url), Some(sid)) = (&urls.av_transport, &av_sid) {
                        if self.renew_one(url, sid).await.is_err() {
                            warn!("AVTransport resubscribe failed, re-subscribing from scratch");
                            av_sid = self.subscribe_one(url, callback_url).await.ok();
                        }
                    }
                    if let (Some(url), Some(sid)) = (&urls.rendering_control, &rc_sid) {
                        if self.renew_one(url, sid).await.is_err() {
                            warn!("RenderingControl resubscribe failed, re-subscribing from scratch");
                            rc_sid = self.subscribe_one(url, callback_url).await.ok();
                        }
                    }
                }
            }
        }
    }
}

/// True when a delivered event carried no state variables at all — the
/// broken-subscription signal spec.md §4.4 says to log as WARN and ignore
/// (auto-resubscribe handles recovery, this function just detects it).
pub fn is_broken_subscription_signal(update: &UpnpUpdate) -> bool {
    update.is_empty()
}

#[derive(Debug, Deserialize)]
struct PropertySet {
    #[serde(rename = "property", default)]
    properties: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    #[serde(rename = "LastChange")]
    last_change: Option<String>,
}

/// Parse a GENA `NOTIFY` body (an outer `<e:propertyset>` whose single
/// `LastChange` property is itself XML-escaped XML) into field updates.
/// An event with no state variables is a broken-subscription signal, not
/// an empty-but-valid update (spec.md §4.4) — the caller should WARN.
pub fn parse_notify_body(body: &str) -> anyhow::Result<UpnpUpdate> {
    let outer: PropertySet = xml_from_str(body)?;
    let last_change = outer
        .properties
        .into_iter()
        .find_map(|p| p.last_change)
        .unwrap_or_default();
    Ok(parse_last_change(&last_change))
}

#[derive(Debug, Deserialize, Default)]
struct LastChangeInstance {
    #[serde(rename = "TransportState", default)]
    transport_state: Option<LastChangeVal>,
    #[serde(rename = "CurrentTrackMetaData", default)]
    current_track_meta_data: Option<LastChangeVal>,
    #[serde(rename = "CurrentTrackDuration", default)]
    current_track_duration: Option<LastChangeVal>,
    #[serde(rename = "RelativeTimePosition", default)]
    relative_time_position: Option<LastChangeVal>,
    #[serde(rename = "Volume", default)]
    volume: Option<LastChangeVal>,
    #[serde(rename = "Mute", default)]
    mute: Option<LastChangeVal>,
}

#[derive(Debug, Deserialize)]
struct LastChangeVal {
    #[serde(rename = "@val")]
    val: String,
}

#[derive(Debug, Deserialize)]
struct LastChangeEvent {
    #[serde(rename = "InstanceID")]
    instance: LastChangeInstance,
}

/// Decode the inner `LastChange` XML document into typed field updates
/// (spec.md §4.4: `TransportState`, `CurrentTrackMetaData`,
/// `CurrentTrackDuration`, `RelativeTimePosition`, `Volume`, `Mute`).
/// An empty result is the WARN-worthy broken-subscription signal; this
/// function itself stays infallible-on-empty, leaving that judgment to
/// the caller, which has the logging context.
fn parse_last_change(xml: &str) -> UpnpUpdate {
    let Ok(event) = xml_from_str::<LastChangeEvent>(xml) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let inst = event.instance;

    if let Some(v) = inst.transport_state {
        out.push((
            crate::sync::fields::PLAY_STATE,
            FieldValue::PlayState(crate::parser::normalize_play_state(&v.val)),
        ));
    }
    if let Some(v) = inst.current_track_duration {
        if let Ok(raw) = parse_hms_or_number(&v.val) {
            out.push((crate::sync::fields::DURATION, FieldValue::F64(raw)));
        }
    }
    if let Some(v) = inst.relative_time_position {
        if let Ok(raw) = parse_hms_or_number(&v.val) {
            out.push((crate::sync::fields::POSITION, FieldValue::F64(raw)));
        }
    }
    if let Some(v) = inst.volume {
        if let Ok(n) = v.val.parse::<u8>() {
            out.push((crate::sync::fields::VOLUME, FieldValue::U8(n)));
        }
    }
    if let Some(v) = inst.mute {
        let muted = v.val == "1" || v.val.eq_ignore_ascii_case("true");
        out.push((crate::sync::fields::MUTED, FieldValue::Bool(muted)));
    }
    if let Some(v) = inst.current_track_meta_data {
        if let Some((title, artist, album)) = parse_didl_lite(&v.val) {
            if let Some(t) = title {
                out.push((crate::sync::fields::TITLE, FieldValue::Str(t)));
            }
            if let Some(a) = artist {
                out.push((crate::sync::fields::ARTIST, FieldValue::Str(a)));
            }
            if let Some(a) = album {
                out.push((crate::sync::fields::ALBUM, FieldValue::Str(a)));
            }
        }
    }

    out
}

/// UPnP time values arrive either as `H+:MM:SS` or plain seconds.
fn parse_hms_or_number(raw: &str) -> Result<f64, ()> {
    if let Ok(n) = raw.parse::<f64>() {
        return Ok(n);
    }
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        return Err(());
    }
    let h: f64 = parts[0].parse().map_err(|_| ())?;
    let m: f64 = parts[1].parse().map_err(|_| ())?;
    let s: f64 = parts[2].parse().map_err(|_| ())?;
    Ok(h * 3600.0 + m * 60.0 + s)
}

#[derive(Debug, Deserialize, Default)]
struct DidlLite {
    #[serde(rename = "item", default)]
    item: Option<DidlItem>,
}

#[derive(Debug, Deserialize, Default)]
struct DidlItem {
    #[serde(rename = "title", default)]
    title: Option<String>,
    #[serde(rename = "artist", default)]
    artist: Option<String>,
    #[serde(rename = "album", default)]
    album: Option<String>,
}

fn parse_didl_lite(xml: &str) -> Option<(Option<String>, Option<String>, Option<String>)> {
    let parsed: DidlLite = xml_from_str(xml).ok()?;
    let item = parsed.item?;
    Some((item.title, item.artist, item.album))
}
