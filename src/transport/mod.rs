//! HTTP Transport (spec.md §4.2).
//!
//! One [`Transport`] per device. Owns a `reqwest::Client` configured for
//! self-signed TLS acceptance (and mutual TLS for profiles that require
//! it), a permanently-cached `(protocol, host, port)` tuple, and the
//! bounded-retry/log-escalation policy around `GET httpapi.asp?command=...`.

mod cert;

use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::endpoint::{allows_non_json, endpoint_chain, LogicalEndpoint};
use crate::error::{ConnectionFailureCause, DeviceContext, Error};
use crate::profile::{ConnectionConfig, DeviceProfile, Protocol};

/// Standard fallback list tried when the caller gives no protocol/port
/// hint and the profile's own preferences are exhausted (spec.md §4.2).
const STANDARD_PROBE_LIST: &[(Protocol, u16)] = &[
    (Protocol::Https, 443),
    (Protocol::Https, 4443),
    (Protocol::Https, 8443),
    (Protocol::Http, 80),
    (Protocol::Http, 8080),
];

/// Minimum per-attempt connect timeout (spec.md §4.2, §9).
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Minimum total probe timeout, independent of any single profile's
/// `response_timeout` (spec.md §9: "probe total ≥ 5s").
const MIN_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_RETRY_ATTEMPTS: u32 = 6;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoint {
    protocol: Protocol,
    port: u16,
}

/// Either side of the caller-supplied connection hint at construction time
/// (spec.md §4.2 probing rules 1-2).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectHint {
    pub protocol: Option<Protocol>,
    pub port: Option<u16>,
}

pub struct Transport {
    client: reqwest::Client,
    host: String,
    hint: ConnectHint,
    profile_connection: ConnectionConfig,
    cached_endpoint: RwLock<Option<Endpoint>>,
}

impl Transport {
    /// Build a `Transport` for `host`. The client is configured once;
    /// protocol/port are resolved lazily on first request (spec.md §4.2).
    pub fn new(host: impl Into<String>, profile: &DeviceProfile, hint: ConnectHint) -> Result<Self, Error> {
        let host = host.into();
        let ctx = DeviceContext {
            host: host.clone(),
            ..Default::default()
        };

        let timeout = profile
            .connection
            .response_timeout
            .max(MIN_PROBE_TIMEOUT);

        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(MIN_CONNECT_TIMEOUT.max(Duration::from_millis(
                (timeout.as_millis() / 5) as u64,
            )))
            .timeout(timeout);

        if profile.connection.requires_client_cert {
            let identity = cert::client_identity(&ctx)?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|source| Error::ConnectionFailure {
            ctx,
            endpoint: "client-build".to_string(),
            source: source.into(),
        })?;

        Ok(Self {
            client,
            host,
            hint,
            profile_connection: profile.connection.clone(),
            cached_endpoint: RwLock::new(None),
        })
    }

    fn device_ctx(&self) -> DeviceContext {
        DeviceContext {
            host: self.host.clone(),
            ..Default::default()
        }
    }

    /// Clear the cached `(protocol, host, port)` tuple (spec.md §4.2:
    /// "used after firmware update"). The next request re-probes.
    pub async fn reprobe(&self) {
        *self.cached_endpoint.write().await = None;
    }

    fn candidates(&self) -> Vec<Endpoint> {
        if let (Some(protocol), Some(port)) = (self.hint.protocol, self.hint.port) {
            return vec![Endpoint { protocol, port }];
        }
        if let Some(port) = self.hint.port {
            return vec![
                Endpoint {
                    protocol: Protocol::Https,
                    port,
                },
                Endpoint {
                    protocol: Protocol::Http,
                    port,
                },
            ];
        }
        self.profile_connection
            .preferred
            .iter()
            .map(|&(protocol, port)| Endpoint { protocol, port })
            .chain(
                STANDARD_PROBE_LIST
                    .iter()
                    .map(|&(protocol, port)| Endpoint { protocol, port }),
            )
            .collect()
    }

    fn url_for(&self, endpoint: Endpoint, command: &str) -> String {
        let scheme = match endpoint.protocol {
            Protocol::Https => "https",
            Protocol::Http => "http",
        };
        format!(
            "{scheme}://{}:{}/httpapi.asp?command={command}",
            self.host, endpoint.port
        )
    }

    /// Ensure `cached_endpoint` is populated, probing candidates in order
    /// if not. A probe succeeds when a canonical status endpoint returns a
    /// parseable body or plain `OK` (spec.md §4.2).
    async fn ensure_endpoint(&self) -> Result<Endpoint, Error> {
        if let Some(ep) = *self.cached_endpoint.read().await {
            return Ok(ep);
        }

        let candidates = self.candidates();
        let caller_pinned = self.hint.protocol.is_some() && self.hint.port.is_some();
        let mut last_err: Option<Error> = None;

        for ep in candidates {
            let url = self.url_for(ep, "getStatusEx");
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let body = resp.text().await.unwrap_or_default();
                    if is_parseable_probe_response(&body) {
                        *self.cached_endpoint.write().await = Some(ep);
                        return Ok(ep);
                    }
                    // A response came back but wasn't parseable. For a
                    // caller-pinned (protocol, port) this is the only
                    // candidate there is, so it's the failure spec.md §4.2
                    // says to surface as a `Connection` error, not a
                    // precondition failure — there was never an
                    // ambiguity to resolve, just one combination that
                    // didn't work.
                    last_err = Some(Error::ConnectionFailure {
                        ctx: self.device_ctx(),
                        endpoint: url,
                        source: ConnectionFailureCause::NonParseableProbeResponse {
                            body_excerpt: body.chars().take(200).collect(),
                        },
                    });
                    if caller_pinned {
                        break;
                    }
                }
                Err(source) => {
                    last_err = Some(Error::ConnectionFailure {
                        ctx: self.device_ctx(),
                        endpoint: url,
                        source: source.into(),
                    });
                    if caller_pinned {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::precondition("probe", "no candidate protocol/port combination responded")
        }))
    }

    /// Issue `command` against the currently-cached (or freshly-probed)
    /// endpoint, with bounded exponential-backoff retry on transient
    /// errors. Returns the raw response body.
    pub async fn call(&self, command: &str) -> Result<serde_json::Value, Error> {
        let endpoint = self.ensure_endpoint().await?;
        let url = self.url_for(endpoint, command);

        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let body = resp.text().await.unwrap_or_default();
                    return parse_response(&self.device_ctx(), command, &url, &body);
                }
                Err(source) => {
                    let err = Error::ConnectionFailure {
                        ctx: self.device_ctx(),
                        endpoint: url.clone(),
                        source: source.into(),
                    };
                    if attempt >= MAX_RETRY_ATTEMPTS {
                        error!(command, attempts = attempt, "transport call exhausted retries");
                        return Err(Error::Timeout {
                            ctx: self.device_ctx(),
                            endpoint: command.to_string(),
                            attempts: attempt,
                        });
                    }
                    log_retry(attempt, command, &err);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    /// Call the first working endpoint in `endpoint`'s fallback chain for
    /// `profile`, raising `UnsupportedOperation` without I/O on an empty
    /// chain (spec.md §4.2).
    pub async fn call_logical(
        &self,
        endpoint: LogicalEndpoint,
        profile: &DeviceProfile,
        suffix: &str,
    ) -> Result<serde_json::Value, Error> {
        let chain = endpoint_chain(endpoint, profile);
        if chain.is_empty() {
            return Err(Error::unsupported(
                format!("{endpoint:?}"),
                "no endpoint in this profile's fallback chain supports this operation",
            ));
        }

        let mut last_err = Error::precondition(
            "call_logical",
            "no endpoint in a non-empty chain was attempted",
        );
        for command_base in chain {
            let command = if suffix.is_empty() {
                command_base.to_string()
            } else {
                format!("{command_base}:{suffix}")
            };
            match self.call(&command).await {
                Ok(v) => return Ok(v),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

/// WARN for the first 2 attempts, DEBUG for the next 2, ERROR from the
/// 5th attempt onward (spec.md §4.2).
fn log_retry(attempt: u32, command: &str, err: &Error) {
    match attempt {
        1 | 2 => warn!(attempt, command, %err, "transport retry"),
        3 | 4 => debug!(attempt, command, %err, "transport retry"),
        _ => error!(attempt, command, %err, "transport retry"),
    }
}

fn is_parseable_probe_response(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.eq_ignore_ascii_case("ok") || serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

fn parse_response(
    ctx: &DeviceContext,
    command: &str,
    url: &str,
    body: &str,
) -> Result<serde_json::Value, Error> {
    let trimmed = body.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(v) => Ok(v),
        Err(_) if allows_non_json(command) => Ok(serde_json::json!({ "raw": trimmed })),
        Err(_) => Err(Error::ResponseMalformed {
            ctx: ctx.clone(),
            endpoint: url.to_string(),
            body_excerpt: trimmed.chars().take(200).collect(),
        }),
    }
}
