#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Covers spec.md §4.2's pinned-protocol-and-port probe failure mode: "If
//! caller specified both protocol and port, try exactly that combination;
//! on failure, raise `Connection` error" — including the case where the
//! single candidate responds but with a body that isn't parseable as a
//! status or plain `OK`.

mod support;

use wiim_linkplay_core::error::Error;
use wiim_linkplay_core::profile::DeviceProfile;
use wiim_linkplay_core::transport::{ConnectHint, Transport};

#[tokio::test]
async fn pinned_non_parseable_probe_response_is_connection_failure() {
    let mock = support::MockDevice::start().await;
    mock.set_response("getStatusEx", "not json and not OK").await;

    let opts = mock.player_options();
    let hint = ConnectHint {
        protocol: opts.protocol,
        port: opts.port,
    };
    let profile = DeviceProfile::wiim();
    let transport = Transport::new(mock.host(), &profile, hint).unwrap();

    let result = transport.call("getPlayerStatusEx").await;

    assert!(
        matches!(result, Err(Error::ConnectionFailure { .. })),
        "expected ConnectionFailure, got {result:?}"
    );

    mock.stop().await;
}
