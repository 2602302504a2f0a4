//! Embedded mutual-TLS client identity (spec.md §4.2: "load an embedded
//! client certificate and present it on every request").
//!
//! The identity below is a placeholder self-signed pair checked into the
//! crate for profiles that set `requires_client_cert` (currently only
//! Audio Pro MkII). A real distribution would substitute the vendor's
//! issued certificate/key; the loading path is what this module grounds.

use crate::error::{DeviceContext, Error};

/// PEM-encoded client certificate + private key, concatenated as
/// `reqwest::Identity::from_pem` expects.
const CLIENT_IDENTITY_PEM: &[u8] = include_bytes!("client_identity.pem");

/// Build the `reqwest::Identity` used for profiles with
/// `requires_client_cert`. Fails closed: a malformed embedded identity is
/// a build-time bug, surfaced as a `ConnectionFailure`-shaped error rather
/// than a panic.
pub fn client_identity(ctx: &DeviceContext) -> Result<reqwest::Identity, Error> {
    reqwest::Identity::from_pem(CLIENT_IDENTITY_PEM).map_err(|source| Error::ConnectionFailure {
        ctx: ctx.clone(),
        endpoint: "client_identity.pem".to_string(),
        source: source.into(),
    })
}
