//! Conversion glue between `bridge-secrets`' error type and the
//! cross-cutting [`BridgeError`] taxonomy every command here returns (spec
//! §7). `SecretStoreError` can't carry a blanket `From` impl for
//! `BridgeError` since neither type lives in this crate, so call sites use
//! [`secret_error`] explicitly wherever a `SecretStoreExt` call can fail.

use bridge_common::BridgeError;
use bridge_secrets::SecretStoreError;

pub fn secret_error(err: SecretStoreError) -> BridgeError {
    BridgeError::client(err.to_string())
}
