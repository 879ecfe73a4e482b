/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Logging conventions and formatting helpers.
//!
//! polychain-core logs using the [log](https://docs.rs/log/latest/log/) crate. To get these
//! messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! Components log directly at the site where the logged condition is detected:
//! - `warn!`: dropped events, unexpected message types.
//! - `info!`: lifecycle transitions, received sync requests, computed sync intervals.
//! - `debug!`: action handler errors, empty peer lists.
//! - `error!`: block and sync handler errors.
//!
//! Block hashes are long and mostly entropy, so log messages abbreviate them to the first seven
//! characters of their Base64 encoding.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::types::CryptoHash;

/// Abbreviate a block hash to the first seven characters of its Base64 encoding for logging.
pub(crate) fn short_hash(hash: &CryptoHash) -> String {
    let mut encoded = STANDARD_NO_PAD.encode(hash.bytes());
    encoded.truncate(7);
    encoded
}
