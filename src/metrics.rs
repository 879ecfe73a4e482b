/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Prometheus collectors observed by the core subsystems.
//!
//! The collectors are created once as process-wide statics and registered in a single place:
//! [`register_metrics`]. No other module registers collectors, so operators who do not call
//! `register_metrics` pay only the cost of the unexported counters.
//!
//! Exported collectors:
//! - `polychain_dispatch_request`: dispatcher request counter, labelled by `(method, succeed)`.
//! - `polychain_snapshot_gauge`: cached batch snapshot stack sizes, labelled by
//!   `source ∈ {batch_size, cache_size}`.
//! - `polychain_snapshot_counter`: cached batch snapshot operations, labelled by
//!   `source ∈ {snapshot, revert, clear, clearAndUnlock}`.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    pub(crate) static ref DISPATCH_REQUEST_COUNTER: IntCounterVec = IntCounterVec::new(
        Opts::new("polychain_dispatch_request", "Dispatcher request counter."),
        &["method", "succeed"],
    )
    .expect("the dispatch request counter opts are well-formed");

    pub(crate) static ref SNAPSHOT_GAUGE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("polychain_snapshot_gauge", "Cached batch snapshot stack sizes."),
        &["source"],
    )
    .expect("the snapshot gauge opts are well-formed");

    pub(crate) static ref SNAPSHOT_COUNTER: IntCounterVec = IntCounterVec::new(
        Opts::new("polychain_snapshot_counter", "Cached batch snapshot operations."),
        &["source"],
    )
    .expect("the snapshot counter opts are well-formed");
}

/// Register every collector exported by polychain-core with `registry`.
///
/// This is the only registration entry point in the crate. Call it at most once per registry;
/// registering the same collectors twice returns an [`AlreadyReg`](prometheus::Error::AlreadyReg)
/// error.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(DISPATCH_REQUEST_COUNTER.clone()))?;
    registry.register(Box::new(SNAPSHOT_GAUGE.clone()))?;
    registry.register(Box::new(SNAPSHOT_COUNTER.clone()))?;
    Ok(())
}
