use serde::Serialize;

/// Counters for everything the session recovers from locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub dispatched: u64,
    pub unknown_type: u64,
    pub truncated: u64,
    pub malformed: u64,
    pub handler_less: u64,
    pub transfer_overruns: u64,
    pub superseded_transfers: u64,
    pub orphan_chunks: u64,
    pub rejected_sends: u64,
}
