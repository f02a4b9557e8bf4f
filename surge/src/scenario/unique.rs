use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Process-wide source of collision-free tokens for payloads and synthesized ids.
///
/// A token is the wall clock in milliseconds plus a sequence number, so two calls in the same
/// millisecond (from any virtual user) still differ.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniqueTokens;

impl UniqueTokens {
    pub fn next(&self) -> String {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!("{millis}-{seq}")
    }
}
