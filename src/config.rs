//! Layered, typed configuration for the session manager, mirroring the teacher's
//! `quinn_proto::endpoint::Config`: a plain public-field struct with a hand-written `Default`,
//! rather than a separate builder type the teacher itself does not use.

/// Tunables named across §3, §4, §5 and §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionManagerConfig {
    /// A session with no inbound traffic for longer than this is destroyed (§3 Lifecycle).
    pub session_timeout_millis: u64,
    /// How often a maintained session re-triggers a route search while not yet established
    /// (§4.8).
    pub session_search_after_millis: u64,
    /// Upper bound on simultaneously buffered outbound messages (§3 I4, §4.4).
    pub max_buffered_messages: usize,
    /// A buffered message older than this is dropped by the timeout sweep (§4.4, fixed at 10s
    /// in the source design but exposed here for test determinism).
    pub buffer_timeout_millis: u64,
    /// Housekeeper tick interval (§2, fixed at 10s in the source design, exposed for tests).
    pub housekeeper_interval_millis: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        SessionManagerConfig {
            session_timeout_millis: 2 * 60 * 1000,
            session_search_after_millis: 20 * 1000,
            max_buffered_messages: 256,
            buffer_timeout_millis: 10_000,
            housekeeper_interval_millis: 10_000,
        }
    }
}
