//! C7: the periodic housekeeper (§4.8). Walks sessions back-to-front so that removing an entry
//! mid-scan never perturbs the handles of entries still to be visited, times out stale sessions,
//! nudges stalled handshakes to re-search, and sweeps the buffered-message store.

use crate::event::{CoreEvent, BROADCAST_PATHFINDER};
use crate::manager::{node_for, SessionManager};

impl SessionManager {
    /// Runs one housekeeping pass. Callers are expected to invoke this roughly every
    /// `config.housekeeper_interval_millis`; nothing here depends on being called at an exact
    /// cadence, since every comparison is against absolute timestamps.
    pub fn run_housekeeping(&mut self, now: u64) {
        for handle in self.sessions.handles_back_to_front() {
            self.housekeep_one(handle, now);
        }
        for ip in self.buffers.check_timed_out(now) {
            tracing::debug!(address = ?ip, "buffered message timed out");
        }
        self.last_housekeeping_millis = now;
    }

    fn housekeep_one(&mut self, handle: u32, now: u64) {
        let snapshot = match self.sessions.get_by_handle(handle) {
            Some(s) => (
                now.saturating_sub(s.time_of_keep_alive_in) > self.config.session_timeout_millis,
                s.maintain_session,
                s.ready_for_data(),
                now.saturating_sub(s.last_search_time) >= self.config.session_search_after_millis,
                s.version != 0 && s.send_switch_label != 0,
            ),
            None => return,
        };
        let (timed_out, maintain, ready, search_due, has_route_target) = snapshot;

        if timed_out {
            if let Some(session) = self.sessions.remove_by_handle(handle) {
                tracing::debug!(handle, address = ?session.ip6, "session timed out, removing");
                self.bus_out.push(CoreEvent::SessionEnded {
                    target_pathfinder: BROADCAST_PATHFINDER,
                    node: node_for(&session),
                });
            }
            return;
        }

        if !maintain || ready || !search_due {
            return;
        }

        if let Some(session) = self.sessions.get_by_handle(handle) {
            session.last_search_time = now;
        }

        if has_route_target {
            let node = {
                let session = self
                    .sessions
                    .get_by_handle(handle)
                    .expect("handle resolved above");
                node_for(session)
            };
            self.bus_out.push(CoreEvent::UnsetupSession {
                target_pathfinder: BROADCAST_PATHFINDER,
                node,
            });
        }
    }
}
