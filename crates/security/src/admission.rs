//! Admission control: per-client sliding-window rate limiting.
//!
//! Every client identifier owns two timestamp queues: requests seen in the
//! last minute and in the last hour. A request is admitted only when both
//! queues are below their limits; rejected attempts are not recorded.
//!
//! The whole table sits behind one `std::sync::Mutex` (non-async, held for
//! a prune + push), so two concurrent requests from the same client cannot
//! both observe a count below the limit.
//!
//! Once the table exceeds `max_tracked_clients`, idle clients are swept
//! inline. After each sweep the next one waits until the table has doubled
//! from its post-sweep size, so a flood of live identifiers costs amortized
//! O(1) per call instead of a full scan per call.

use bluechat_config::LimitsConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Limits enforced by the [`AdmissionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub per_minute: usize,
    pub per_hour: usize,
    /// Tracked-client count above which idle clients are swept inline.
    pub max_tracked_clients: usize,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            max_tracked_clients: 10_000,
        }
    }
}

impl From<&LimitsConfig> for AdmissionLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            per_minute: config.requests_per_minute,
            per_hour: config.requests_per_hour,
            max_tracked_clients: config.max_tracked_clients,
        }
    }
}

/// Why a request was throttled. The message is safe to return to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Rate limit exceeded: max {limit} requests per minute")]
    MinuteLimit { limit: usize },

    #[error("Rate limit exceeded: max {limit} requests per hour")]
    HourLimit { limit: usize },
}

/// Request timestamps of one client, oldest first.
#[derive(Debug, Default)]
struct RateWindow {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        prune_older_than(&mut self.minute, now, MINUTE);
        prune_older_than(&mut self.hour, now, HOUR);
    }

    fn latest(&self) -> Option<Instant> {
        self.hour.back().copied()
    }
}

fn prune_older_than(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while queue
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= window)
    {
        queue.pop_front();
    }
}

#[derive(Debug)]
struct ClientTable {
    windows: HashMap<String, RateWindow>,
    /// Size above which the next inline sweep runs.
    sweep_above: usize,
    inline_sweeps: u64,
}

impl ClientTable {
    fn new(max_tracked_clients: usize) -> Self {
        Self {
            windows: HashMap::new(),
            sweep_above: max_tracked_clients,
            inline_sweeps: 0,
        }
    }

    fn sweep(&mut self, now: Instant, max_tracked_clients: usize) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window.prune(now);
            !window.hour.is_empty()
        });
        self.sweep_above = max_tracked_clients.max(self.windows.len().saturating_mul(2));
        before - self.windows.len()
    }
}

/// Per-client admission controller.
///
/// Constructed once at startup and shared behind an `Arc`.
pub struct AdmissionController {
    limits: AdmissionLimits,
    clients: Mutex<ClientTable>,
}

impl AdmissionController {
    pub fn new(limits: AdmissionLimits) -> Self {
        Self {
            limits,
            clients: Mutex::new(ClientTable::new(limits.max_tracked_clients)),
        }
    }

    pub fn limits(&self) -> AdmissionLimits {
        self.limits
    }

    /// Admit or throttle a request from `client_id` at the current time.
    pub fn check_and_record(&self, client_id: &str) -> Result<(), AdmissionError> {
        self.check_and_record_at(client_id, Instant::now())
    }

    /// Admit or throttle a request from `client_id` at `now`.
    ///
    /// On success the attempt is recorded in both windows.
    pub fn check_and_record_at(&self, client_id: &str, now: Instant) -> Result<(), AdmissionError> {
        let mut table = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if table.windows.len() > table.sweep_above {
            let removed = table.sweep(now, self.limits.max_tracked_clients);
            table.inline_sweeps += 1;
            debug!(
                removed,
                remaining = table.windows.len(),
                next_at = table.sweep_above,
                sweeps = table.inline_sweeps,
                "Inline sweep of idle clients"
            );
        }

        let window = table.windows.entry(client_id.to_string()).or_default();
        // Timestamps within a client's queues never go backwards.
        let now = window.latest().map_or(now, |latest| now.max(latest));
        window.prune(now);

        if window.minute.len() >= self.limits.per_minute {
            warn!(client = %truncate_client(client_id), "Minute rate limit exceeded");
            return Err(AdmissionError::MinuteLimit {
                limit: self.limits.per_minute,
            });
        }

        if window.hour.len() >= self.limits.per_hour {
            warn!(client = %truncate_client(client_id), "Hour rate limit exceeded");
            return Err(AdmissionError::HourLimit {
                limit: self.limits.per_hour,
            });
        }

        window.minute.push_back(now);
        window.hour.push_back(now);
        Ok(())
    }

    /// Drop clients with no request inside the hour window. Returns how many
    /// were removed.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let mut table = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        table.sweep(now, self.limits.max_tracked_clients)
    }

    /// Number of client identifiers currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .windows
            .len()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionLimits::default())
    }
}

/// Client identifiers come from a spoofable header; keep log lines short.
fn truncate_client(client_id: &str) -> String {
    client_id.chars().take(45).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn controller(per_minute: usize, per_hour: usize) -> AdmissionController {
        AdmissionController::new(AdmissionLimits {
            per_minute,
            per_hour,
            max_tracked_clients: 10_000,
        })
    }

    #[test]
    fn eleventh_request_in_a_minute_is_throttled() {
        let ac = controller(10, 100);
        let t0 = Instant::now();

        for i in 0..10 {
            let at = t0 + Duration::from_secs(i * 5);
            assert!(ac.check_and_record_at("1.2.3.4", at).is_ok(), "call {i}");
        }

        let err = ac
            .check_and_record_at("1.2.3.4", t0 + Duration::from_secs(50))
            .unwrap_err();
        assert_eq!(err, AdmissionError::MinuteLimit { limit: 10 });
        assert!(err.to_string().contains("max 10 requests per minute"));

        // By +106s every earlier call has left the minute window.
        assert!(
            ac.check_and_record_at("1.2.3.4", t0 + Duration::from_secs(106))
                .is_ok()
        );
    }

    #[test]
    fn burst_recovers_after_a_minute() {
        let ac = controller(10, 100);
        let t0 = Instant::now();
        for _ in 0..10 {
            ac.check_and_record_at("client", t0).unwrap();
        }
        assert!(ac.check_and_record_at("client", t0).is_err());
        assert!(
            ac.check_and_record_at("client", t0 + Duration::from_secs(61))
                .is_ok()
        );
    }

    #[test]
    fn rejected_attempts_are_not_recorded() {
        let ac = controller(2, 100);
        let t0 = Instant::now();
        ac.check_and_record_at("c", t0).unwrap();
        ac.check_and_record_at("c", t0).unwrap();
        for _ in 0..50 {
            assert!(ac.check_and_record_at("c", t0).is_err());
        }
        // Only the two admitted calls count against the hour window.
        let later = t0 + Duration::from_secs(61);
        assert!(ac.check_and_record_at("c", later).is_ok());
        assert!(ac.check_and_record_at("c", later).is_ok());
    }

    #[test]
    fn hour_limit_applies_across_minutes() {
        let ac = controller(10, 20);
        let t0 = Instant::now();
        for i in 0..20 {
            let at = t0 + Duration::from_secs(i * 61);
            ac.check_and_record_at("c", at).unwrap();
        }
        let err = ac
            .check_and_record_at("c", t0 + Duration::from_secs(20 * 61))
            .unwrap_err();
        assert_eq!(err, AdmissionError::HourLimit { limit: 20 });
        assert!(err.to_string().contains("per hour"));

        assert!(
            ac.check_and_record_at("c", t0 + Duration::from_secs(3600 + 61))
                .is_ok()
        );
    }

    #[test]
    fn clients_are_isolated() {
        let ac = controller(3, 100);
        let t0 = Instant::now();
        for _ in 0..3 {
            ac.check_and_record_at("alice", t0).unwrap();
        }
        assert!(ac.check_and_record_at("alice", t0).is_err());
        for _ in 0..3 {
            assert!(ac.check_and_record_at("bob", t0).is_ok());
        }
        assert!(ac.check_and_record_at("bob", t0).is_err());
    }

    #[test]
    fn sweep_drops_only_idle_clients() {
        let ac = controller(10, 100);
        let t0 = Instant::now();
        ac.check_and_record_at("old", t0).unwrap();
        ac.check_and_record_at("recent", t0 + Duration::from_secs(3000))
            .unwrap();
        assert_eq!(ac.tracked_clients(), 2);

        let removed = ac.sweep_idle(t0 + Duration::from_secs(3601));
        assert_eq!(removed, 1);
        assert_eq!(ac.tracked_clients(), 1);
    }

    #[test]
    fn inline_sweep_bounds_table() {
        let ac = AdmissionController::new(AdmissionLimits {
            per_minute: 10,
            per_hour: 100,
            max_tracked_clients: 5,
        });
        let t0 = Instant::now();
        for i in 0..6 {
            ac.check_and_record_at(&format!("forged-{i}"), t0).unwrap();
        }
        assert_eq!(ac.tracked_clients(), 6);

        ac.check_and_record_at("fresh", t0 + Duration::from_secs(3700))
            .unwrap();
        assert_eq!(ac.tracked_clients(), 1);
    }

    #[test]
    fn inline_sweep_waits_for_table_to_double() {
        let ac = AdmissionController::new(AdmissionLimits {
            per_minute: 10,
            per_hour: 100,
            max_tracked_clients: 100,
        });
        let t0 = Instant::now();
        // Every identifier stays live for the whole hour, so no sweep frees anything.
        for i in 0..2_000 {
            ac.check_and_record_at(&format!("forged-{i}"), t0).unwrap();
        }
        for _ in 0..200 {
            let _ = ac.check_and_record_at("legit", t0);
        }

        let table = ac.clients.lock().unwrap();
        assert_eq!(table.windows.len(), 2_001);
        // Sweeps at 101, 203, 407, 815, 1631 clients: one per doubling.
        assert_eq!(table.inline_sweeps, 5);
        assert!(table.sweep_above >= 2 * 1_631);
    }

    #[test]
    fn periodic_sweep_resets_inline_threshold() {
        let ac = AdmissionController::new(AdmissionLimits {
            per_minute: 10,
            per_hour: 100,
            max_tracked_clients: 4,
        });
        let t0 = Instant::now();
        for i in 0..20 {
            ac.check_and_record_at(&format!("forged-{i}"), t0).unwrap();
        }
        assert!(ac.clients.lock().unwrap().sweep_above > 4);

        assert_eq!(ac.sweep_idle(t0 + HOUR), 20);
        assert_eq!(ac.clients.lock().unwrap().sweep_above, 4);
    }

    #[test]
    fn backwards_clock_does_not_reorder_window() {
        let ac = controller(10, 100);
        let t0 = Instant::now();
        ac.check_and_record_at("c", t0 + Duration::from_secs(30))
            .unwrap();
        ac.check_and_record_at("c", t0).unwrap();
        // Both calls are treated as happening at +30s and expire together.
        let removed = ac.sweep_idle(t0 + Duration::from_secs(3630));
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn concurrent_requests_never_exceed_limit() {
        let ac = Arc::new(controller(10, 100));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let ac = ac.clone();
            handles.push(tokio::spawn(async move {
                ac.check_and_record("same-client").is_ok()
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
