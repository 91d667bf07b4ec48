//! Polling loop: fetch → parse → diff → allocate → update seen-set.
//!
//! One cycle runs at a time. A timer tick that fires while a cycle is still
//! in flight is skipped, not queued.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::crm_client::CrmClient;
use crate::errors::{AppError, ResultExt};
use crate::lead_parser::LeadParser;
use crate::models::Lead;
use crate::seen_set::{new_leads, SeenSet};

/// Behaviour switches for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Claim new leads automatically instead of only reporting them.
    pub auto_allocate: bool,
    /// Keep leads of a failed allocation batch out of the seen-set so the
    /// next cycle offers them again.
    pub retry_failed_allocations: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            auto_allocate: true,
            retry_failed_allocations: false,
        }
    }
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            auto_allocate: config.auto_allocate,
            retry_failed_allocations: config.retry_failed_allocations,
        }
    }
}

/// What a single timer tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A previous cycle was still running; nothing was done.
    Skipped,
    /// The lead list could not be fetched; counts as zero leads observed.
    FetchFailed,
    /// Every listed lead was already known.
    NoNewLeads { total: usize },
    /// New leads were found but auto-allocation is disabled.
    NotifiedOnly { lead_ids: Vec<String> },
    /// New leads were claimed.
    Allocated { lead_ids: Vec<String> },
    /// The allocation batch failed as a whole.
    AllocationFailed { lead_ids: Vec<String>, reason: String },
}

pub struct Poller {
    client: CrmClient,
    parser: LeadParser,
    settings: PollSettings,
    seen: Mutex<SeenSet>,
    in_flight: AtomicBool,
    checks: AtomicU64,
}

impl Poller {
    pub fn new(client: CrmClient, settings: PollSettings) -> Result<Self, AppError> {
        Ok(Self {
            client,
            parser: LeadParser::new()?,
            settings,
            seen: Mutex::new(SeenSet::new()),
            in_flight: AtomicBool::new(false),
            checks: AtomicU64::new(0),
        })
    }

    /// Behaviour switches this poller was built with.
    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Number of cycles that actually ran (skipped ticks excluded).
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn seen_count(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn seen_ids(&self) -> HashSet<String> {
        self.seen.lock().await.ids()
    }

    /// Records every lead currently listed as already seen.
    ///
    /// Run once before the timer starts so only leads that appear afterwards
    /// are treated as new.
    pub async fn prime(&self) -> Result<usize, AppError> {
        tracing::info!("Initializing existing leads...");

        let html = self
            .client
            .fetch_lead_list()
            .await
            .context("Failed to initialize existing leads")?;
        let leads = self.parser.parse(&html);

        let mut seen = self.seen.lock().await;
        seen.mark_all(&leads);
        tracing::info!("✓ Initialized with {} existing lead(s)", seen.len());
        Ok(seen.len())
    }

    /// Runs one poll cycle unless another one is still in flight.
    pub async fn tick(&self) -> CycleOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            tracing::warn!("Previous check still processing, skipping...");
            return CycleOutcome::Skipped;
        };

        let check = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!("Check #{} - Fetching current lead list...", check);

        self.run_cycle().await
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let html = match self.client.fetch_lead_list().await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to fetch lead list: {}", e);
                return CycleOutcome::FetchFailed;
            }
        };

        let current = self.parser.parse(&html);
        tracing::debug!("Found {} total lead(s) in the list", current.len());

        let fresh = new_leads(&current, &*self.seen.lock().await);
        if fresh.is_empty() {
            tracing::debug!("No new leads found");
            self.mark_seen(&current, &[]).await;
            return CycleOutcome::NoNewLeads {
                total: current.len(),
            };
        }

        tracing::info!("🎯 Found {} NEW lead(s)!", fresh.len());
        for lead in &fresh {
            tracing::info!("  → New Lead: {}", lead.id);
        }
        let lead_ids: Vec<String> = fresh.iter().map(|lead| lead.id.clone()).collect();

        if !self.settings.auto_allocate {
            tracing::warn!("Auto-allocation is disabled. Please allocate manually.");
            self.mark_seen(&current, &[]).await;
            return CycleOutcome::NotifiedOnly { lead_ids };
        }

        match self.client.allocate(&fresh).await {
            Ok(receipt) => {
                tracing::info!(
                    "✓ Successfully allocated {} lead(s) to your bucket at {}!",
                    receipt.lead_ids.len(),
                    receipt.allocated_at.format("%H:%M:%S")
                );
                for id in &receipt.lead_ids {
                    tracing::info!("  ✓ Lead ID: {}", id);
                }
                self.mark_seen(&current, &[]).await;
                CycleOutcome::Allocated { lead_ids }
            }
            Err(e) => {
                tracing::error!("Allocation failed: {}", e);
                let held_back: &[Lead] = if self.settings.retry_failed_allocations {
                    tracing::warn!("{} lead(s) will be offered again next check", fresh.len());
                    &fresh
                } else {
                    &[]
                };
                self.mark_seen(&current, held_back).await;
                CycleOutcome::AllocationFailed {
                    lead_ids,
                    reason: e.root().to_string(),
                }
            }
        }
    }

    async fn mark_seen(&self, current: &[Lead], held_back: &[Lead]) {
        let to_mark = leads_to_mark_seen(current, held_back);
        let mut seen = self.seen.lock().await;
        if tracing::enabled!(tracing::Level::DEBUG) {
            for lead in &to_mark {
                if let Some(at) = seen.first_seen(&lead.id) {
                    tracing::debug!(
                        "Lead {} still listed, first seen {}",
                        lead.id,
                        at.to_rfc3339()
                    );
                }
            }
        }
        let added = seen.mark_all(to_mark);
        if added > 0 {
            tracing::debug!("Seen-set grew by {} to {}", added, seen.len());
        }
    }

    /// Drives `tick` on a fixed period until `shutdown` resolves.
    ///
    /// Each tick runs as its own task so a slow cycle makes later ticks hit
    /// the single-flight guard. The first tick fires immediately. A cycle still
    /// running at shutdown is aborted.
    pub async fn run_until<F>(self: Arc<Self>, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        run_periodically(period, shutdown, move || {
            let poller = Arc::clone(&self);
            async move {
                poller.tick().await;
            }
        })
        .await;
    }
}

/// Spawns `cycle()` on every tick of `period` until `shutdown` resolves.
///
/// A panicking cycle is logged and the timer keeps going.
async fn run_periodically<F, C, Fut>(period: Duration, shutdown: F, mut cycle: C)
where
    F: Future<Output = ()>,
    C: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Stopping periodic checks");
                break;
            }
            _ = interval.tick() => {
                cycles.spawn(cycle());
            }
            Some(finished) = cycles.join_next() => {
                if let Err(e) = finished {
                    tracing::error!("Error during check: {}", e);
                }
            }
        }
    }

    cycles.shutdown().await;
}

/// Leads of `current` that go into the seen-set, minus those `held_back`.
fn leads_to_mark_seen<'a>(current: &'a [Lead], held_back: &[Lead]) -> Vec<&'a Lead> {
    if held_back.is_empty() {
        return current.iter().collect();
    }
    let held: HashSet<&str> = held_back.iter().map(|lead| lead.id.as_str()).collect();
    current
        .iter()
        .filter(|lead| !held.contains(lead.id.as_str()))
        .collect()
}

/// Claims the in-flight flag and releases it on drop, on every exit path.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(id: &str) -> Lead {
        Lead::new(id, format!("tok-{}", id), "")
    }

    #[test]
    fn test_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);

        let first = FlightGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(FlightGuard::acquire(&flag).is_none());

        drop(first);
        assert!(!flag.load(Ordering::Acquire));
        assert!(FlightGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_flight_guard_released_on_panic() {
        let flag = AtomicBool::new(false);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = FlightGuard::acquire(&flag).unwrap();
            panic!("cycle blew up");
        }));

        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_all_observed_leads_marked_by_default() {
        let current = vec![lead("A"), lead("B"), lead("C")];
        let marked: Vec<&str> = leads_to_mark_seen(&current, &[])
            .into_iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(marked, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_held_back_leads_are_not_marked() {
        let current = vec![lead("A"), lead("B"), lead("C"), lead("D")];
        let failed = vec![lead("C"), lead("D")];
        let marked: Vec<&str> = leads_to_mark_seen(&current, &failed)
            .into_iter()
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(marked, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_panicking_cycle_does_not_stop_the_timer() {
        let in_flight = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicU64::new(0));

        let cycle = {
            let in_flight = Arc::clone(&in_flight);
            let runs = Arc::clone(&runs);
            move || {
                let in_flight = Arc::clone(&in_flight);
                let runs = Arc::clone(&runs);
                async move {
                    let Some(_guard) = FlightGuard::acquire(&in_flight) else {
                        return;
                    };
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first cycle blew up");
                    }
                }
            }
        };

        run_periodically(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(150)),
            cycle,
        )
        .await;

        assert!(runs.load(Ordering::SeqCst) > 1);
        assert!(!in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_cycle_in_flight_at_shutdown_is_aborted() {
        let runs = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&runs);

        run_periodically(Duration::from_secs(60), async {}, move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::from_lookup(|key| match key {
            "AUTO_ALLOCATE" => Some("false".to_string()),
            "RETRY_FAILED_ALLOCATIONS" => Some("true".to_string()),
            _ => None,
        })
        .unwrap();

        let settings = PollSettings::from(&config);
        assert!(!settings.auto_allocate);
        assert!(settings.retry_failed_allocations);
    }
}
