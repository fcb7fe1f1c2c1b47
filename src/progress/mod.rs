//! Run-progress tracking for backup and restore pipelines.
//!
//! One [`ProgressTracker`] lives for exactly one run. The export task mutates
//! it through `&self` methods while the progress-publishing task reads
//! snapshots; counters are atomics and the phase/domain state sits behind a
//! short-lived lock, so readers never block writers.

pub mod events;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::domain::BackupDomain;
use crate::progress::events::{BackupEvent, EventChannel};

/// ETA is undefined until this much wall-clock time has passed.
const MIN_ETA_ELAPSED_MS: u64 = 1000;

/// Export-side run phases. The pre-count scan happens while the phase is
/// still `Init`; `Scanning` is part of the wire contract but the export
/// pipeline moves straight to `Exporting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupPhase {
    Init,
    Scanning,
    Exporting,
    Finalizing,
    Compressing,
    Complete,
}

/// Restore-side run phases; the restore pipeline shares the tracker
/// mechanics but lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorePhase {
    Init,
    Validating,
    Decompressing,
    Importing,
    Linking,
    Complete,
}

/// Current phase of whichever pipeline owns the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Phase {
    Backup(BackupPhase),
    Restore(RestorePhase),
}

impl From<BackupPhase> for Phase {
    fn from(phase: BackupPhase) -> Self {
        Phase::Backup(phase)
    }
}

impl From<RestorePhase> for Phase {
    fn from(phase: RestorePhase) -> Self {
        Phase::Restore(phase)
    }
}

/// Point-in-time snapshot of an export run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<BackupDomain>,
    pub overall_progress: u8,
    pub domain_progress: u8,
    pub items_processed: u64,
    pub total_items: u64,
    pub bytes_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

/// Restore twin of [`BackupProgress`]; same counters, same mechanics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreProgress {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<BackupDomain>,
    pub overall_progress: u8,
    pub domain_progress: u8,
    pub items_processed: u64,
    pub total_items: u64,
    pub bytes_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DomainCounter {
    total: u64,
    processed: u64,
}

/// Mutable source of truth for "how far along is this run".
///
/// Every operation is infallible arithmetic on in-memory counters and safe
/// to call from any thread.
pub struct ProgressTracker {
    started_at: Instant,
    phase: RwLock<Phase>,
    current_domain: RwLock<Option<BackupDomain>>,
    domains: RwLock<HashMap<BackupDomain, DomainCounter>>,
    items_processed: AtomicU64,
    total_items: AtomicU64,
    bytes_processed: AtomicU64,
    total_bytes: AtomicU64,
    error_count: AtomicU64,
    events: Option<EventChannel>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Tracker that mirrors its phase/domain/error transitions onto an event
    /// channel.
    pub fn with_channel(events: EventChannel) -> Self {
        Self::build(Some(events))
    }

    fn build(events: Option<EventChannel>) -> Self {
        Self {
            started_at: Instant::now(),
            phase: RwLock::new(Phase::Backup(BackupPhase::Init)),
            current_domain: RwLock::new(None),
            domains: RwLock::new(HashMap::new()),
            items_processed: AtomicU64::new(0),
            total_items: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            events,
        }
    }

    /// Overwrite the current phase. Transitions are caller-driven and not
    /// validated.
    pub fn set_phase(&self, phase: impl Into<Phase>) {
        let phase = phase.into();
        *write_lock(&self.phase) = phase;
        self.emit(BackupEvent::PhaseChange { phase });
    }

    /// Set the active domain and initialize its counter record.
    pub fn set_domain(&self, domain: BackupDomain, total_items: u64) {
        write_lock(&self.domains).insert(
            domain,
            DomainCounter {
                total: total_items,
                processed: 0,
            },
        );
        *write_lock(&self.current_domain) = Some(domain);
        self.emit(BackupEvent::DomainChange {
            domain,
            total_items,
        });
    }

    /// Add to the global processed counter and, when a domain is active, to
    /// that domain's counter.
    pub fn increment_items_processed(&self, count: u64) {
        self.items_processed.fetch_add(count, Ordering::Relaxed);
        let current = *read_lock(&self.current_domain);
        if let Some(domain) = current {
            if let Some(counter) = write_lock(&self.domains).get_mut(&domain) {
                counter.processed += count;
            }
        }
    }

    pub fn update_bytes_processed(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Run-wide denominators for overall progress and the ETA projection.
    pub fn set_totals(&self, total_items: u64, total_bytes: u64) {
        self.total_items.store(total_items, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    /// Count an error and notify subscribers; never aborts anything.
    pub fn report_error(&self, error: &str) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.emit(BackupEvent::Error {
            message: error.to_string(),
        });
    }

    pub fn phase(&self) -> Phase {
        *read_lock(&self.phase)
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whole-run completion percentage over item counts; 0 when no total is
    /// known.
    pub fn overall_progress(&self) -> u8 {
        percent(
            self.items_processed.load(Ordering::Relaxed),
            self.total_items.load(Ordering::Relaxed),
        )
    }

    /// Completion percentage for one domain; 0 for unknown domains.
    pub fn domain_progress(&self, domain: BackupDomain) -> u8 {
        match read_lock(&self.domains).get(&domain) {
            Some(counter) => percent(counter.processed, counter.total),
            None => 0,
        }
    }

    /// Linear-rate projection of the remaining time in milliseconds.
    ///
    /// `None` while the rate is undefined: under one second elapsed, no
    /// bytes processed yet, or no byte total known. No smoothing is applied,
    /// so a suddenly slow domain makes the value spike.
    pub fn estimated_time_remaining(&self) -> Option<u64> {
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        if elapsed_ms < MIN_ETA_ELAPSED_MS {
            return None;
        }
        let processed = self.bytes_processed.load(Ordering::Relaxed);
        if processed == 0 {
            return None;
        }
        let total = self.total_bytes.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        let remaining = total.saturating_sub(processed);
        Some((remaining as u128 * elapsed_ms as u128 / processed as u128) as u64)
    }

    /// Assemble an export-side snapshot from the current counters.
    pub fn backup_progress(&self) -> BackupProgress {
        let domain = *read_lock(&self.current_domain);
        BackupProgress {
            phase: self.phase(),
            domain,
            overall_progress: self.overall_progress(),
            domain_progress: domain.map(|d| self.domain_progress(d)).unwrap_or(0),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            total_items: self.total_items.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            estimated_time_remaining: self.estimated_time_remaining(),
        }
    }

    /// Restore-side snapshot; identical mechanics over the same counters.
    pub fn restore_progress(&self) -> RestoreProgress {
        let domain = *read_lock(&self.current_domain);
        RestoreProgress {
            phase: self.phase(),
            domain,
            overall_progress: self.overall_progress(),
            domain_progress: domain.map(|d| self.domain_progress(d)).unwrap_or(0),
            items_processed: self.items_processed.load(Ordering::Relaxed),
            total_items: self.total_items.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            estimated_time_remaining: self.estimated_time_remaining(),
        }
    }

    fn emit(&self, event: BackupEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (processed as u128 * 100 / total as u128).min(100) as u8
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_domain_progress_is_monotonic_and_exact() {
        let tracker = ProgressTracker::new();
        tracker.set_domain(BackupDomain::Topics, 7);

        let mut last = 0;
        for k in 1..=7u64 {
            tracker.increment_items_processed(1);
            let progress = tracker.domain_progress(BackupDomain::Topics);
            let expected = ((k * 100 / 7).min(100)) as u8;
            assert_eq!(progress, expected);
            assert!(progress >= last);
            last = progress;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_overall_progress_survives_zero_total() {
        let tracker = ProgressTracker::new();
        tracker.set_totals(0, 4096);
        tracker.update_bytes_processed(1024);
        assert_eq!(tracker.overall_progress(), 0);
    }

    #[test]
    fn test_overall_progress_caps_at_100() {
        let tracker = ProgressTracker::new();
        tracker.set_totals(4, 0);
        tracker.increment_items_processed(9);
        assert_eq!(tracker.overall_progress(), 100);
    }

    #[test]
    fn test_unknown_domain_progress_is_zero() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.domain_progress(BackupDomain::Tags), 0);
    }

    #[test]
    fn test_eta_unknown_in_first_second() {
        let tracker = ProgressTracker::new();
        tracker.set_totals(100, 10_000);
        tracker.increment_items_processed(10);
        tracker.update_bytes_processed(500);
        assert_eq!(tracker.estimated_time_remaining(), None);
    }

    #[test]
    fn test_eta_after_warmup() {
        let with_totals = ProgressTracker::new();
        with_totals.set_totals(100, 10_000);
        let without_byte_total = ProgressTracker::new();
        without_byte_total.set_totals(100, 0);

        thread::sleep(Duration::from_millis(1050));

        // Still no bytes processed: rate undefined.
        assert_eq!(with_totals.estimated_time_remaining(), None);

        with_totals.update_bytes_processed(2_000);
        let eta = with_totals.estimated_time_remaining().unwrap();
        // 8000 bytes left at ~2000 bytes per 1050ms.
        assert!(eta > 0);

        without_byte_total.update_bytes_processed(2_000);
        assert_eq!(without_byte_total.estimated_time_remaining(), None);
    }

    #[test]
    fn test_increments_only_touch_the_active_domain() {
        let tracker = ProgressTracker::new();
        tracker.set_domain(BackupDomain::Topics, 10);
        tracker.increment_items_processed(5);
        tracker.set_domain(BackupDomain::Groups, 10);
        tracker.increment_items_processed(2);

        assert_eq!(tracker.domain_progress(BackupDomain::Topics), 50);
        assert_eq!(tracker.domain_progress(BackupDomain::Groups), 20);
        assert_eq!(tracker.items_processed(), 7);
    }

    #[test]
    fn test_phase_and_error_events_are_emitted() {
        let events = EventChannel::new();
        let mut rx = events.subscribe();
        let tracker = ProgressTracker::with_channel(events);

        tracker.set_phase(BackupPhase::Exporting);
        tracker.set_domain(BackupDomain::Tags, 3);
        tracker.report_error("metadata unreadable");

        match rx.try_recv().unwrap() {
            BackupEvent::PhaseChange { phase } => {
                assert_eq!(phase, Phase::Backup(BackupPhase::Exporting));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            BackupEvent::DomainChange {
                domain,
                total_items,
            } => {
                assert_eq!(domain, BackupDomain::Tags);
                assert_eq!(total_items, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            BackupEvent::Error { message } => {
                assert_eq!(message, "metadata unreadable");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(tracker.error_count(), 1);
    }

    #[test]
    fn test_backup_snapshot_reflects_counters() {
        let tracker = ProgressTracker::new();
        tracker.set_phase(BackupPhase::Exporting);
        tracker.set_totals(10, 0);
        tracker.set_domain(BackupDomain::Groups, 5);
        tracker.increment_items_processed(5);
        tracker.update_bytes_processed(2048);

        let snapshot = tracker.backup_progress();
        assert_eq!(snapshot.phase, Phase::Backup(BackupPhase::Exporting));
        assert_eq!(snapshot.domain, Some(BackupDomain::Groups));
        assert_eq!(snapshot.overall_progress, 50);
        assert_eq!(snapshot.domain_progress, 100);
        assert_eq!(snapshot.items_processed, 5);
        assert_eq!(snapshot.bytes_processed, 2048);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"overallProgress\":50"));
        assert!(json.contains("\"phase\":\"exporting\""));
        // Undefined ETA is omitted, not null.
        assert!(!json.contains("estimatedTimeRemaining"));
    }

    #[test]
    fn test_restore_snapshot_uses_restore_phases() {
        let tracker = ProgressTracker::new();
        tracker.set_phase(RestorePhase::Validating);
        let snapshot = tracker.restore_progress();
        assert_eq!(snapshot.phase, Phase::Restore(RestorePhase::Validating));
    }
}
