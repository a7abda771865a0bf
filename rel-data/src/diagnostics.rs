//! Change-set performance instrumentation
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op.

use std::fmt;
use std::time::Instant;
use tracing::trace;

/// Timed stages of change-set processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Replay,
    Save,
    SaveAfterRedress,
    Redress,
    BuildCache,
    Resolve,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Replay => "replay",
            Phase::Save => "save",
            Phase::SaveAfterRedress => "save_after_redress",
            Phase::Redress => "redress",
            Phase::BuildCache => "build_cache",
            Phase::Resolve => "resolve",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Aborted,
    Returned,
    Accepted,
}

/// Records the duration of one phase when dropped.
#[must_use = "the phase is timed until the timer is dropped"]
pub struct PhaseTimer {
    phase: Phase,
    resolver: &'static str,
    started: Instant,
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        trace!("Phase {} took {:.6}s", self.phase, elapsed);
        metrics::histogram!(
            "rel_changeset_phase_seconds",
            "phase" => self.phase.as_str(),
            "resolver" => self.resolver
        )
        .record(elapsed);
    }
}

/// Per-batch scope. Dropping it records the batch totals and outcome;
/// a batch never marked complete or returned counts as aborted.
pub struct ChangeSetScope {
    resolver: &'static str,
    items: u64,
    rejections: u32,
    fate: Fate,
    started: Instant,
}

impl ChangeSetScope {
    pub fn new(resolver: &'static str, items: usize) -> Self {
        Self {
            resolver,
            items: items as u64,
            rejections: 0,
            fate: Fate::Aborted,
            started: Instant::now(),
        }
    }

    /// The batch was committed.
    pub fn complete(&mut self) {
        self.fate = Fate::Accepted;
    }

    /// The batch produced a reconciliation change set.
    pub fn returned(&mut self) {
        self.fate = Fate::Returned;
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    pub fn time(&self, phase: Phase) -> PhaseTimer {
        PhaseTimer { phase, resolver: self.resolver, started: Instant::now() }
    }

    /// Time a save, told apart by whether a conflict came first.
    pub fn time_save(&self) -> PhaseTimer {
        if self.rejections == 0 {
            self.time(Phase::Save)
        } else {
            self.time(Phase::SaveAfterRedress)
        }
    }

    /// Count a rejected save and time the redress that follows it.
    pub fn time_redress(&mut self) -> PhaseTimer {
        self.rejections += 1;
        self.time(Phase::Redress)
    }

    fn count(&self, outcome: &'static str) {
        metrics::counter!(format!("rel_changeset_{}", outcome), "resolver" => self.resolver).increment(1);
        metrics::counter!(format!("rel_changeset_{}_items", outcome), "resolver" => self.resolver)
            .increment(self.items);
    }
}

impl Drop for ChangeSetScope {
    fn drop(&mut self) {
        let resolver = self.resolver;
        metrics::counter!("rel_changeset_total", "resolver" => resolver).increment(1);
        metrics::counter!("rel_changeset_items_total", "resolver" => resolver).increment(self.items);
        match self.fate {
            Fate::Accepted => {
                self.count("accepted");
                if self.rejections > 0 {
                    self.count("redressed");
                }
            }
            Fate::Returned => self.count("returned"),
            Fate::Aborted => self.count("aborted"),
        }
        metrics::histogram!("rel_changeset_process_seconds", "resolver" => resolver)
            .record(self.started.elapsed().as_secs_f64());
    }
}
