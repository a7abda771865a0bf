//! Merge policies
//!
//! A policy looks at one merge request (kind plus before, current and after
//! images) and either resolves it or abstains. Policies attach to a single
//! field or to a whole record type:
//!
//! - `LastWriteWins`: field or type
//! - `Step`: numeric field, conflicting updates only
//! - `Decay`: temporal field, conflicting updates only
//! - `HiddenDelete` / `DirtyDelete`: type only

use crate::error::{MergeError, Result};
use crate::outcome::{MergeKind, MergeOutcome};
use crate::value::{AssumedZone, FieldValue};
use chrono::{DateTime, Duration, Utc};

/// The three images handed to a policy.
#[derive(Debug)]
pub struct MergeRequest<'a, T> {
    pub kind: MergeKind,
    pub before: Option<&'a T>,
    pub current: Option<&'a T>,
    pub after: Option<&'a T>,
}

impl<'a, T> MergeRequest<'a, T> {
    pub fn new(
        kind: MergeKind,
        before: Option<&'a T>,
        current: Option<&'a T>,
        after: Option<&'a T>,
    ) -> Self {
        Self { kind, before, current, after }
    }
}

impl<T> Clone for MergeRequest<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MergeRequest<'_, T> {}

/// Which image a decision resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Nothing,
    Before,
    Current,
    After,
}

/// A policy's answer to a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub outcome: MergeOutcome,
    pub pick: Pick,
}

impl Decision {
    pub const ABSTAIN: Decision = Decision { outcome: MergeOutcome::Unresolved, pick: Pick::Nothing };

    pub const fn new(outcome: MergeOutcome, pick: Pick) -> Self {
        Self { outcome, pick }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_resolved()
    }

    /// The image this decision points at, if any.
    pub fn select<'a, T>(&self, req: &MergeRequest<'a, T>) -> Option<&'a T> {
        match self.pick {
            Pick::Nothing => None,
            Pick::Before => req.before,
            Pick::Current => req.current,
            Pick::After => req.after,
        }
    }
}

/// Declarative merge behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum MergePolicy {
    /// `false` never resolves anything
    LastWriteWins(bool),
    Step(StepPolicy),
    Decay(DecayPolicy),
    HiddenDelete,
    DirtyDelete,
}

impl MergePolicy {
    pub fn last_write_wins() -> Self {
        MergePolicy::LastWriteWins(true)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergePolicy::LastWriteWins(_) => "last-write-wins",
            MergePolicy::Step(_) => "step",
            MergePolicy::Decay(_) => "decay",
            MergePolicy::HiddenDelete => "hidden-delete",
            MergePolicy::DirtyDelete => "dirty-delete",
        }
    }

    pub fn applies_to_field(&self) -> bool {
        !matches!(self, MergePolicy::HiddenDelete | MergePolicy::DirtyDelete)
    }

    pub fn applies_to_type(&self) -> bool {
        !matches!(self, MergePolicy::Step(_) | MergePolicy::Decay(_))
    }

    /// Evaluate against a single field's values.
    pub fn attempt_field(&self, req: &MergeRequest<'_, FieldValue>) -> Result<Decision> {
        match self {
            MergePolicy::LastWriteWins(wins) => last_write_wins(*wins, req),
            MergePolicy::Step(step) => step.attempt(req),
            MergePolicy::Decay(decay) => decay.attempt(req),
            MergePolicy::HiddenDelete | MergePolicy::DirtyDelete => Err(MergeError::MisplacedPolicy {
                policy: self.name(),
                target: "a field".to_string(),
            }),
        }
    }

    /// Evaluate against whole records.
    pub fn attempt_record<E>(&self, req: &MergeRequest<'_, E>) -> Result<Decision> {
        match self {
            MergePolicy::LastWriteWins(wins) => last_write_wins(*wins, req),
            MergePolicy::HiddenDelete => Ok(hidden_delete(req)),
            MergePolicy::DirtyDelete => Ok(dirty_delete(req)),
            MergePolicy::Step(_) | MergePolicy::Decay(_) => Err(MergeError::MisplacedPolicy {
                policy: self.name(),
                target: "a record type".to_string(),
            }),
        }
    }
}

fn last_write_wins<T>(wins: bool, req: &MergeRequest<'_, T>) -> Result<Decision> {
    if !wins {
        return Ok(Decision::ABSTAIN);
    }
    match req.kind {
        MergeKind::Auto => Err(MergeError::UnsupportedKind { policy: "last-write-wins", kind: req.kind }),
        MergeKind::ConflictingUpdate => Ok(Decision::new(MergeOutcome::Update, Pick::After)),
        MergeKind::HiddenDelete if req.after.is_some() => Ok(Decision::new(MergeOutcome::Create, Pick::After)),
        MergeKind::HiddenDelete => Ok(Decision::new(MergeOutcome::Resolved, Pick::Nothing)),
        MergeKind::DirtyDelete => Ok(Decision::new(MergeOutcome::Delete, Pick::Current)),
    }
}

fn hidden_delete<T>(req: &MergeRequest<'_, T>) -> Decision {
    match (req.kind, req.after) {
        (MergeKind::HiddenDelete, None) => Decision::new(MergeOutcome::Resolved, Pick::Nothing),
        (MergeKind::HiddenDelete, Some(_)) => Decision::new(MergeOutcome::Create, Pick::After),
        _ => Decision::ABSTAIN,
    }
}

fn dirty_delete<T>(req: &MergeRequest<'_, T>) -> Decision {
    match (req.kind, req.current) {
        (MergeKind::DirtyDelete, None) => Decision::new(MergeOutcome::Resolved, Pick::Nothing),
        (MergeKind::DirtyDelete, Some(_)) => Decision::new(MergeOutcome::Delete, Pick::Current),
        _ => Decision::ABSTAIN,
    }
}

fn check_conflicting_update(policy: &'static str, kind: MergeKind) -> Result<()> {
    if kind == MergeKind::ConflictingUpdate {
        Ok(())
    } else {
        Err(MergeError::UnsupportedKind { policy, kind })
    }
}

fn within<T: PartialOrd>(value: T, lo: T, hi: T, inclusive_lo: bool, inclusive_hi: bool) -> bool {
    let above = if inclusive_lo { value >= lo } else { value > lo };
    let below = if inclusive_hi { value <= hi } else { value < hi };
    above && below
}

/// Accept the client's value when it moved by a bounded amount.
///
/// The delta is `after - current`, or `(after - current) / current` in
/// percent mode. Null or non-numeric values abstain.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolicy {
    lo: f64,
    hi: f64,
    percent: bool,
    inclusive_lo: bool,
    inclusive_hi: bool,
    divide_by_zero_ok: bool,
}

impl StepPolicy {
    /// Bounds are exclusive at both ends until changed with [`inclusive`](Self::inclusive).
    pub fn new(lo: f64, hi: f64) -> Result<Self> {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return Err(MergeError::InvalidBounds { lo: lo.to_string(), hi: hi.to_string() });
        }
        Ok(Self {
            lo,
            hi,
            percent: false,
            inclusive_lo: false,
            inclusive_hi: false,
            divide_by_zero_ok: false,
        })
    }

    /// `-|step| .. |step|`
    pub fn symmetric(step: f64) -> Result<Self> {
        Self::new(-step.abs(), step.abs())
    }

    /// Measure the delta relative to the current value.
    pub fn percent(mut self) -> Self {
        self.percent = true;
        self
    }

    pub fn inclusive(mut self, lo: bool, hi: bool) -> Self {
        self.inclusive_lo = lo;
        self.inclusive_hi = hi;
        self
    }

    /// Outcome of percent mode when the current value is zero.
    pub fn divide_by_zero_ok(mut self, ok: bool) -> Self {
        self.divide_by_zero_ok = ok;
        self
    }

    pub fn accepts(&self, delta: f64) -> bool {
        within(delta, self.lo, self.hi, self.inclusive_lo, self.inclusive_hi)
    }

    pub fn attempt(&self, req: &MergeRequest<'_, FieldValue>) -> Result<Decision> {
        check_conflicting_update("step", req.kind)?;
        let current = req.current.and_then(FieldValue::numeric);
        let after = req.after.and_then(FieldValue::numeric);
        let (Some(current), Some(after)) = (current, after) else {
            return Ok(Decision::ABSTAIN);
        };
        let update = Decision::new(MergeOutcome::Update, Pick::After);
        let delta = if self.percent {
            if current == 0.0 {
                return Ok(if self.divide_by_zero_ok { update } else { Decision::ABSTAIN });
            }
            (after - current) / current
        } else {
            after - current
        };
        Ok(if self.accepts(delta) { update } else { Decision::ABSTAIN })
    }
}

/// Accept the client's value while the stored timestamp is within an age window.
///
/// Age is measured from the current value's timestamp to now.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayPolicy {
    lo: Duration,
    hi: Duration,
    inclusive_lo: bool,
    inclusive_hi: bool,
    assumed: AssumedZone,
}

impl DecayPolicy {
    /// Bounds are exclusive at both ends until changed with [`inclusive`](Self::inclusive).
    pub fn new(lo: Duration, hi: Duration) -> Result<Self> {
        if lo > hi {
            return Err(MergeError::InvalidBounds { lo: lo.to_string(), hi: hi.to_string() });
        }
        Ok(Self {
            lo,
            hi,
            inclusive_lo: false,
            inclusive_hi: false,
            assumed: AssumedZone::default(),
        })
    }

    pub fn inclusive(mut self, lo: bool, hi: bool) -> Self {
        self.inclusive_lo = lo;
        self.inclusive_hi = hi;
        self
    }

    /// Zone for timestamps stored without one.
    pub fn assume(mut self, zone: AssumedZone) -> Self {
        self.assumed = zone;
        self
    }

    pub fn accepts(&self, elapsed: Duration) -> bool {
        within(elapsed, self.lo, self.hi, self.inclusive_lo, self.inclusive_hi)
    }

    pub fn attempt(&self, req: &MergeRequest<'_, FieldValue>) -> Result<Decision> {
        self.attempt_at(Utc::now(), req)
    }

    pub fn attempt_at(&self, now: DateTime<Utc>, req: &MergeRequest<'_, FieldValue>) -> Result<Decision> {
        check_conflicting_update("decay", req.kind)?;
        let Some(touched) = req.current.and_then(|v| v.instant(self.assumed)) else {
            return Ok(Decision::ABSTAIN);
        };
        Ok(if self.accepts(now - touched) {
            Decision::new(MergeOutcome::Update, Pick::After)
        } else {
            Decision::ABSTAIN
        })
    }
}
