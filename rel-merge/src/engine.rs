//! Three-way merge engine
//!
//! Given the client's before-image, the store's current value and the
//! client's after-image, the engine classifies the situation and runs the
//! record type's declared policies:
//!
//! - field-level policies first, for conflicting updates, all-or-nothing
//! - type-level policies as the fallback, first resolution wins
//!
//! Configurations are built once per type at first use and shared read-only
//! afterwards.

use crate::accessor::{FieldAccessor, TokenAccessor};
use crate::config::MergeConfig;
use crate::error::{MergeError, Result};
use crate::outcome::{MergeKind, MergeOutcome, MergeResolution};
use crate::policy::{Decision, MergeRequest, Pick};
use crate::token::tokens_match;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

/// A record type with a merge declaration.
pub trait Mergeable: Clone + Send + Sync + 'static {
    fn merge_config() -> Result<MergeConfig<Self>>;
}

/// Something that can three-way merge records of type `E`.
pub trait MergeProvider<E> {
    /// Merge `after` into `current`.
    ///
    /// `current` is updated in place when the merge rewrites it, and the
    /// resolution then carries a copy of the rewritten value.
    fn merge(
        &self,
        kind: MergeKind,
        before: Option<&E>,
        current: Option<&mut E>,
        after: Option<&E>,
    ) -> Result<MergeResolution<E>>;
}

/// How a (before, current, after) triple was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// No before-image: nothing to conflict with
    Create,
    HiddenDelete,
    /// Before and current carry the same token
    NoConflict,
    DirtyDelete,
    ConflictingUpdate,
}

/// Classify a merge for a type with a concurrency token.
pub fn classify<E>(
    token: &TokenAccessor<E>,
    before: Option<&E>,
    current: Option<&E>,
    after: Option<&E>,
) -> Classification {
    let Some(before) = before else {
        return Classification::Create;
    };
    let Some(current) = current else {
        return Classification::HiddenDelete;
    };
    if tokens_match(token.get(before), token.get(current)) {
        return Classification::NoConflict;
    }
    if after.is_none() {
        return Classification::DirtyDelete;
    }
    Classification::ConflictingUpdate
}

/// Merge using an explicit configuration.
///
/// `MergeKind::Auto` classifies first. Any other kind skips classification.
pub fn merge_with<E: Clone>(
    config: &MergeConfig<E>,
    kind: MergeKind,
    before: Option<&E>,
    current: Option<&mut E>,
    after: Option<&E>,
) -> Result<MergeResolution<E>> {
    let Some(token) = config.token() else {
        trace!("{} has no concurrency token, after-image wins", config.type_name());
        return Ok(MergeResolution::new(MergeOutcome::Resolved, after.cloned()));
    };

    let kind = match kind {
        MergeKind::Auto => match classify(token, before, current.as_deref(), after) {
            Classification::Create => {
                return Ok(MergeResolution::new(MergeOutcome::Create, after.cloned()));
            }
            Classification::NoConflict => {
                return Ok(MergeResolution::new(MergeOutcome::Resolved, after.cloned()));
            }
            Classification::HiddenDelete => MergeKind::HiddenDelete,
            Classification::DirtyDelete => MergeKind::DirtyDelete,
            Classification::ConflictingUpdate => MergeKind::ConflictingUpdate,
        },
        explicit => explicit,
    };
    debug!("Merging {} as {}", config.type_name(), kind);
    merge_kind(config, kind, before, current, after)
}

fn merge_kind<E: Clone>(
    config: &MergeConfig<E>,
    kind: MergeKind,
    before: Option<&E>,
    mut current: Option<&mut E>,
    after: Option<&E>,
) -> Result<MergeResolution<E>> {
    if kind == MergeKind::ConflictingUpdate {
        if let (Some(before), Some(current), Some(after)) = (before, current.as_deref_mut(), after) {
            if merge_fields(config, before, current, after)? {
                return Ok(MergeResolution::new(MergeOutcome::Update, Some(current.clone())));
            }
        }
    }
    merge_type(config, kind, before, current, after)
}

/// Two passes: decide every field, then write. Any unresolved field leaves
/// `current` untouched.
///
/// A field without policies keeps the stored value when the client left it
/// alone and takes the client's value when only the client changed it. When
/// both sides changed it, the type's untagged default decides.
fn merge_fields<E>(config: &MergeConfig<E>, before: &E, current: &mut E, after: &E) -> Result<bool> {
    if config.tagged_fields().next().is_none() {
        return Ok(false);
    }

    let mut pending: Vec<(&FieldAccessor<E>, Pick)> = Vec::new();
    for rule in config.fields() {
        let accessor = &rule.accessor;
        let (b, c, a) = (accessor.get(before), accessor.get(current), accessor.get(after));
        let req = MergeRequest::new(MergeKind::ConflictingUpdate, Some(&b), Some(&c), Some(&a));

        let decision = if !rule.policies.is_empty() {
            let mut decision = Decision::ABSTAIN;
            for policy in &rule.policies {
                decision = policy.attempt_field(&req)?;
                if decision.is_resolved() {
                    break;
                }
            }
            decision
        } else if a == b {
            Decision::new(MergeOutcome::Update, Pick::Current)
        } else if c == b {
            Decision::new(MergeOutcome::Update, Pick::After)
        } else {
            config.untagged_default().attempt_field(&req)?
        };
        if !decision.is_resolved() {
            debug!("Field {}.{} is unresolved", config.type_name(), accessor.name());
            return Ok(false);
        }
        pending.push((accessor, decision.pick));
    }

    for (accessor, pick) in pending {
        match pick {
            Pick::After => accessor.copy(after, current),
            Pick::Before => accessor.copy(before, current),
            Pick::Current | Pick::Nothing => {}
        }
    }
    Ok(true)
}

fn merge_type<E: Clone>(
    config: &MergeConfig<E>,
    kind: MergeKind,
    before: Option<&E>,
    current: Option<&mut E>,
    after: Option<&E>,
) -> Result<MergeResolution<E>> {
    let decision = {
        let req = MergeRequest::new(kind, before, current.as_deref(), after);
        let mut found = None;
        for policy in config.type_policies() {
            let decision = policy.attempt_record(&req)?;
            if decision.is_resolved() {
                found = Some(decision);
                break;
            }
        }
        found
    };
    let Some(decision) = decision else {
        debug!("No {} type policy resolves {}", config.type_name(), kind);
        return Ok(MergeResolution::unresolved());
    };

    let source = match decision.pick {
        Pick::Nothing => return Ok(MergeResolution::new(decision.outcome, None)),
        Pick::Current => return Ok(MergeResolution::new(decision.outcome, current.cloned())),
        Pick::Before => before,
        Pick::After => after,
    };
    let value = match (source, current) {
        (Some(source), Some(current)) => {
            // keep the stored instance, take the client's data
            config.clone_non_control(source, current);
            Some(current.clone())
        }
        (source, None) => source.cloned(),
        (None, Some(_)) => None,
    };
    Ok(MergeResolution::new(decision.outcome, value))
}

/// Registry of per-type merge configurations.
#[derive(Default)]
pub struct MergeEngine {
    configs: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a configuration, replacing any built from [`Mergeable`].
    pub fn register<E: Send + Sync + 'static>(&self, config: MergeConfig<E>) {
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        configs.insert(TypeId::of::<E>(), Arc::new(config));
    }

    /// Configuration for `E`, built on first use.
    pub fn config<E: Mergeable>(&self) -> Result<Arc<MergeConfig<E>>> {
        let id = TypeId::of::<E>();
        let cached = self
            .configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        if let Some(entry) = cached {
            return downcast::<E>(entry);
        }

        let built: Arc<dyn Any + Send + Sync> = Arc::new(E::merge_config()?);
        debug!("Built merge configuration for {}", std::any::type_name::<E>());
        let entry = self
            .configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert(built)
            .clone();
        downcast::<E>(entry)
    }

    pub fn merge<E: Mergeable>(
        &self,
        kind: MergeKind,
        before: Option<&E>,
        current: Option<&mut E>,
        after: Option<&E>,
    ) -> Result<MergeResolution<E>> {
        let config = self.config::<E>()?;
        merge_with(&config, kind, before, current, after)
    }
}

fn downcast<E: Send + Sync + 'static>(entry: Arc<dyn Any + Send + Sync>) -> Result<Arc<MergeConfig<E>>> {
    entry
        .downcast::<MergeConfig<E>>()
        .map_err(|_| MergeError::ConfigTypeMismatch(std::any::type_name::<E>()))
}

impl<E: Mergeable> MergeProvider<E> for MergeEngine {
    fn merge(
        &self,
        kind: MergeKind,
        before: Option<&E>,
        current: Option<&mut E>,
        after: Option<&E>,
    ) -> Result<MergeResolution<E>> {
        MergeEngine::merge(self, kind, before, current, after)
    }
}
