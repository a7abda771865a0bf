//! Per-type merge declarations
//!
//! A [`MergeConfig`] lists a record type's control fields (keys and the
//! concurrency token), every other field with its policies, and the type-level
//! fallback policies in the order they are tried.

use crate::accessor::{FieldAccessor, TokenAccessor};
use crate::error::{MergeError, Result};
use crate::policy::MergePolicy;
use crate::token::ConcurrencyToken;

/// A non-control field and the policies attached to it.
#[derive(Debug)]
pub struct FieldRule<E> {
    pub accessor: FieldAccessor<E>,
    pub policies: Vec<MergePolicy>,
}

impl<E> Clone for FieldRule<E> {
    fn clone(&self) -> Self {
        Self { accessor: self.accessor, policies: self.policies.clone() }
    }
}

/// Validated merge declaration for `E`.
#[derive(Debug)]
pub struct MergeConfig<E> {
    type_name: &'static str,
    keys: Vec<FieldAccessor<E>>,
    token: Option<TokenAccessor<E>>,
    fields: Vec<FieldRule<E>>,
    type_policies: Vec<MergePolicy>,
    untagged_default: MergePolicy,
}

impl<E> MergeConfig<E> {
    pub fn builder(type_name: &'static str) -> MergeConfigBuilder<E> {
        MergeConfigBuilder {
            type_name,
            keys: Vec::new(),
            tokens: Vec::new(),
            fields: Vec::new(),
            type_policies: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn keys(&self) -> &[FieldAccessor<E>] {
        &self.keys
    }

    pub fn token(&self) -> Option<&TokenAccessor<E>> {
        self.token.as_ref()
    }

    /// Token of `entity`, or `None` when the type has no token field.
    pub fn token_of<'a>(&self, entity: &'a E) -> Option<&'a ConcurrencyToken> {
        self.token.as_ref().and_then(|t| t.get(entity))
    }

    pub fn fields(&self) -> &[FieldRule<E>] {
        &self.fields
    }

    /// Fields carrying at least one policy
    pub fn tagged_fields(&self) -> impl Iterator<Item = &FieldRule<E>> {
        self.fields.iter().filter(|f| !f.policies.is_empty())
    }

    pub fn type_policies(&self) -> &[MergePolicy] {
        &self.type_policies
    }

    /// Policy for a field without its own, when both sides changed it.
    ///
    /// `LastWriteWins(false)` when the type declares fallback policies,
    /// otherwise last write wins iff some field carries a policy.
    pub fn untagged_default(&self) -> &MergePolicy {
        &self.untagged_default
    }

    /// Copy every non-control field from `from` onto `to`.
    pub fn clone_non_control(&self, from: &E, to: &mut E) {
        for field in &self.fields {
            field.accessor.copy(from, to);
        }
    }
}

/// Collects declarations, then checks them in [`build`](Self::build).
pub struct MergeConfigBuilder<E> {
    type_name: &'static str,
    keys: Vec<FieldAccessor<E>>,
    tokens: Vec<TokenAccessor<E>>,
    fields: Vec<FieldRule<E>>,
    type_policies: Vec<MergePolicy>,
}

impl<E> MergeConfigBuilder<E> {
    /// Declare a key (control) field
    pub fn key(mut self, accessor: FieldAccessor<E>) -> Self {
        self.keys.push(accessor);
        self
    }

    /// Declare the concurrency token
    pub fn token(mut self, accessor: TokenAccessor<E>) -> Self {
        self.tokens.push(accessor);
        self
    }

    /// Declare a non-control field without policies
    pub fn field(self, accessor: FieldAccessor<E>) -> Self {
        self.field_with(accessor, Vec::<MergePolicy>::new())
    }

    /// Declare a non-control field; its policies are tried in order
    pub fn field_with(mut self, accessor: FieldAccessor<E>, policies: impl IntoIterator<Item = MergePolicy>) -> Self {
        self.fields.push(FieldRule { accessor, policies: policies.into_iter().collect() });
        self
    }

    /// Append a type-level fallback policy
    pub fn policy(mut self, policy: MergePolicy) -> Self {
        self.type_policies.push(policy);
        self
    }

    pub fn build(mut self) -> Result<MergeConfig<E>> {
        if self.tokens.len() > 1 {
            return Err(MergeError::MultipleConcurrencyTokens {
                type_name: self.type_name,
                count: self.tokens.len(),
            });
        }
        for field in &self.fields {
            if let Some(policy) = field.policies.iter().find(|p| !p.applies_to_field()) {
                return Err(MergeError::MisplacedPolicy {
                    policy: policy.name(),
                    target: format!("field {}.{}", self.type_name, field.accessor.name()),
                });
            }
        }
        if let Some(policy) = self.type_policies.iter().find(|p| !p.applies_to_type()) {
            return Err(MergeError::MisplacedPolicy {
                policy: policy.name(),
                target: format!("type {}", self.type_name),
            });
        }
        let untagged_default = if self.type_policies.is_empty() {
            MergePolicy::LastWriteWins(self.fields.iter().any(|f| !f.policies.is_empty()))
        } else {
            MergePolicy::LastWriteWins(false)
        };
        Ok(MergeConfig {
            type_name: self.type_name,
            keys: self.keys,
            token: self.tokens.pop(),
            fields: self.fields,
            type_policies: self.type_policies,
            untagged_default,
        })
    }
}
