//! Data model
//!
//! `Job` is the partition: a unit of work that can be checked out, locked and
//! reconciled on its own. `Asset` is the record type that travels in change
//! sets.

use chrono::{DateTime, Utc};
use rel_merge::{
    field_accessor, token_accessor, ConcurrencyToken, MergeConfig, MergePolicy, Mergeable, StepPolicy,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A persisted record with a key and a concurrency token.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    type Key: Copy + Ord + Hash + Default + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Name used in errors and logs
    const NAME: &'static str;

    fn key(&self) -> Self::Key;

    fn set_key(&mut self, key: Self::Key);

    fn row_version(&self) -> Option<&ConcurrencyToken>;

    fn set_row_version(&mut self, token: Option<ConcurrencyToken>);

    /// Field-level validation. An empty list means valid.
    fn validate(&self) -> Vec<ValidationError>;
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {key}: {field} {message}")]
pub struct ValidationError {
    pub entity: &'static str,
    pub key: String,
    pub field: &'static str,
    pub message: String,
}

struct Validator<'a> {
    entity: &'static str,
    key: String,
    errors: &'a mut Vec<ValidationError>,
}

impl Validator<'_> {
    fn fail(&mut self, field: &'static str, message: String) {
        self.errors.push(ValidationError { entity: self.entity, key: self.key.clone(), field, message });
    }

    fn required(&mut self, field: &'static str, value: &str, max: usize) {
        if value.trim().is_empty() {
            self.fail(field, "is required".to_string());
        }
        self.max_len(field, Some(value), max);
    }

    fn max_len(&mut self, field: &'static str, value: Option<&str>, max: usize) {
        if let Some(value) = value {
            if value.chars().count() > max {
                self.fail(field, format!("exceeds {} characters", max));
            }
        }
    }
}

/// A checkout partition; doubles as the partition lock record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub street1: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Identity holding the partition lock
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub locked_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub row_version: Option<ConcurrencyToken>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

impl Entity for Job {
    type Key = i64;
    const NAME: &'static str = "Job";

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn row_version(&self) -> Option<&ConcurrencyToken> {
        self.row_version.as_ref()
    }

    fn set_row_version(&mut self, token: Option<ConcurrencyToken>) {
        self.row_version = token;
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut v = Validator { entity: Self::NAME, key: self.id.to_string(), errors: &mut errors };
        v.required("name", &self.name, 100);
        v.max_len("lockedBy", self.locked_by.as_deref(), 20);
        errors
    }
}

/// A record checked out with its job and edited offline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub job_id: i64,
    pub name: String,
    pub service_area: String,
    #[serde(default)]
    pub maximum_and_minimum_decay: Option<f64>,
    #[serde(default)]
    pub max_min_decay_with_step_and_tol: Option<f64>,
    #[serde(default)]
    pub minimum_decay: f64,
    /// May only grow, by at most 50
    #[serde(default)]
    pub monotonic_tolerance: Option<f64>,
    /// May move by at most 10% either way
    #[serde(default)]
    pub percent_tolerance: Option<f64>,
    /// May move by at most 50 either way
    #[serde(default)]
    pub static_tolerance: Option<f64>,
    #[serde(default)]
    pub row_version: Option<ConcurrencyToken>,
}

impl Entity for Asset {
    type Key = i64;
    const NAME: &'static str = "Asset";

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn row_version(&self) -> Option<&ConcurrencyToken> {
        self.row_version.as_ref()
    }

    fn set_row_version(&mut self, token: Option<ConcurrencyToken>) {
        self.row_version = token;
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut v = Validator { entity: Self::NAME, key: self.id.to_string(), errors: &mut errors };
        v.required("name", &self.name, 100);
        v.required("serviceArea", &self.service_area, 100);
        errors
    }
}

impl Mergeable for Asset {
    fn merge_config() -> rel_merge::Result<MergeConfig<Self>> {
        MergeConfig::builder("Asset")
            .key(field_accessor!(Asset, id))
            .key(field_accessor!(Asset, job_id))
            .token(token_accessor!(Asset, row_version))
            .field(field_accessor!(Asset, name))
            .field(field_accessor!(Asset, service_area))
            .field(field_accessor!(Asset, maximum_and_minimum_decay))
            .field(field_accessor!(Asset, max_min_decay_with_step_and_tol))
            .field(field_accessor!(Asset, minimum_decay))
            .field_with(
                field_accessor!(Asset, monotonic_tolerance),
                [MergePolicy::Step(StepPolicy::new(0.0, 50.0)?.inclusive(false, true))],
            )
            .field_with(
                field_accessor!(Asset, percent_tolerance),
                [MergePolicy::Step(StepPolicy::symmetric(0.1)?.percent().inclusive(true, true))],
            )
            .field_with(
                field_accessor!(Asset, static_tolerance),
                [MergePolicy::Step(StepPolicy::symmetric(50.0)?.inclusive(true, true))],
            )
            .policy(MergePolicy::LastWriteWins(false))
            .build()
    }
}
