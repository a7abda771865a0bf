//! Rel merge engine
//!
//! Declarative three-way merging for records edited offline:
//! - Concurrency tokens and their comparison
//! - Compile-time field accessors
//! - Merge policies (last-write-wins, bounded step, time decay, hidden/dirty delete)
//! - Per-type merge configuration and the merge engine

pub mod accessor;
pub mod config;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod token;
pub mod value;

pub use accessor::{FieldAccessor, TokenAccessor};
pub use config::{FieldRule, MergeConfig, MergeConfigBuilder};
pub use engine::{classify, merge_with, Classification, MergeEngine, MergeProvider, Mergeable};
pub use error::{MergeError, Result};
pub use outcome::{MergeKind, MergeOutcome, MergeResolution};
pub use policy::{DecayPolicy, Decision, MergePolicy, MergeRequest, Pick, StepPolicy};
pub use token::{tokens_match, ConcurrencyToken};
pub use value::{AssumedZone, FieldValue};
