//! Intent extraction and action dispatch for Lookout.
//!
//! This crate provides:
//!
//! - **Lookout extraction**: catalog to tool-agnostic lookouts via
//!   [`lookouts::LookoutExtractor`], cached per catalog by
//!   [`cache::LookoutCache`].
//! - **Intent extraction**: document plus lookouts to enforced
//!   [`IntentMatch`]es via [`extractor::DocumentIntentExtractor`].
//! - **Dispatch**: called matches to action invocations via
//!   [`dispatcher::Dispatcher`].
//! - **Reporting**: compact run summaries via [`report::RunReport`].
//! - **Pipeline**: all of the above per document, with timeouts, fallback
//!   reports and a [`pipeline::StatusSink`].

pub mod cache;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod lookouts;
pub mod pipeline;
pub mod report;
pub mod types;

mod prompts;

pub use cache::{CacheStats, LookoutCache};
pub use dispatcher::{
    ActionInvocationError, DispatchConfig, DispatchOutcome, Dispatcher, build_payload,
    select_action,
};
pub use document::{Document, DocumentPart};
pub use error::{IntentError, Result, Stage};
pub use extractor::{DocumentIntentExtractor, ExtractorConfig, ValidationError};
pub use lookouts::LookoutExtractor;
pub use pipeline::{Pipeline, PipelineConfig, RunRecord, StatusSink};
pub use report::{Counts, EntryStatus, ReportEntry, RunReport, RunStatus, summarize};
pub use types::{IntentKind, IntentMatch, Lookout, MatchStatus, PayloadPreview};
