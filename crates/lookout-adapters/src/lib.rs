//! Action providers, the action catalog and document sources for Lookout.
//!
//! Every provider implements [`ActionProvider`]; the [`ActionCatalog`]
//! aggregates connected providers into one read-only registry of actions.
//! Documents come in through a [`DocumentSource`].

pub mod calendar;
pub mod catalog;
pub mod error;
pub mod issues;
pub mod source;
pub mod traits;

pub use calendar::CalendarProvider;
pub use catalog::ActionCatalog;
pub use error::{AdapterError, Result};
pub use issues::IssueTrackerProvider;
pub use source::{DocumentSource, FetchedContent, FileSource, HttpSource, guess_media_type};
pub use traits::{ActionDescriptor, ActionProvider, AuthRequirement, HealthStatus, ProviderKind};
