//! Domain model types (pure).
//!
//! All types in this module are pure data with smart constructors.

/// Project, session, search and usage listings.
pub mod catalog;
/// Persisted transcript messages.
pub mod display;
/// Error taxonomy.
pub mod error;
/// Validated ids.
pub mod identifiers;
/// Live message model.
pub mod message;
/// Source CLI enumeration.
pub mod source;
/// Token usage.
pub mod usage;

// Re-export for convenience
pub use catalog::{DailyTokens, ProjectEntry, SearchHit, SessionEntry, UsageSummary};
pub use display::{DisplayBlock, DisplayMessage, DisplayRole, PaginatedMessages, PersistedBlock};
pub use error::{AppError, LoadError, SessionError, TransportError};
pub use identifiers::{InvalidRouteId, InvalidSessionId, MessageId, RouteId, SessionId};
pub use message::{ContentBlock, Message, Role, ToolCall};
pub use source::{SourceCli, UnknownSource};
pub use usage::TokenUsage;
