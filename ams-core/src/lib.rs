//! AMS Core - Data Model
//!
//! Types shared by the cache and client crates: canonical request keys,
//! timestamped entries, the agent stream protocol, per-endpoint response
//! schemas, the error taxonomy and the HTTP transport seam.

pub mod agent;
pub mod alarms;
pub mod entry;
pub mod error;
pub mod key;
pub mod transport;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use agent::{AgentEvent, AgentEventKind, AgentQuery};
pub use alarms::{
    AlarmQuery, AlarmRecord, AlarmRecordPage, BadActor, BadActors, CategoryCount,
    ConditionBreakdown, FloodWindow, FloodWindows, OverallKpis, PerSourceKpis,
    PriorityBreakdown, RegenerateResponse, SourceCount, SourceKpis,
};
pub use entry::CacheEntry;
pub use error::{AbortReason, AmsError, AmsResult, PersistenceError, TransportError};
pub use key::{CacheKey, CacheKeyBuilder};
pub use transport::{ByteStream, HttpResponse, HttpTransport};
