//! SessionStore - append-only session artifact store
//!
//! Persists one immutable JSON artifact per captured browser session and
//! layers an append-only disposition log, a derived view, and effort
//! batching on top of it.
//!
//! # Architecture
//!
//! ```text
//! sessions/
//! ├── 2026-08-01T09-30-15Z.json    # one artifact per capture
//! ├── 2026-08-01T14-02-40Z.json
//! └── ...
//! ```
//!
//! Each artifact holds the classification output plus the `dispositions`
//! array, which is only ever appended to. The current per-item state is a
//! pure fold of that array ([`view::fold_item_states`]).
//!
//! # Example
//!
//! ```ignore
//! use sessionstore::{SessionStore, NewDisposition, DispositionAction};
//!
//! let store = SessionStore::open("sessions")?;
//! let id = store.save(&mut session).unwrap();
//! store.append_disposition(&id, NewDisposition::new(DispositionAction::Trash, url))?;
//! let view = store.get_session_with_dispositions(&id)?;
//! assert_eq!(view.unresolved_count, 0);
//! ```

pub mod cli;
mod disposition;
mod effort;
mod error;
pub mod path;
mod session;
mod store;
pub mod view;

pub use disposition::{Disposition, DispositionAction, NewDisposition};
pub use effort::{Effort, EffortItem, EffortStats, EffortStatus};
pub use error::{DispositionError, EffortError, StoreError};
pub use path::{session_path, validate_session_id};
pub use session::{
    CategoryTask, CostBreakdown, DeepDiveRequest, DeepDiveResult, GroupItem, PassTiming, Reasoning, SCHEMA_VERSION,
    Session, SessionId, SessionMeta, SessionMode, TabReasoning, ThematicAnalysis, TokenUsage, UNCLASSIFIED,
    Visualization,
};
pub use store::{SearchHit, SessionStore, SessionSummary};
pub use view::{AppliedSessionView, ItemState, ItemStatus, SessionView, fold_item_states};
