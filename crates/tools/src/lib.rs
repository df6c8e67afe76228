//! Tool catalog, registry and per-call dispatch for the pare servers.

pub mod catalog;
pub mod compaction;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use catalog::{PathArgs, ServerSpec, ToolSpec, SERVERS};
pub use compaction::{CompactMode, CompactionChoice, Compacted, Reducer, Representation};
pub use dispatcher::{CallOutcome, CallRequest, CommandResponse, CommandSummary, Dispatcher};
pub use error::{CallError, ErrorReport};
pub use registry::{ToolRegistry, ToolState};
