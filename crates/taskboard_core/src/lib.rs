//! Core logic for the task board.
//! Ordering of columns and tasks is owned here: every reorder is planned by
//! the reorder engine and written through the mutation dispatcher.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod logging;
pub mod model;
pub mod reorder;
pub mod service;
pub mod store;
pub mod view;

pub use config::{BusyPolicy, ConfigError, DispatcherConfig, LogLevel, LoggingConfig};
pub use dispatch::{
    BatchId, BatchState, DispatchError, DispatchResult, Dispatcher, Handle, Mutation,
    WriteFailure,
};
pub use logging::{init_logging, LoggingError};
pub use model::board::{Board, BoardId, NewBoard, UserId};
pub use model::column::{Column, ColumnId, NewColumn};
pub use model::item::{BoardItem, ItemPatch, NewItem};
pub use model::ordered::{CollectionKey, CollectionKind, ItemId, OrderedItem, SiblingEntry};
pub use model::task::{NewTask, Task, TaskId};
pub use model::validation::ValidationError;
pub use reorder::{InvariantViolation, ReorderError, ReorderOp, ReorderPlan};
pub use service::board_service::{BoardService, BoardServiceError, BoardServiceResult};
pub use store::{MemoryStore, RemoteStore, SqliteStore, StoreError, StoreResult};
pub use view::{CollectionView, ViewPhase, ViewSnapshot};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
