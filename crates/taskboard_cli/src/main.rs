//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `taskboard_core` linkage.
//! - Run a short scripted board against an in-memory database.
//!
//! Usage: `taskboard_cli [absolute-log-dir]`

use std::error::Error;
use std::sync::Arc;
use taskboard_core::{
    BatchState, BoardService, Dispatcher, DispatcherConfig, Handle, LoggingConfig, NewBoard,
    NewTask, SqliteStore,
};
use uuid::Uuid;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("taskboard_core ping={}", taskboard_core::ping());
    println!("taskboard_core version={}", taskboard_core::core_version());

    if let Some(log_dir) = std::env::args().nth(1) {
        taskboard_core::init_logging(&LoggingConfig::new(log_dir))?;
    }

    let store = Arc::new(SqliteStore::open_in_memory()?);
    let service = BoardService::new(Dispatcher::new(store, DispatcherConfig::default()));

    let owner = Uuid::new_v4();
    let board = service.create_board(NewBoard::new("Smoke", owner)).await?;
    for title in ["Todo", "Doing", "Done"] {
        settle(service.add_column(board.uuid, title).await?).await?;
    }
    let columns = service.columns(board.uuid).await?;
    let [todo, _, done] = columns.as_slice() else {
        return Err(format!("expected 3 columns, found {}", columns.len()).into());
    };
    let (todo, done) = (todo.uuid, done.uuid);

    for title in ["Write spec", "Ship it"] {
        let task = NewTask::new(title, "scripted", owner);
        settle(service.add_task(board.uuid, todo, task).await?).await?;
    }
    let tasks = service.tasks(board.uuid, todo).await?;
    if let Some(first) = tasks.first() {
        settle(service.move_task(board.uuid, first.uuid, todo, done, None).await?).await?;
    }
    settle(service.move_column(board.uuid, done, 1).await?).await?;

    for column in service.columns(board.uuid).await? {
        let tasks = service.tasks(board.uuid, column.uuid).await?;
        println!(
            "column order={} title={} tasks={}",
            column.order,
            column.title,
            tasks
                .iter()
                .map(|task| format!("{}:{}", task.order, task.title))
                .collect::<Vec<_>>()
                .join(",")
        );
    }
    Ok(())
}

async fn settle(handle: Handle) -> Result<(), Box<dyn Error>> {
    match handle.settled().await {
        BatchState::Applied { .. } => Ok(()),
        other => Err(format!("batch did not apply: {}", other.label()).into()),
    }
}
