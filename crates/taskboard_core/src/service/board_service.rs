//! Board use-case service.
//!
//! # Responsibility
//! - Check board existence and membership above the dispatcher.
//! - Map column/task use cases onto dispatcher mutations.
//!
//! # Invariants
//! - A task's creator and assignees are participants of its board.
//! - Column and task ordering is only ever changed through the dispatcher.

use crate::dispatch::{DispatchError, Dispatcher, Handle};
use crate::model::board::{Board, BoardId, NewBoard, UserId};
use crate::model::column::{Column, ColumnId, NewColumn};
use crate::model::item::{BoardItem, ItemPatch};
use crate::model::ordered::CollectionKey;
use crate::model::task::{NewTask, Task, TaskId};
use crate::model::validation::ValidationError;
use crate::store::{RemoteStore, StoreError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from board service operations.
#[derive(Debug)]
pub enum BoardServiceError {
    /// Field rules rejected the input.
    Validation(ValidationError),
    BoardNotFound(BoardId),
    ColumnNotFound { board: BoardId, column: ColumnId },
    /// User is neither owner nor member of the board.
    NotBoardMember { board: BoardId, user: UserId },
    /// Dispatcher refused the mutation before writing.
    Dispatch(DispatchError),
    /// Board lifecycle call failed.
    Store(StoreError),
}

impl Display for BoardServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::BoardNotFound(id) => write!(f, "board not found: {id}"),
            Self::ColumnNotFound { board, column } => {
                write!(f, "column {column} not found in board {board}")
            }
            Self::NotBoardMember { board, user } => {
                write!(f, "user {user} is not a participant of board {board}")
            }
            Self::Dispatch(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Dispatch(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::BoardNotFound(_)
            | Self::ColumnNotFound { .. }
            | Self::NotBoardMember { .. } => None,
        }
    }
}

impl From<ValidationError> for BoardServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DispatchError> for BoardServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(err) => Self::Validation(err),
            DispatchError::CollectionNotFound(CollectionKey::Columns { board }) => {
                Self::BoardNotFound(board)
            }
            DispatchError::CollectionNotFound(CollectionKey::Tasks { board, column }) => {
                Self::ColumnNotFound { board, column }
            }
            other => Self::Dispatch(other),
        }
    }
}

impl From<StoreError> for BoardServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type BoardServiceResult<T> = Result<T, BoardServiceError>;

/// Board service facade.
pub struct BoardService<S: ?Sized> {
    dispatcher: Dispatcher<S>,
}

impl<S> BoardService<S>
where
    S: RemoteStore + ?Sized + 'static,
{
    pub fn new(dispatcher: Dispatcher<S>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// Creates one board; the owner is always a participant.
    pub async fn create_board(&self, board: NewBoard) -> BoardServiceResult<Board> {
        let normalized = board.normalized()?;
        let uuid = self.dispatcher.store().create_board(&normalized).await?;
        info!(
            "event=board_create module=service status=ok board_id={uuid} members={}",
            normalized.members.len()
        );
        Ok(Board {
            uuid,
            title: normalized.title,
            owner: normalized.owner,
            members: normalized.members,
        })
    }

    pub async fn board(&self, id: BoardId) -> BoardServiceResult<Board> {
        self.dispatcher
            .store()
            .get_board(id)
            .await?
            .ok_or(BoardServiceError::BoardNotFound(id))
    }

    /// Deletes a board with its columns and tasks and drops their views.
    /// Waits for batches in flight on the board to settle first.
    pub async fn delete_board(&self, id: BoardId) -> BoardServiceResult<()> {
        match self.dispatcher.delete_board(id).await {
            Ok(()) => {}
            Err(DispatchError::Store(StoreError::NotFound(_))) => {
                return Err(BoardServiceError::BoardNotFound(id))
            }
            Err(err) => return Err(err.into()),
        }
        info!("event=board_delete module=service status=ok board_id={id}");
        Ok(())
    }

    /// Appends a column to the board.
    pub async fn add_column(
        &self,
        board: BoardId,
        title: impl Into<String>,
    ) -> BoardServiceResult<Handle> {
        self.board(board).await?;
        let handle = self
            .dispatcher
            .request_insert(CollectionKey::columns(board), NewColumn::new(title))
            .await?;
        Ok(handle)
    }

    /// Appends a task to `column` after checking creator and assignees.
    ///
    /// A column outside `board` is `ColumnNotFound`, reported before any
    /// write.
    pub async fn add_task(
        &self,
        board: BoardId,
        column: ColumnId,
        task: NewTask,
    ) -> BoardServiceResult<Handle> {
        let found = self.board(board).await?;
        ensure_participant(&found, task.creator)?;
        for assignee in &task.assignees {
            ensure_participant(&found, *assignee)?;
        }
        let handle = self
            .dispatcher
            .request_insert(CollectionKey::tasks(board, column), task)
            .await?;
        Ok(handle)
    }

    /// Renames a column; an unchanged title resolves without writing.
    pub async fn rename_column(
        &self,
        board: BoardId,
        column: ColumnId,
        title: impl Into<String>,
    ) -> BoardServiceResult<Handle> {
        let handle = self
            .dispatcher
            .request_edit(CollectionKey::columns(board), column, ItemPatch::title(title))
            .await?;
        Ok(handle)
    }

    pub async fn edit_task(
        &self,
        board: BoardId,
        column: ColumnId,
        task: TaskId,
        patch: ItemPatch,
    ) -> BoardServiceResult<Handle> {
        if let Some(assignees) = &patch.assignees {
            let found = self.board(board).await?;
            for assignee in assignees {
                ensure_participant(&found, *assignee)?;
            }
        }
        let handle = self
            .dispatcher
            .request_edit(CollectionKey::tasks(board, column), task, patch)
            .await?;
        Ok(handle)
    }

    /// Deletes a column together with its tasks.
    pub async fn delete_column(
        &self,
        board: BoardId,
        column: ColumnId,
    ) -> BoardServiceResult<Handle> {
        let handle = self
            .dispatcher
            .request_delete(CollectionKey::columns(board), column)
            .await?;
        Ok(handle)
    }

    pub async fn delete_task(
        &self,
        board: BoardId,
        column: ColumnId,
        task: TaskId,
    ) -> BoardServiceResult<Handle> {
        let handle = self
            .dispatcher
            .request_delete(CollectionKey::tasks(board, column), task)
            .await?;
        Ok(handle)
    }

    /// Moves a task within or across columns of one board. Without a rank
    /// the task goes last.
    pub async fn move_task(
        &self,
        board: BoardId,
        task: TaskId,
        from: ColumnId,
        to: ColumnId,
        rank: Option<u32>,
    ) -> BoardServiceResult<Handle> {
        let handle = self
            .dispatcher
            .request_move(
                task,
                CollectionKey::tasks(board, from),
                CollectionKey::tasks(board, to),
                rank,
            )
            .await?;
        Ok(handle)
    }

    /// Moves a column to `rank` among the board's columns.
    pub async fn move_column(
        &self,
        board: BoardId,
        column: ColumnId,
        rank: u32,
    ) -> BoardServiceResult<Handle> {
        let key = CollectionKey::columns(board);
        let handle = self
            .dispatcher
            .request_move(column, key, key, Some(rank))
            .await?;
        Ok(handle)
    }

    pub async fn columns(&self, board: BoardId) -> BoardServiceResult<Vec<Column>> {
        let items = self
            .dispatcher
            .snapshot(CollectionKey::columns(board))
            .await?;
        Ok(items.into_iter().filter_map(BoardItem::into_column).collect())
    }

    pub async fn tasks(&self, board: BoardId, column: ColumnId) -> BoardServiceResult<Vec<Task>> {
        let items = self
            .dispatcher
            .snapshot(CollectionKey::tasks(board, column))
            .await?;
        Ok(items.into_iter().filter_map(BoardItem::into_task).collect())
    }
}

fn ensure_participant(board: &Board, user: UserId) -> BoardServiceResult<()> {
    if board.is_participant(user) {
        return Ok(());
    }
    Err(BoardServiceError::NotBoardMember {
        board: board.uuid,
        user,
    })
}
