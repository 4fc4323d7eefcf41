//! SQLite-backed remote store.
//!
//! # Responsibility
//! - Persist boards, columns and tasks with their `sort_order`.
//! - Run blocking SQLite work off the async executor.
//!
//! # Invariants
//! - Sibling listing is deterministic: `sort_order ASC, uuid ASC`.
//! - A write names the collection the item is expected in; a mismatch is
//!   `NotFound`, never a silent write to another collection.
//! - Moving a column to another board carries its tasks' `board_uuid` along.

use crate::db::{ensure_schema, open_db, open_db_in_memory, TableSpec};
use crate::model::board::{Board, BoardId, NewBoard, UserId};
use crate::model::column::{Column, ColumnId};
use crate::model::item::{BoardItem, NewItem};
use crate::model::ordered::{CollectionKey, ItemId};
use crate::model::task::Task;
use crate::store::{ItemWrite, RemoteStore, StoreError, StoreResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const STORE_TABLES: &[TableSpec] = &[
    ("boards", &["uuid", "title", "owner_uuid", "updated_at"]),
    ("board_members", &["board_uuid", "user_uuid"]),
    (
        "board_columns",
        &["uuid", "board_uuid", "title", "sort_order", "updated_at"],
    ),
    (
        "tasks",
        &[
            "uuid",
            "board_uuid",
            "column_uuid",
            "title",
            "description",
            "sort_order",
            "creator_uuid",
            "updated_at",
        ],
    ),
    ("task_assignees", &["task_uuid", "user_uuid"]),
];

/// Remote store over one SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - Returns `StoreError::Db` when the schema is missing or outdated.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_schema(&conn, STORE_TABLES)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    async fn run<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))?;
            work(&guard)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("sqlite worker failed: {err}")))?
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn ensure_collection(&self, key: CollectionKey) -> StoreResult<()> {
        self.run(move |conn| match key {
            CollectionKey::Columns { board } => ensure_board_exists(conn, board),
            CollectionKey::Tasks { board, column } => ensure_column_in_board(conn, board, column),
        })
        .await
    }

    async fn fetch_siblings(&self, key: CollectionKey) -> StoreResult<Vec<BoardItem>> {
        self.run(move |conn| match key {
            CollectionKey::Columns { board } => Ok(load_columns(conn, board)?
                .into_iter()
                .map(BoardItem::Column)
                .collect()),
            CollectionKey::Tasks { board, column } => Ok(load_tasks(conn, board, column)?
                .into_iter()
                .map(BoardItem::Task)
                .collect()),
        })
        .await
    }

    async fn create_item(
        &self,
        key: CollectionKey,
        item: &NewItem,
        order: u32,
    ) -> StoreResult<ItemId> {
        let item = item.clone();
        self.run(move |conn| insert_item(conn, key, &item, order))
            .await
    }

    async fn write_item(
        &self,
        key: CollectionKey,
        id: ItemId,
        fields: &ItemWrite,
    ) -> StoreResult<()> {
        let fields = fields.clone();
        self.run(move |conn| match key {
            CollectionKey::Columns { board } => update_column(conn, board, id, &fields),
            CollectionKey::Tasks { board, column } => update_task(conn, board, column, id, &fields),
        })
        .await
    }

    async fn delete_item(&self, key: CollectionKey, id: ItemId) -> StoreResult<()> {
        self.run(move |conn| {
            let changed = match key {
                CollectionKey::Columns { board } => conn.execute(
                    "DELETE FROM board_columns WHERE uuid = ?1 AND board_uuid = ?2;",
                    params![id.to_string(), board.to_string()],
                )?,
                CollectionKey::Tasks { board, column } => conn.execute(
                    "DELETE FROM tasks
                     WHERE uuid = ?1
                       AND column_uuid = ?2
                       AND board_uuid = ?3;",
                    params![id.to_string(), column.to_string(), board.to_string()],
                )?,
            };
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn create_board(&self, board: &NewBoard) -> StoreResult<BoardId> {
        let board = board.clone();
        self.run(move |conn| insert_board(conn, &board)).await
    }

    async fn get_board(&self, id: BoardId) -> StoreResult<Option<Board>> {
        self.run(move |conn| load_board(conn, id)).await
    }

    async fn delete_board(&self, id: BoardId) -> StoreResult<()> {
        self.run(move |conn| {
            let changed = conn.execute("DELETE FROM boards WHERE uuid = ?1;", [id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }
}

fn insert_board(conn: &Connection, board: &NewBoard) -> StoreResult<BoardId> {
    let board_uuid = Uuid::new_v4();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO boards (uuid, title, owner_uuid) VALUES (?1, ?2, ?3);",
        params![
            board_uuid.to_string(),
            board.title.as_str(),
            board.owner.to_string()
        ],
    )?;
    for member in &board.members {
        tx.execute(
            "INSERT OR IGNORE INTO board_members (board_uuid, user_uuid) VALUES (?1, ?2);",
            params![board_uuid.to_string(), member.to_string()],
        )?;
    }
    tx.commit()?;
    Ok(board_uuid)
}

fn load_board(conn: &Connection, board_uuid: BoardId) -> StoreResult<Option<Board>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT title, owner_uuid FROM boards WHERE uuid = ?1;",
            [board_uuid.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((title, owner_text)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_uuid FROM board_members WHERE board_uuid = ?1 ORDER BY user_uuid ASC;",
    )?;
    let mut rows = stmt.query([board_uuid.to_string()])?;
    let mut members = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        members.insert(parse_uuid(&value, "board_members.user_uuid")?);
    }

    Ok(Some(Board {
        uuid: board_uuid,
        title,
        owner: parse_uuid(&owner_text, "boards.owner_uuid")?,
        members,
    }))
}

fn insert_item(
    conn: &Connection,
    key: CollectionKey,
    item: &NewItem,
    order: u32,
) -> StoreResult<ItemId> {
    let item_uuid = Uuid::new_v4();
    match (key, item) {
        (CollectionKey::Columns { board }, NewItem::Column(column)) => {
            ensure_board_exists(conn, board)?;
            conn.execute(
                "INSERT INTO board_columns (uuid, board_uuid, title, sort_order)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    item_uuid.to_string(),
                    board.to_string(),
                    column.title.as_str(),
                    order
                ],
            )?;
        }
        (CollectionKey::Tasks { board, column }, NewItem::Task(task)) => {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            ensure_column_in_board(&tx, board, column)?;
            tx.execute(
                "INSERT INTO tasks (
                    uuid,
                    board_uuid,
                    column_uuid,
                    title,
                    description,
                    sort_order,
                    creator_uuid
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    item_uuid.to_string(),
                    board.to_string(),
                    column.to_string(),
                    task.title.as_str(),
                    task.description.as_str(),
                    order,
                    task.creator.to_string(),
                ],
            )?;
            replace_assignees(&tx, item_uuid, &task.assignees)?;
            tx.commit()?;
        }
        (key, item) => {
            return Err(StoreError::Rejected(format!(
                "cannot create {} item in {key}",
                item.kind()
            )));
        }
    }
    Ok(item_uuid)
}

fn update_column(
    conn: &Connection,
    board: BoardId,
    column_uuid: ColumnId,
    fields: &ItemWrite,
) -> StoreResult<()> {
    if fields.patch.description.is_some() || fields.patch.assignees.is_some() {
        return Err(StoreError::Rejected(
            "columns only accept title and order writes".into(),
        ));
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM board_columns WHERE uuid = ?1 AND board_uuid = ?2);",
        params![column_uuid.to_string(), board.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(StoreError::NotFound(column_uuid));
    }

    match fields.collection {
        Some(CollectionKey::Columns { board: target }) => {
            ensure_board_exists(&tx, target)?;
            tx.execute(
                "UPDATE board_columns SET board_uuid = ?2 WHERE uuid = ?1;",
                params![column_uuid.to_string(), target.to_string()],
            )?;
            tx.execute(
                "UPDATE tasks
                 SET board_uuid = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE column_uuid = ?1;",
                params![column_uuid.to_string(), target.to_string()],
            )?;
        }
        Some(other) => {
            return Err(StoreError::Rejected(format!(
                "cannot move column into {other}"
            )));
        }
        None => {}
    }
    if let Some(order) = fields.order {
        tx.execute(
            "UPDATE board_columns SET sort_order = ?2 WHERE uuid = ?1;",
            params![column_uuid.to_string(), order],
        )?;
    }
    if let Some(title) = &fields.patch.title {
        tx.execute(
            "UPDATE board_columns SET title = ?2 WHERE uuid = ?1;",
            params![column_uuid.to_string(), title.as_str()],
        )?;
    }
    tx.execute(
        "UPDATE board_columns
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?1;",
        [column_uuid.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn update_task(
    conn: &Connection,
    board: BoardId,
    column: ColumnId,
    task_uuid: ItemId,
    fields: &ItemWrite,
) -> StoreResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM tasks WHERE uuid = ?1 AND column_uuid = ?2 AND board_uuid = ?3
        );",
        params![task_uuid.to_string(), column.to_string(), board.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(StoreError::NotFound(task_uuid));
    }

    match fields.collection {
        Some(CollectionKey::Tasks {
            board: target_board,
            column: target_column,
        }) => {
            ensure_column_in_board(&tx, target_board, target_column)?;
            tx.execute(
                "UPDATE tasks SET board_uuid = ?2, column_uuid = ?3 WHERE uuid = ?1;",
                params![
                    task_uuid.to_string(),
                    target_board.to_string(),
                    target_column.to_string()
                ],
            )?;
        }
        Some(other) => {
            return Err(StoreError::Rejected(format!("cannot move task into {other}")));
        }
        None => {}
    }
    if let Some(order) = fields.order {
        tx.execute(
            "UPDATE tasks SET sort_order = ?2 WHERE uuid = ?1;",
            params![task_uuid.to_string(), order],
        )?;
    }
    if let Some(title) = &fields.patch.title {
        tx.execute(
            "UPDATE tasks SET title = ?2 WHERE uuid = ?1;",
            params![task_uuid.to_string(), title.as_str()],
        )?;
    }
    if let Some(description) = &fields.patch.description {
        tx.execute(
            "UPDATE tasks SET description = ?2 WHERE uuid = ?1;",
            params![task_uuid.to_string(), description.as_str()],
        )?;
    }
    if let Some(assignees) = &fields.patch.assignees {
        replace_assignees(&tx, task_uuid, assignees)?;
    }
    tx.execute(
        "UPDATE tasks SET updated_at = (strftime('%s', 'now') * 1000) WHERE uuid = ?1;",
        [task_uuid.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn replace_assignees(
    conn: &Connection,
    task_uuid: ItemId,
    assignees: &BTreeSet<UserId>,
) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM task_assignees WHERE task_uuid = ?1;",
        [task_uuid.to_string()],
    )?;
    for user in assignees {
        conn.execute(
            "INSERT INTO task_assignees (task_uuid, user_uuid) VALUES (?1, ?2);",
            params![task_uuid.to_string(), user.to_string()],
        )?;
    }
    Ok(())
}

fn load_columns(conn: &Connection, board: BoardId) -> StoreResult<Vec<Column>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, board_uuid, title, sort_order
         FROM board_columns
         WHERE board_uuid = ?1
         ORDER BY sort_order ASC, uuid ASC;",
    )?;
    let mut rows = stmt.query([board.to_string()])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(parse_column_row(row)?);
    }
    Ok(columns)
}

fn load_tasks(conn: &Connection, board: BoardId, column: ColumnId) -> StoreResult<Vec<Task>> {
    let mut assignees = load_assignees_for_column(conn, column)?;

    let mut stmt = conn.prepare(
        "SELECT uuid, board_uuid, column_uuid, title, description, sort_order, creator_uuid
         FROM tasks
         WHERE column_uuid = ?1
           AND board_uuid = ?2
         ORDER BY sort_order ASC, uuid ASC;",
    )?;
    let mut rows = stmt.query(params![column.to_string(), board.to_string()])?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        let mut task = parse_task_row(row)?;
        task.assignees = assignees.remove(&task.uuid).unwrap_or_default();
        tasks.push(task);
    }
    Ok(tasks)
}

fn load_assignees_for_column(
    conn: &Connection,
    column: ColumnId,
) -> StoreResult<HashMap<ItemId, BTreeSet<UserId>>> {
    let mut stmt = conn.prepare(
        "SELECT a.task_uuid, a.user_uuid
         FROM task_assignees a
         INNER JOIN tasks t ON t.uuid = a.task_uuid
         WHERE t.column_uuid = ?1;",
    )?;
    let mut rows = stmt.query([column.to_string()])?;
    let mut result: HashMap<ItemId, BTreeSet<UserId>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let task_text: String = row.get(0)?;
        let user_text: String = row.get(1)?;
        result
            .entry(parse_uuid(&task_text, "task_assignees.task_uuid")?)
            .or_default()
            .insert(parse_uuid(&user_text, "task_assignees.user_uuid")?);
    }
    Ok(result)
}

fn ensure_board_exists(conn: &Connection, board: BoardId) -> StoreResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards WHERE uuid = ?1);",
        [board.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(StoreError::NotFound(board));
    }
    Ok(())
}

fn ensure_column_in_board(conn: &Connection, board: BoardId, column: ColumnId) -> StoreResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM board_columns WHERE uuid = ?1 AND board_uuid = ?2);",
        params![column.to_string(), board.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(StoreError::NotFound(column));
    }
    Ok(())
}

fn parse_column_row(row: &Row<'_>) -> StoreResult<Column> {
    let uuid_text: String = row.get("uuid")?;
    let board_text: String = row.get("board_uuid")?;
    Ok(Column {
        uuid: parse_uuid(&uuid_text, "board_columns.uuid")?,
        board_uuid: parse_uuid(&board_text, "board_columns.board_uuid")?,
        title: row.get("title")?,
        order: parse_order(row.get("sort_order")?, "board_columns.sort_order")?,
    })
}

fn parse_task_row(row: &Row<'_>) -> StoreResult<Task> {
    let uuid_text: String = row.get("uuid")?;
    let board_text: String = row.get("board_uuid")?;
    let column_text: String = row.get("column_uuid")?;
    let creator_text: String = row.get("creator_uuid")?;
    Ok(Task {
        uuid: parse_uuid(&uuid_text, "tasks.uuid")?,
        board_uuid: parse_uuid(&board_text, "tasks.board_uuid")?,
        column_uuid: parse_uuid(&column_text, "tasks.column_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        order: parse_order(row.get("sort_order")?, "tasks.sort_order")?,
        creator: parse_uuid(&creator_text, "tasks.creator_uuid")?,
        assignees: BTreeSet::new(),
    })
}

fn parse_order(value: i64, column: &'static str) -> StoreResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|order| *order >= 1)
        .ok_or_else(|| StoreError::InvalidData(format!("invalid order `{value}` in {column}")))
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
