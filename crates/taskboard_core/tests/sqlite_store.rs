use std::sync::Arc;
use taskboard_core::db::DbError;
use taskboard_core::store::ItemWrite;
use taskboard_core::{
    BatchState, BoardItem, CollectionKey, Dispatcher, DispatcherConfig, ItemPatch, NewBoard,
    NewColumn, NewItem, NewTask, OrderedItem, RemoteStore, SqliteStore, StoreError,
};
use uuid::Uuid;

async fn board_with_columns(store: &SqliteStore, titles: &[&str]) -> (Uuid, Vec<Uuid>) {
    let owner = Uuid::new_v4();
    let board = store
        .create_board(&NewBoard::new("Board", owner))
        .await
        .unwrap();
    let key = CollectionKey::columns(board);
    let mut columns = Vec::new();
    for (index, title) in titles.iter().enumerate() {
        let id = store
            .create_item(key, &NewItem::Column(NewColumn::new(*title)), index as u32 + 1)
            .await
            .unwrap();
        columns.push(id);
    }
    (board, columns)
}

#[tokio::test]
async fn board_and_columns_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskboard.db");
    let member = Uuid::new_v4();

    let (board, columns) = {
        let store = SqliteStore::open(&path).unwrap();
        let owner = Uuid::new_v4();
        let board = store
            .create_board(&NewBoard::new("Board", owner).with_members([member]))
            .await
            .unwrap();
        let key = CollectionKey::columns(board);
        let mut columns = Vec::new();
        for (index, title) in ["Todo", "Done"].iter().enumerate() {
            columns.push(
                store
                    .create_item(key, &NewItem::Column(NewColumn::new(*title)), index as u32 + 1)
                    .await
                    .unwrap(),
            );
        }
        (board, columns)
    };

    let store = SqliteStore::open(&path).unwrap();
    let loaded = store.get_board(board).await.unwrap().unwrap();
    assert!(loaded.members.contains(&member));
    assert!(loaded.is_participant(member));

    let fetched = store
        .fetch_siblings(CollectionKey::columns(board))
        .await
        .unwrap();
    assert_eq!(
        fetched.iter().map(OrderedItem::item_id).collect::<Vec<_>>(),
        columns
    );
    assert_eq!(fetched[1].title(), "Done");
}

#[tokio::test]
async fn relocating_task_keeps_assignees() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (board, columns) = board_with_columns(&store, &["Todo", "Done"]).await;
    let assignee = Uuid::new_v4();
    let from = CollectionKey::tasks(board, columns[0]);
    let to = CollectionKey::tasks(board, columns[1]);
    let task = store
        .create_item(
            from,
            &NewItem::Task(NewTask::new("Task", "desc", Uuid::new_v4()).with_assignees([assignee])),
            1,
        )
        .await
        .unwrap();

    store
        .write_item(from, task, &ItemWrite::relocate(to, 1))
        .await
        .unwrap();

    assert!(store.fetch_siblings(from).await.unwrap().is_empty());
    let moved = store.fetch_siblings(to).await.unwrap();
    let moved = moved[0].as_task().unwrap();
    assert_eq!(moved.uuid, task);
    assert_eq!(moved.column_uuid, columns[1]);
    assert!(moved.assignees.contains(&assignee));
}

#[tokio::test]
async fn stale_collection_key_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (board, columns) = board_with_columns(&store, &["Todo", "Done"]).await;
    let task = store
        .create_item(
            CollectionKey::tasks(board, columns[0]),
            &NewItem::Task(NewTask::new("Task", "desc", Uuid::new_v4())),
            1,
        )
        .await
        .unwrap();

    let err = store
        .write_item(
            CollectionKey::tasks(board, columns[1]),
            task,
            &ItemWrite::order(2),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound(id) if id == task));
}

#[tokio::test]
async fn columns_reject_task_fields() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (board, columns) = board_with_columns(&store, &["Todo"]).await;

    let err = store
        .write_item(
            CollectionKey::columns(board),
            columns[0],
            &ItemWrite::patch(ItemPatch::default().with_description("nope")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Rejected(_)));
}

#[tokio::test]
async fn deleting_column_removes_its_tasks() {
    let store = SqliteStore::open_in_memory().unwrap();
    let (board, columns) = board_with_columns(&store, &["Todo"]).await;
    let tasks = CollectionKey::tasks(board, columns[0]);
    store
        .create_item(
            tasks,
            &NewItem::Task(NewTask::new("Task", "desc", Uuid::new_v4())),
            1,
        )
        .await
        .unwrap();

    store
        .delete_item(CollectionKey::columns(board), columns[0])
        .await
        .unwrap();

    assert!(store.fetch_siblings(tasks).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_unknown_board_is_not_found() {
    let store = SqliteStore::open_in_memory().unwrap();
    let missing = Uuid::new_v4();

    let err = store.delete_board(missing).await.unwrap_err();

    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}

#[test]
fn unmigrated_connection_is_rejected() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();

    let err = SqliteStore::try_new(conn).err().unwrap();

    assert!(matches!(
        err,
        StoreError::Db(DbError::UninitializedConnection {
            actual_version: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn dispatcher_keeps_sqlite_orders_contiguous() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let (board, columns) = board_with_columns(&store, &["A", "B", "C", "D"]).await;
    let key = CollectionKey::columns(board);
    let dispatcher = Dispatcher::new(Arc::clone(&store), DispatcherConfig::default());

    let moved = dispatcher
        .request_move(columns[3], key, key, Some(1))
        .await
        .unwrap();
    assert_eq!(moved.settled().await, BatchState::Applied { writes: 4 });
    let deleted = dispatcher.request_delete(key, columns[1]).await.unwrap();
    assert_eq!(deleted.settled().await, BatchState::Applied { writes: 2 });

    let titles: Vec<(u32, String)> = store
        .fetch_siblings(key)
        .await
        .unwrap()
        .iter()
        .map(|item: &BoardItem| (item.order(), item.title().to_string()))
        .collect();
    assert_eq!(
        titles,
        vec![
            (1, "D".to_string()),
            (2, "A".to_string()),
            (3, "C".to_string())
        ]
    );
}
