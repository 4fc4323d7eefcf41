use rusqlite::Connection;
use taskboard_core::db::migrations::latest_version;
use taskboard_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "boards",
        "board_members",
        "board_columns",
        "tasks",
        "task_assignees",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskboard.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "board_columns");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn deleting_board_cascades_through_foreign_keys() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO boards (uuid, title, owner_uuid) VALUES ('b1', 'Board', 'u1');
         INSERT INTO board_columns (uuid, board_uuid, title, sort_order)
             VALUES ('c1', 'b1', 'Todo', 1);
         INSERT INTO tasks
             (uuid, board_uuid, column_uuid, title, description, sort_order, creator_uuid)
             VALUES ('t1', 'b1', 'c1', 'Task', 'desc', 1, 'u1');
         INSERT INTO task_assignees (task_uuid, user_uuid) VALUES ('t1', 'u1');",
    )
    .unwrap();

    conn.execute("DELETE FROM boards WHERE uuid = 'b1';", [])
        .unwrap();

    for table in ["board_columns", "tasks", "task_assignees"] {
        assert_eq!(row_count(&conn, table), 0, "{table} should be empty");
    }
}

#[test]
fn sort_order_must_be_positive() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("INSERT INTO boards (uuid, title, owner_uuid) VALUES ('b1', 'Board', 'u1');")
        .unwrap();

    let result = conn.execute(
        "INSERT INTO board_columns (uuid, board_uuid, title, sort_order)
         VALUES ('c1', 'b1', 'Todo', 0);",
        [],
    );

    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
