use log::debug;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "capstone.sqlite3";
pub const MARK_TABLES: [&str; 2] = ["marks", "design_marks"];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            student_name TEXT NOT NULL,
            email TEXT NOT NULL,
            supervisor TEXT NOT NULL,
            research_title TEXT NOT NULL,
            abstract TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // One row per member; group-level fields repeat on every row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS design_groups(
            id TEXT PRIMARY KEY,
            group_name TEXT NOT NULL,
            student_name TEXT NOT NULL,
            student_id TEXT NOT NULL,
            supervisor TEXT NOT NULL,
            abstract TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(group_name, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_design_groups_name ON design_groups(group_name)",
        [],
    )?;

    for table in MARK_TABLES {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table}(
                    id TEXT PRIMARY KEY,
                    subject_id TEXT NOT NULL,
                    stage TEXT NOT NULL,
                    raw_mark REAL NOT NULL,
                    examiner TEXT NOT NULL,
                    remarks TEXT,
                    signature_status TEXT NOT NULL,
                    timestamp TEXT NOT NULL
                )"
            ),
            [],
        )?;
        ensure_marks_criteria_json(conn, table)?;
        ensure_marks_signature_digest(conn, table)?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_subject ON {table}(subject_id)"),
            [],
        )?;
        // Mark rows are immutable once written.
        conn.execute(
            &format!(
                "CREATE TRIGGER IF NOT EXISTS {table}_no_update BEFORE UPDATE ON {table}
                 BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END"
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE TRIGGER IF NOT EXISTS {table}_no_delete BEFORE DELETE ON {table}
                 BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END"
            ),
            [],
        )?;
    }

    Ok(())
}

fn ensure_marks_criteria_json(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "criteria_json")? {
        return Ok(());
    }
    debug!("event=db_migrate status=ok table={table} column=criteria_json");
    conn.execute(&format!("ALTER TABLE {table} ADD COLUMN criteria_json TEXT"), [])?;
    Ok(())
}

fn ensure_marks_signature_digest(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "signature_digest")? {
        return Ok(());
    }
    debug!("event=db_migrate status=ok table={table} column=signature_digest");
    conn.execute(
        &format!("ALTER TABLE {table} ADD COLUMN signature_digest TEXT"),
        [],
    )?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
