use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("trainstream.db");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS venues(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            address1 TEXT,
            address2 TEXT,
            city TEXT,
            postcode TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_templates(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            course_type TEXT,
            default_title TEXT,
            default_venue_id INTEGER,
            default_trainer TEXT,
            default_capacity INTEGER,
            course_title TEXT,
            provider_type TEXT,
            validity_months INTEGER,
            cpd_hours REAL,
            FOREIGN KEY(default_venue_id) REFERENCES venues(id)
        )",
        [],
    )?;

    // Databases written by the desktop app predate some template columns.
    // Add them in place; reads treat them as optional.
    ensure_template_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_ref TEXT NOT NULL,
            course_date TEXT NOT NULL,
            template_id INTEGER NOT NULL,
            course_title TEXT,
            trainer TEXT,
            venue_id INTEGER,
            capacity INTEGER,
            status TEXT,
            FOREIGN KEY(template_id) REFERENCES course_templates(id),
            FOREIGN KEY(venue_id) REFERENCES venues(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_template ON courses(template_id)",
        [],
    )?;
    // Cohort allocation scans refs and then inserts; two concurrent creates can
    // pick the same number. The unique index turns that race into a conflict
    // the handler retries once.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_courses_course_ref ON courses(course_ref)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS participants(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL,
            first_name TEXT NOT NULL,
            surname TEXT NOT NULL,
            contact_number TEXT,
            email TEXT,
            payment_status TEXT,
            joining_sent INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_participants_course ON participants(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            surname TEXT NOT NULL,
            full_name TEXT NOT NULL,
            email TEXT,
            role TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            must_change_password INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_template_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "course_templates", "course_title")? {
        tracing::info!("adding course_templates.course_title");
        conn.execute("ALTER TABLE course_templates ADD COLUMN course_title TEXT", [])?;
    }
    if !table_has_column(conn, "course_templates", "provider_type")? {
        tracing::info!("adding course_templates.provider_type");
        conn.execute("ALTER TABLE course_templates ADD COLUMN provider_type TEXT", [])?;
    }
    if !table_has_column(conn, "course_templates", "validity_months")? {
        tracing::info!("adding course_templates.validity_months");
        conn.execute(
            "ALTER TABLE course_templates ADD COLUMN validity_months INTEGER",
            [],
        )?;
    }
    if !table_has_column(conn, "course_templates", "cpd_hours")? {
        tracing::info!("adding course_templates.cpd_hours");
        conn.execute("ALTER TABLE course_templates ADD COLUMN cpd_hours REAL", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
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
