use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("bursar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_school ON classes(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            phone TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    // Existing workspaces may predate the phone column. Add if needed.
    ensure_students_phone(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS guardians(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            phone TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_guardians_student ON guardians(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            role_title TEXT NOT NULL,
            base_salary INTEGER NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_school ON staff(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fees(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT,
            title TEXT NOT NULL,
            amount INTEGER NOT NULL,
            due_date TEXT NOT NULL,
            scope TEXT NOT NULL,
            optional_flag INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    ensure_fees_optional_flag(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fees_school ON fees(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fees_class ON fees(class_id)",
        [],
    )?;

    // Eligibility is a snapshot taken at fee creation. Enrollment changes
    // after that instant never rewrite this table.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_eligibility(
            fee_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY(fee_id, student_id),
            FOREIGN KEY(fee_id) REFERENCES fees(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_eligibility_student ON fee_eligibility(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            fee_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            method TEXT NOT NULL,
            reference TEXT,
            paid_at TEXT NOT NULL,
            FOREIGN KEY(fee_id) REFERENCES fees(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_payments_reference(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_fee ON payments(fee_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_fee_student ON payments(fee_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_transactions(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            account TEXT NOT NULL,
            amount INTEGER NOT NULL,
            entry_type TEXT NOT NULL,
            description TEXT NOT NULL,
            student_id TEXT,
            fee_id TEXT,
            staff_id TEXT,
            payment_id TEXT,
            recorded_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_school ON ledger_transactions(school_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_account ON ledger_transactions(school_id, account)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_payment ON ledger_transactions(payment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS salary_events(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            staff_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            month TEXT NOT NULL,
            paid_at TEXT NOT NULL,
            UNIQUE(staff_id, month),
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_salary_events_school ON salary_events(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_log(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            phone TEXT NOT NULL,
            message TEXT NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notification_log_school ON notification_log(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &text),
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn ensure_students_phone(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "phone")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN phone TEXT", [])?;
    Ok(())
}

fn ensure_fees_optional_flag(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "fees", "optional_flag")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE fees ADD COLUMN optional_flag INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn ensure_payments_reference(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "payments", "reference")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE payments ADD COLUMN reference TEXT", [])?;
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
