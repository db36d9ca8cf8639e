use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "educatord.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            avatar_url TEXT,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS appointments(
            id TEXT PRIMARY KEY,
            educator_id TEXT NOT NULL,
            client_name TEXT NOT NULL,
            client_email TEXT NOT NULL,
            client_phone TEXT,
            scheduled_at TEXT NOT NULL,
            ends_at TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            outcome TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(educator_id) REFERENCES users(id)
        )",
        [],
    )?;
    // Overlap checks scan one educator's timeline.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_appointments_educator_time
         ON appointments(educator_id, scheduled_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_appointments_time ON appointments(scheduled_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS performance_metrics(
            id TEXT PRIMARY KEY,
            educator_id TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            total_appointments INTEGER NOT NULL,
            conversions INTEGER NOT NULL,
            feedback_score REAL,
            notes TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(educator_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_performance_metrics_educator
         ON performance_metrics(educator_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS training_resources(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            type TEXT NOT NULL,
            file_url TEXT NOT NULL,
            category TEXT NOT NULL,
            uploaded_by TEXT NOT NULL,
            access_roles TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(uploaded_by) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations(
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            name TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversation_participants(
            conversation_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY(conversation_id, user_id),
            FOREIGN KEY(conversation_id) REFERENCES conversations(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_conversation_participants_user
         ON conversation_participants(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages(
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            receiver_id TEXT,
            content TEXT NOT NULL,
            read_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(conversation_id) REFERENCES conversations(id),
            FOREIGN KEY(sender_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation_time
         ON messages(conversation_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS leads(
            id TEXT PRIMARY KEY,
            educator_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            stage TEXT NOT NULL,
            source TEXT NOT NULL,
            value REAL NOT NULL,
            notes TEXT,
            kind TEXT NOT NULL,
            last_contact TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(educator_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leads_educator ON leads(educator_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            educator_id TEXT NOT NULL,
            client_name TEXT NOT NULL,
            client_email TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            settled_at TEXT,
            FOREIGN KEY(educator_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_educator_time
         ON payments(educator_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            id TEXT PRIMARY KEY,
            educator_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            status TEXT NOT NULL,
            recipient TEXT NOT NULL,
            recipient_email TEXT NOT NULL,
            created_at TEXT NOT NULL,
            sent_at TEXT,
            expires_at TEXT,
            signed_at TEXT,
            signed_by TEXT,
            FOREIGN KEY(educator_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_educator ON documents(educator_id)",
        [],
    )?;

    Ok(())
}
