//! v001 -- Document table.
//!
//! One row per document. Bodies are JSON text queried with `json_extract`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    data       TEXT NOT NULL,               -- JSON object
    updated_at INTEGER NOT NULL,            -- unix millis

    PRIMARY KEY (collection, id)
);

-- Notification feeds are read per receiver, newest first.
CREATE INDEX IF NOT EXISTS idx_notifications_receiver_ts
    ON documents(json_extract(data, '$.receiverId'), json_extract(data, '$.timestamp') DESC)
    WHERE collection = 'notifications';
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
