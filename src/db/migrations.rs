use anyhow::Context;
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS booking_context (
            customer_id TEXT PRIMARY KEY,
            updated_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            pending_service_key TEXT,
            pending_service_label TEXT,
            pending_start_local TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_booking_context_expires
            ON booking_context (expires_at);

        CREATE TABLE IF NOT EXISTS booking_holds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            service_key TEXT NOT NULL,
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            request_id INTEGER,
            status TEXT NOT NULL CHECK (status IN ('active','released','expired'))
        );
        CREATE INDEX IF NOT EXISTS idx_booking_holds_window
            ON booking_holds (start_at, end_at);
        CREATE INDEX IF NOT EXISTS idx_booking_holds_expires
            ON booking_holds (expires_at);

        CREATE TABLE IF NOT EXISTS booking_drafts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            service_key TEXT NOT NULL,
            service_label TEXT NOT NULL,
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            hold_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('proposed','confirmed','cancelled','expired'))
        );
        CREATE INDEX IF NOT EXISTS idx_booking_drafts_customer
            ON booking_drafts (customer_id, status);

        CREATE TABLE IF NOT EXISTS booking_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            public_ref TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            service_key TEXT NOT NULL,
            service_label TEXT NOT NULL,
            start_at TEXT NOT NULL,
            end_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending','approved','rejected','expired','cancelled')),
            admin_actor TEXT,
            decided_at TEXT,
            admin_note TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_booking_requests_status
            ON booking_requests (status);
        CREATE INDEX IF NOT EXISTS idx_booking_requests_window
            ON booking_requests (start_at, end_at);",
    )
    .context("failed to apply booking schema")?;

    Ok(())
}
