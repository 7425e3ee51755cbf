use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result, Row};

use crate::clock::now_utc_rfc3339;

use super::{Notification, NotificationIntent, Recipient, RecipientClass, Subscription, SubscriptionKind};

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "baseline_notification_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscriber_class TEXT NOT NULL,
    subscriber_key TEXT NOT NULL,
    kind TEXT NOT NULL,
    value TEXT NOT NULL,
    value_norm TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (subscriber_class, subscriber_key, kind, value_norm)
);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    intent_id TEXT NOT NULL UNIQUE,
    recipient_class TEXT NOT NULL,
    recipient_key TEXT NOT NULL DEFAULT '',
    message TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    change_kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_notifications_recipient
    ON notifications(recipient_class, recipient_key, read);
CREATE INDEX IF NOT EXISTS idx_subscriptions_kind ON subscriptions(kind);
"#,
    },
    Migration {
        version: 2,
        name: "notification_district_v1",
        sql: r#"
ALTER TABLE notifications ADD COLUMN district TEXT;
"#,
    },
];

pub fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "FULL")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Returns `None` when an equivalent subscription already exists.
pub fn insert_subscription(
    conn: &Connection,
    subscriber: &Recipient,
    kind: SubscriptionKind,
    value: &str,
) -> Result<Option<Subscription>> {
    let created_at = now_utc_rfc3339();
    let inserted = conn.execute(
        r#"
INSERT OR IGNORE INTO subscriptions (
    subscriber_class, subscriber_key, kind, value, value_norm, created_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
        params![
            subscriber.class.as_str(),
            subscriber.key_or_empty(),
            kind.as_str(),
            value.trim(),
            normalize_value(value),
            created_at
        ],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    Ok(Some(Subscription {
        id: conn.last_insert_rowid(),
        subscriber: subscriber.clone(),
        kind,
        value: value.trim().to_string(),
        created_at,
    }))
}

pub fn delete_subscription(
    conn: &Connection,
    subscriber: &Recipient,
    kind: SubscriptionKind,
    value: &str,
) -> Result<bool> {
    let deleted = conn.execute(
        r#"
DELETE FROM subscriptions
WHERE subscriber_class = ?1 AND subscriber_key = ?2 AND kind = ?3 AND value_norm = ?4
"#,
        params![
            subscriber.class.as_str(),
            subscriber.key_or_empty(),
            kind.as_str(),
            normalize_value(value)
        ],
    )?;
    Ok(deleted > 0)
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, subscriber_class, subscriber_key, kind, value, created_at";

pub fn list_subscriptions(conn: &Connection) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM subscriptions ORDER BY id ASC",
        SUBSCRIPTION_COLUMNS
    ))?;
    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(subscription_from_row(row)?);
    }
    Ok(result)
}

pub fn subscriptions_for(conn: &Connection, subscriber: &Recipient) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM subscriptions WHERE subscriber_class = ?1 AND subscriber_key = ?2 ORDER BY id ASC",
        SUBSCRIPTION_COLUMNS
    ))?;
    let mut rows = stmt.query(params![subscriber.class.as_str(), subscriber.key_or_empty()])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(subscription_from_row(row)?);
    }
    Ok(result)
}

fn subscription_from_row(row: &Row<'_>) -> Result<Subscription> {
    let kind: String = row.get(3)?;
    Ok(Subscription {
        id: row.get(0)?,
        subscriber: recipient_from_columns(row, 1, 2)?,
        kind: SubscriptionKind::from_str(&kind)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err)))?,
        value: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Inserts the intent unless a notification with the same intent id exists.
/// Returns the stored row only when it was newly inserted.
pub fn insert_notification(
    conn: &Connection,
    intent: &NotificationIntent,
) -> Result<Option<Notification>> {
    let inserted = conn.execute(
        r#"
INSERT OR IGNORE INTO notifications (
    intent_id, recipient_class, recipient_key, message, entity_type, entity_id,
    change_kind, district, created_at, read
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)
"#,
        params![
            intent.id,
            intent.recipient.class.as_str(),
            intent.recipient.key_or_empty(),
            intent.message,
            intent.entity_type.as_str(),
            intent.entity_id,
            intent.change_kind.as_str(),
            intent.district,
            intent.created_at
        ],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    get_notification(conn, conn.last_insert_rowid())
}

const NOTIFICATION_COLUMNS: &str = "id, intent_id, recipient_class, recipient_key, message, \
     entity_type, entity_id, change_kind, district, created_at, read";

pub fn get_notification(conn: &Connection, id: i64) -> Result<Option<Notification>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM notifications WHERE id = ?1",
            NOTIFICATION_COLUMNS
        ),
        params![id],
        notification_from_row,
    )
    .optional()
}

pub fn list_notifications(
    conn: &Connection,
    recipient: &Recipient,
    unread_only: bool,
) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!(
        r#"
SELECT {}
FROM notifications
WHERE recipient_class = ?1 AND recipient_key = ?2 AND (?3 = 0 OR read = 0)
ORDER BY created_at DESC, id DESC
"#,
        NOTIFICATION_COLUMNS
    ))?;
    let mut rows = stmt.query(params![
        recipient.class.as_str(),
        recipient.key_or_empty(),
        unread_only
    ])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(notification_from_row(row)?);
    }
    Ok(result)
}

pub fn count_notifications(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
}

pub fn mark_read(conn: &Connection, id: i64) -> Result<Option<Notification>> {
    conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1",
        params![id],
    )?;
    get_notification(conn, id)
}

pub fn mark_all_read(conn: &Connection, recipient: &Recipient) -> Result<usize> {
    conn.execute(
        r#"
UPDATE notifications SET read = 1
WHERE recipient_class = ?1 AND recipient_key = ?2 AND read = 0
"#,
        params![recipient.class.as_str(), recipient.key_or_empty()],
    )
}

fn notification_from_row(row: &Row<'_>) -> Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        intent_id: row.get(1)?,
        recipient: recipient_from_columns(row, 2, 3)?,
        message: row.get(4)?,
        entity_type: row.get(5)?,
        entity_id: row.get(6)?,
        change_kind: row.get(7)?,
        district: row.get(8)?,
        created_at: row.get(9)?,
        read: row.get(10)?,
    })
}

fn recipient_from_columns(row: &Row<'_>, class_idx: usize, key_idx: usize) -> Result<Recipient> {
    let class: String = row.get(class_idx)?;
    let key: String = row.get(key_idx)?;
    let class = RecipientClass::from_str(&class).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(class_idx, Type::Text, Box::new(err))
    })?;
    Ok(Recipient {
        class,
        key: if key.is_empty() { None } else { Some(key) },
    })
}
