use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::entities::{CostCategory, HandlingKind, ProductKind};
use crate::error::StoreResult;

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Open the primary (read-write) store and make sure the schema exists.
pub fn open_primary(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    // WAL for crash recovery; in-memory databases ignore it
    conn.pragma_update(None, "journal_mode", "WAL")?;
    setup_database(&conn)?;
    info!(path = %path.display(), "Opened primary store");
    Ok(conn)
}

/// Open the limit store. The connection cannot write.
pub fn open_limit_read_only(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    info!(path = %path.display(), "Opened limit store (read-only)");
    Ok(conn)
}

/// Open the limit store, or an empty in-memory one when the file is absent.
/// Rows then carry no limits instead of failing.
pub fn open_limit_or_empty(path: &Path) -> StoreResult<Connection> {
    if path.exists() {
        return open_limit_read_only(path);
    }

    warn!(path = %path.display(), "Limit store not found, limits will be empty");
    let conn = Connection::open_in_memory()?;
    setup_limit_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Every foreign key is ON DELETE RESTRICT: referenced rows are protected
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Reference tables
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS product (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS handlinst (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            value INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS vendor (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS currency (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS cost_type (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS change_type (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        );",
    )?;

    // ==========================================================================
    // Client hierarchy
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS client (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS client_classifier (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id INTEGER NOT NULL REFERENCES client(id) ON DELETE RESTRICT,
            identifier TEXT NOT NULL,
            view TEXT NOT NULL,
            code TEXT NOT NULL,
            UNIQUE (identifier, view),
            UNIQUE (identifier, code),
            UNIQUE (view, code)
        );
        CREATE TABLE IF NOT EXISTS code_session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            classifier_id INTEGER NOT NULL REFERENCES client_classifier(id) ON DELETE RESTRICT,
            session_id INTEGER NOT NULL REFERENCES session(id) ON DELETE RESTRICT,
            connection_start_date TEXT,
            connection_end_date TEXT,
            UNIQUE (classifier_id, session_id)
        );
        CREATE TABLE IF NOT EXISTS trade_type (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code_session_id INTEGER NOT NULL REFERENCES code_session(id) ON DELETE RESTRICT,
            product_id INTEGER NOT NULL REFERENCES product(id) ON DELETE RESTRICT,
            handlinst_id INTEGER NOT NULL REFERENCES handlinst(id) ON DELETE RESTRICT,
            UNIQUE (code_session_id, product_id, handlinst_id)
        );
        CREATE TABLE IF NOT EXISTS cost (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code_session_id INTEGER NOT NULL REFERENCES code_session(id) ON DELETE RESTRICT,
            vendor_id INTEGER NOT NULL REFERENCES vendor(id) ON DELETE RESTRICT,
            cost_type_id INTEGER NOT NULL REFERENCES cost_type(id) ON DELETE RESTRICT,
            change_type_id INTEGER NOT NULL REFERENCES change_type(id) ON DELETE RESTRICT,
            product_id INTEGER REFERENCES product(id) ON DELETE RESTRICT,
            handlinst_id INTEGER REFERENCES handlinst(id) ON DELETE RESTRICT,
            currency_id INTEGER REFERENCES currency(id) ON DELETE RESTRICT,
            change REAL,
            UNIQUE (code_session_id, cost_type_id, product_id, handlinst_id)
        );",
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_client_name ON client(name);
        CREATE INDEX IF NOT EXISTS idx_classifier_identifier ON client_classifier(identifier);
        CREATE INDEX IF NOT EXISTS idx_classifier_client ON client_classifier(client_id);
        CREATE INDEX IF NOT EXISTS idx_trade_type_code_session ON trade_type(code_session_id);
        CREATE INDEX IF NOT EXISTS idx_cost_code_session ON cost(code_session_id);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

/// Insert the fixed products, handling instructions and cost types.
/// Safe to run repeatedly.
pub fn seed_reference_data(conn: &Connection) -> StoreResult<usize> {
    let mut inserted = 0;

    for product in ProductKind::ALL {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO product (name) VALUES (?1)",
            params![product.name()],
        )?;
    }

    for handling in HandlingKind::ALL {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO handlinst (name, value) VALUES (?1, ?2)",
            params![handling.name(), handling.fix_value()],
        )?;
    }

    for category in CostCategory::ALL {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO cost_type (name) VALUES (?1)",
            params![category.name()],
        )?;
    }

    debug!(inserted, "Seeded reference data");
    Ok(inserted)
}

/// Create the limit store's tables.
///
/// The limit store is owned by the risk system; this exists for local
/// development databases and tests.
pub fn setup_limit_database(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS client_info (
            client_id TEXT NOT NULL,
            view TEXT NOT NULL,
            code TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS client_trade (
            client_id TEXT NOT NULL,
            is_disc INTEGER NOT NULL DEFAULT 0,
            is_dma INTEGER NOT NULL DEFAULT 0,
            is_dsa INTEGER NOT NULL DEFAULT 0,
            is_fu_disc INTEGER NOT NULL DEFAULT 0,
            is_fu_dma INTEGER NOT NULL DEFAULT 0,
            is_fu_dsa INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS client_limit (
            client_id TEXT NOT NULL,
            product TEXT NOT NULL,
            handlinst TEXT NOT NULL,
            limit_type TEXT NOT NULL,
            amount REAL NOT NULL
        );
        CREATE TABLE IF NOT EXISTS client_view (
            client_id TEXT NOT NULL,
            product TEXT NOT NULL,
            handlinst TEXT NOT NULL,
            limit_type TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT,
            updated_at TEXT
        );",
    )?;
    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn count_rows(conn: &Connection, table: &str) -> StoreResult<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(count)
}
