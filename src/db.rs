use crate::entities::{Board, Role, User};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event for audit trail: every change to a board or user is recorded
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

/// Bearer token bound to a user until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Boards (categories / products / members stored as JSON documents)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS boards (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            categories TEXT NOT NULL,
            products TEXT NOT NULL,
            members TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Users & Sessions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
        [],
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
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Row helpers
// ============================================================================

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// Boards
// ============================================================================

const BOARD_COLUMNS: &str = "id, name, categories, products, members";

fn board_from_row(row: &Row) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        name: row.get(1)?,
        categories: json_column(row, 2)?,
        products: json_column(row, 3)?,
        members: json_column(row, 4)?,
    })
}

pub fn insert_board(conn: &Connection, board: &Board) -> Result<()> {
    conn.execute(
        "INSERT INTO boards (id, name, categories, products, members)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            board.id,
            board.name,
            serde_json::to_string(&board.categories)?,
            serde_json::to_string(&board.products)?,
            serde_json::to_string(&board.members)?,
        ],
    )?;
    Ok(())
}

pub fn get_board(conn: &Connection, id: &str) -> Result<Board> {
    conn.query_row(
        &format!("SELECT {} FROM boards WHERE id = ?1", BOARD_COLUMNS),
        [id],
        board_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("Board", id))
}

/// All boards in creation order
pub fn get_all_boards(conn: &Connection) -> Result<Vec<Board>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM boards ORDER BY rowid",
        BOARD_COLUMNS
    ))?;

    let boards = stmt
        .query_map([], board_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(boards)
}

/// Overwrite a stored board with the given snapshot
pub fn save_board(conn: &Connection, board: &Board) -> Result<()> {
    let updated = conn.execute(
        "UPDATE boards SET name = ?2, categories = ?3, products = ?4, members = ?5
         WHERE id = ?1",
        params![
            board.id,
            board.name,
            serde_json::to_string(&board.categories)?,
            serde_json::to_string(&board.products)?,
            serde_json::to_string(&board.members)?,
        ],
    )?;

    if updated == 0 {
        return Err(Error::not_found("Board", board.id.as_str()));
    }
    Ok(())
}

pub fn delete_board(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute("DELETE FROM boards WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(Error::not_found("Board", id));
    }
    Ok(())
}

// ============================================================================
// Users
// ============================================================================

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    let role = Role::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown role: {}", role).into(),
        )
    })?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, user.username, user.password_hash, user.role.as_str()],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            Error::Conflict(format!("Username '{}' already exists", user.username))
        } else {
            e.into()
        }
    })?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> Result<User> {
    conn.query_row(
        "SELECT id, username, password_hash, role FROM users WHERE id = ?1",
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("User", id))
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_all_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password_hash, role FROM users ORDER BY rowid")?;

    let users = stmt
        .query_map([], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(users)
}

pub fn update_user(conn: &Connection, user: &User) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE users SET username = ?2, password_hash = ?3, role = ?4 WHERE id = ?1",
            params![user.id, user.username, user.password_hash, user.role.as_str()],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::Conflict(format!("Username '{}' already exists", user.username))
            } else {
                e.into()
            }
        })?;

    if updated == 0 {
        return Err(Error::not_found("User", user.id.as_str()));
    }
    Ok(())
}

/// Delete a user together with their sessions
pub fn delete_user(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(Error::not_found("User", id));
    }
    conn.execute("DELETE FROM sessions WHERE user_id = ?1", [id])?;
    Ok(())
}

pub fn count_admins(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?1",
        [Role::Admin.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// Sessions
// ============================================================================

pub fn insert_session(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![
            session.token,
            session.user_id,
            session.expires_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, token: &str) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            [token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: time_column(row, 2)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
    Ok(())
}

/// Drop every session that expired before `now`, returns how many were removed
pub fn purge_expired_sessions(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let mut stmt = conn.prepare("SELECT token, expires_at FROM sessions")?;
    let expired: Vec<String> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, time_column(row, 1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|(_, expires_at)| *expires_at <= now)
        .map(|(token, _)| token)
        .collect();

    for token in &expired {
        delete_session(conn, token)?;
    }

    Ok(expired.len())
}

// ============================================================================
// Events
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
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

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok(Event {
                event_id: row.get(0)?,
                timestamp: time_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: json_column(row, 5)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
