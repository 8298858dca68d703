// 🔐 Authentication - password hashes, bearer sessions, admin bootstrap

use crate::db::{self, Session};
use crate::entities::{NewUser, Role, User, ADMIN_USERNAME};
use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const HASH_SCHEME: &str = "sha256";
const HASH_ITERATIONS: u32 = 10_000;

// ============================================================================
// PASSWORD HASHING
// ============================================================================

fn stretch(salt: &str, password: &str, iterations: u32) -> String {
    let mut digest = Sha256::digest(format!("{}{}", salt, password).as_bytes());
    for _ in 1..iterations {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(password.as_bytes());
        digest = hasher.finalize();
    }
    format!("{:x}", digest)
}

/// Hash a password as `sha256$<iterations>$<salt>$<digest>`
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = stretch(&salt, password, HASH_ITERATIONS);
    format!("{}${}${}${}", HASH_SCHEME, HASH_ITERATIONS, salt, digest)
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let &[scheme, iterations, salt, digest] = parts.as_slice() else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }

    constant_time_eq(stretch(salt, password, iterations).as_bytes(), digest.as_bytes())
}

/// Compare without returning early on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

// ============================================================================
// LOGIN & SESSIONS
// ============================================================================

/// Response body of a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginToken {
    pub access_token: String,
    pub token_type: String,
}

/// Check credentials and open a session valid for `ttl_hours`
pub fn login(
    conn: &Connection,
    username: &str,
    password: &str,
    ttl_hours: i64,
) -> Result<LoginToken> {
    if username.is_empty() || password.is_empty() {
        return Err(Error::validation("Cannot insert an empty value!"));
    }

    let username = username.trim().to_lowercase();
    let user = db::get_user_by_username(conn, &username)?
        .ok_or_else(|| Error::Login("User not found!".to_string()))?;

    if !verify_password(password, &user.password_hash) {
        tracing::warn!(username = %username, "rejected login: wrong password");
        return Err(Error::Login("Wrong password!".to_string()));
    }

    let session = Session {
        token: uuid::Uuid::new_v4().simple().to_string(),
        user_id: user.id.clone(),
        expires_at: Utc::now() + Duration::hours(ttl_hours),
    };
    db::insert_session(conn, &session)?;
    tracing::info!(username = %username, "user logged in");

    Ok(LoginToken {
        access_token: session.token,
        token_type: "bearer".to_string(),
    })
}

/// Resolve a bearer token to its user, dropping the session if it expired
pub fn authenticate(conn: &Connection, token: &str) -> Result<Option<User>> {
    let Some(session) = db::get_session(conn, token)? else {
        return Ok(None);
    };

    if session.is_expired(Utc::now()) {
        db::delete_session(conn, token)?;
        return Ok(None);
    }

    match db::get_user(conn, &session.user_id) {
        Ok(user) => Ok(Some(user)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Role gate: `None` caller means anonymous
pub fn require_role(user: Option<&User>, required: Role) -> Result<&User> {
    match user {
        Some(user) if user.role.satisfies(required) => Ok(user),
        _ => Err(Error::Unauthorized),
    }
}

// ============================================================================
// USER MANAGEMENT
// ============================================================================

pub fn create_user(conn: &Connection, form: &NewUser) -> Result<User> {
    let username = form.normalized_username()?;
    if form.password.is_empty() {
        return Err(Error::validation("A password is needed!"));
    }

    let user = User {
        id: uuid::Uuid::new_v4().simple().to_string(),
        username,
        password_hash: hash_password(&form.password),
        role: form.role,
    };
    db::insert_user(conn, &user)?;
    Ok(user)
}

/// Apply a user form; an empty password keeps the current one
///
/// The `admin` account can only change its password.
pub fn edit_user(conn: &Connection, id: &str, form: &NewUser) -> Result<User> {
    let mut user = db::get_user(conn, id)?;

    if user.is_bootstrap_admin() {
        let username = form.username.trim().to_lowercase();
        if username != ADMIN_USERNAME || form.role != Role::Admin {
            return Err(Error::Reserved(ADMIN_USERNAME.to_string()));
        }
    } else {
        user.username = form.normalized_username()?;
        user.role = form.role;
    }

    if !form.password.is_empty() {
        user.password_hash = hash_password(&form.password);
    }

    db::update_user(conn, &user)?;
    Ok(user)
}

pub fn remove_user(conn: &Connection, id: &str) -> Result<()> {
    let user = db::get_user(conn, id)?;
    if user.is_bootstrap_admin() {
        return Err(Error::Reserved(ADMIN_USERNAME.to_string()));
    }
    db::delete_user(conn, id)
}

/// Create the `admin` account when no administrator exists
///
/// Returns the clear-text password so the caller can show it once.
pub fn ensure_admin(conn: &Connection, default_password: Option<&str>) -> Result<Option<String>> {
    if db::count_admins(conn)? > 0 {
        return Ok(None);
    }

    let password = match default_password {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => uuid::Uuid::new_v4().simple().to_string()[..24].to_string(),
    };

    let admin = User {
        id: uuid::Uuid::new_v4().simple().to_string(),
        username: ADMIN_USERNAME.to_string(),
        password_hash: hash_password(&password),
        role: Role::Admin,
    };
    db::insert_user(conn, &admin)?;
    tracing::info!("created '{}' account", ADMIN_USERNAME);

    Ok(Some(password))
}
