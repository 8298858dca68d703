// 🔑 User Entity - accounts allowed to read or edit boards

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Username that always belongs to the bootstrap administrator
pub const ADMIN_USERNAME: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages users and everything else
    Admin,

    /// Creates and edits boards
    Editor,

    /// Read-only access
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Guest => "guest",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            "guest" => Some(Role::Guest),
            _ => None,
        }
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, Role::Admin | Role::Editor)
    }

    /// Role gate: does a caller holding `self` pass a `required` check?
    ///
    /// Admin passes everything, editor passes editor and guest checks,
    /// guest only passes guest checks.
    pub fn satisfies(&self, required: Role) -> bool {
        match required {
            Role::Guest => true,
            Role::Editor => self.can_edit(),
            Role::Admin => *self == Role::Admin,
        }
    }
}

/// Stored user. The password hash never leaves the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn is_bootstrap_admin(&self) -> bool {
        self.username == ADMIN_USERNAME
    }
}

/// Form used to create or edit a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        NewUser {
            username: username.into(),
            password: password.into(),
            role,
        }
    }

    /// Lower-cased username, rejecting empty and reserved names
    pub fn normalized_username(&self) -> Result<String> {
        let username = self.username.trim().to_lowercase();
        if username.is_empty() {
            return Err(Error::validation("Username is required"));
        }
        if username == ADMIN_USERNAME {
            return Err(Error::Reserved(ADMIN_USERNAME.to_string()));
        }
        Ok(username)
    }
}
