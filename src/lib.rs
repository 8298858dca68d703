// Spesometro - Core Library
// Shared-expense boards: who pays for what, split by category.
// Exposes all modules for use in the TUI, the API server, and tests

pub mod apportion;  // Debit computation engine
pub mod auth;       // Passwords, sessions, roles
pub mod config;     // Environment configuration
pub mod db;         // SQLite persistence + audit trail
pub mod entities;   // Board, Category, Product, Member, User
pub mod error;
pub mod money;      // Minor-unit formatting

#[cfg(feature = "server")]
pub mod api;        // REST API + update stream

// Re-export commonly used types
pub use apportion::{compute_debits, debit_sheet, DebitCache, DebitSheet, MemberDebit, ProductShare};
pub use config::Config;
pub use db::{open_database, setup_database, Event};
pub use entities::{
    Board, Category, Member, NewBoard, NewCategory, NewMember, NewProduct, NewUser, Product, Role,
    User,
};
pub use error::{Error, Result};
pub use money::format_cents;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
