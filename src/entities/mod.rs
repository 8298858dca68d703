// Entity Models
//
// A board owns its categories, products and members. Categories are the
// link between products and members: a member subscribed to any category
// a product is tagged with shares the cost of that product.
//
// Each entity has a stable identity (UUID) and plain values that editors
// can change freely.

pub mod board;
pub mod category;
pub mod member;
pub mod product;
pub mod user;

pub use board::{Board, NewBoard};
pub use category::{Category, NewCategory};
pub use member::{Member, NewMember};
pub use product::{NewProduct, Product};
pub use user::{NewUser, Role, User, ADMIN_USERNAME};

use crate::error::{Error, Result};

/// Trim a display name and reject it when nothing is left
pub(crate) fn clean_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{} name is required", what)));
    }
    Ok(trimmed.to_string())
}

/// Largest accepted price or paid amount: ten billion in minor units
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Amounts are integer minor units (cents), never negative and bounded
pub(crate) fn check_amount(value: i64, what: &str) -> Result<i64> {
    if value < 0 {
        return Err(Error::validation(format!("{} cannot be negative", what)));
    }
    if value > MAX_AMOUNT {
        return Err(Error::validation(format!("{} is too large", what)));
    }
    Ok(value)
}

/// Parse category references as UUIDs, dropping duplicates in order
pub(crate) fn category_ids(ids: &[String]) -> Result<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let mut cleaned = Vec::with_capacity(ids.len());

    for id in ids {
        let parsed = uuid::Uuid::parse_str(id.trim())
            .map_err(|_| Error::validation(format!("Invalid category id: {}", id)))?;
        let id = parsed.to_string();
        if seen.insert(id.clone()) {
            cleaned.push(id);
        }
    }

    Ok(cleaned)
}

/// Saturating sum of minor-unit amounts
pub(crate) fn sum_amounts(amounts: impl IntoIterator<Item = i64>) -> i64 {
    amounts.into_iter().fold(0, i64::saturating_add)
}

pub(crate) fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
