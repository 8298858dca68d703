// 🏷️ Category Entity - the tag linking products to the members paying for them

use serde::{Deserialize, Serialize};

use super::{clean_name, new_entity_id};
use crate::error::Result;

/// Category Entity
///
/// Identity: UUID (never changes)
/// Value: display name (editors can rename it)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Category {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Category {
            id: new_entity_id(),
            name: clean_name(name, "Category")?,
        })
    }

    pub fn apply(&mut self, form: &NewCategory) -> Result<()> {
        self.name = clean_name(&form.name, "Category")?;
        Ok(())
    }
}

/// Form used to add or rename a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        NewCategory { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_creation() {
        let category = Category::new("Food").unwrap();

        assert!(!category.id.is_empty());
        assert_eq!(category.name, "Food");
    }

    #[test]
    fn test_category_ids_are_unique() {
        let a = Category::new("Food").unwrap();
        let b = Category::new("Food").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_category_rename_keeps_identity() {
        let mut category = Category::new("Food").unwrap();
        let id = category.id.clone();

        category.apply(&NewCategory::new("Groceries")).unwrap();

        assert_eq!(category.id, id);
        assert_eq!(category.name, "Groceries");
    }

    #[test]
    fn test_category_empty_name_rejected() {
        assert!(Category::new("  ").is_err());

        let mut category = Category::new("Food").unwrap();
        assert!(category.apply(&NewCategory::new("")).is_err());
        assert_eq!(category.name, "Food");
    }
}
