// 🛒 Product Entity - something bought for the board, tagged with categories

use serde::{Deserialize, Serialize};

use super::{category_ids, check_amount, clean_name, new_entity_id};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stable identity (UUID)
    pub id: String,

    pub name: String,

    /// Price in minor currency units (cents)
    pub price: i64,

    /// Category ids this product is tagged with
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Product {
    pub fn new(form: &NewProduct) -> Result<Self> {
        let mut product = Product {
            id: new_entity_id(),
            name: String::new(),
            price: 0,
            categories: Vec::new(),
        };
        product.apply(form)?;
        Ok(product)
    }

    /// Replace every value with the form's, keeping the identity
    pub fn apply(&mut self, form: &NewProduct) -> Result<()> {
        let name = clean_name(&form.name, "Product")?;
        let price = check_amount(form.price, "Price")?;
        let categories = category_ids(&form.categories)?;

        self.name = name;
        self.price = price;
        self.categories = categories;
        Ok(())
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.categories.iter().any(|c| c == category_id)
    }

    /// Tag or untag a category, returns whether the product is now tagged
    pub fn toggle_category(&mut self, category_id: &str) -> bool {
        if self.has_category(category_id) {
            self.categories.retain(|c| c != category_id);
            false
        } else {
            self.categories.push(category_id.to_string());
            true
        }
    }
}

/// Form used to add or edit a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: i64, categories: Vec<String>) -> Self {
        NewProduct {
            name: name.into(),
            price,
            categories,
        }
    }
}
