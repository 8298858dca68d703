// 👥 Member Entity - someone sharing the board's costs

use serde::{Deserialize, Serialize};

use super::product::Product;
use super::{category_ids, check_amount, clean_name, new_entity_id};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,

    /// Amount already paid, in minor currency units
    pub paid: i64,

    /// Category ids the member is subscribed to
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Member {
    pub fn new(form: &NewMember) -> Result<Self> {
        let mut member = Member {
            id: new_entity_id(),
            name: String::new(),
            paid: 0,
            categories: Vec::new(),
        };
        member.apply(form)?;
        Ok(member)
    }

    pub fn apply(&mut self, form: &NewMember) -> Result<()> {
        let name = clean_name(&form.name, "Member")?;
        let paid = check_amount(form.paid, "Paid amount")?;
        let categories = category_ids(&form.categories)?;

        self.name = name;
        self.paid = paid;
        self.categories = categories;
        Ok(())
    }

    pub fn is_subscribed(&self, category_id: &str) -> bool {
        self.categories.iter().any(|c| c == category_id)
    }

    /// A member shares a product's cost when at least one of the
    /// product's categories is among the member's subscriptions
    pub fn is_eligible_for(&self, product: &Product) -> bool {
        self.categories.iter().any(|c| product.has_category(c))
    }

    pub fn toggle_category(&mut self, category_id: &str) -> bool {
        if self.is_subscribed(category_id) {
            self.categories.retain(|c| c != category_id);
            false
        } else {
            self.categories.push(category_id.to_string());
            true
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub paid: i64,
}

impl NewMember {
    pub fn new(name: impl Into<String>, categories: Vec<String>, paid: i64) -> Self {
        NewMember {
            name: name.into(),
            categories,
            paid,
        }
    }
}
