// 📋 Board Entity - one expense-splitting scenario
//
// The board is the aggregate: categories, products and members are only
// ever edited through it, so removing a category can strip the id from
// every product and member in the same step.

use serde::{Deserialize, Serialize};

use super::category::{Category, NewCategory};
use super::clean_name;
use super::member::{Member, NewMember};
use super::product::{NewProduct, Product};
use super::sum_amounts;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Board {
    /// Create an empty board
    pub fn new(form: &NewBoard) -> Result<Self> {
        Ok(Board {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: clean_name(&form.name, "Board")?,
            categories: Vec::new(),
            products: Vec::new(),
            members: Vec::new(),
        })
    }

    pub fn rename(&mut self, form: &NewBoard) -> Result<()> {
        self.name = clean_name(&form.name, "Board")?;
        Ok(())
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Sum of every product price, in minor units (saturating)
    pub fn total_price(&self) -> i64 {
        sum_amounts(self.products.iter().map(|p| p.price))
    }

    pub fn total_paid(&self) -> i64 {
        sum_amounts(self.members.iter().map(|m| m.paid))
    }

    // ========================================================================
    // CATEGORIES
    // ========================================================================

    pub fn add_category(&mut self, form: &NewCategory) -> Result<String> {
        let category = Category::new(&form.name)?;
        let id = category.id.clone();
        self.categories.push(category);
        Ok(id)
    }

    pub fn edit_category(&mut self, id: &str, form: &NewCategory) -> Result<String> {
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("Category", id))?;
        category.apply(form)?;
        Ok(id.to_string())
    }

    /// Remove a category and every reference to it
    pub fn remove_category(&mut self, id: &str) -> Result<String> {
        let before = self.categories.len();
        self.categories.retain(|c| c.id != id);
        if self.categories.len() == before {
            return Err(Error::not_found("Category", id));
        }

        for product in &mut self.products {
            product.categories.retain(|c| c != id);
        }
        for member in &mut self.members {
            member.categories.retain(|c| c != id);
        }

        Ok(id.to_string())
    }

    // ========================================================================
    // PRODUCTS
    // ========================================================================

    pub fn add_product(&mut self, form: &NewProduct) -> Result<String> {
        let product = Product::new(form)?;
        let id = product.id.clone();
        self.products.push(product);
        Ok(id)
    }

    pub fn edit_product(&mut self, id: &str, form: &NewProduct) -> Result<String> {
        let product = self
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found("Product", id))?;
        product.apply(form)?;
        Ok(id.to_string())
    }

    pub fn remove_product(&mut self, id: &str) -> Result<String> {
        let before = self.products.len();
        self.products.retain(|p| p.id != id);
        if self.products.len() == before {
            return Err(Error::not_found("Product", id));
        }
        Ok(id.to_string())
    }

    pub fn toggle_product_category(&mut self, product_id: &str, category_id: &str) -> Result<bool> {
        if self.category(category_id).is_none() {
            return Err(Error::not_found("Category", category_id));
        }
        let product = self
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| Error::not_found("Product", product_id))?;
        Ok(product.toggle_category(category_id))
    }

    // ========================================================================
    // MEMBERS
    // ========================================================================

    pub fn add_member(&mut self, form: &NewMember) -> Result<String> {
        let member = Member::new(form)?;
        let id = member.id.clone();
        self.members.push(member);
        Ok(id)
    }

    pub fn edit_member(&mut self, id: &str, form: &NewMember) -> Result<String> {
        let member = self
            .members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::not_found("Member", id))?;
        member.apply(form)?;
        Ok(id.to_string())
    }

    pub fn remove_member(&mut self, id: &str) -> Result<String> {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        if self.members.len() == before {
            return Err(Error::not_found("Member", id));
        }
        Ok(id.to_string())
    }

    pub fn toggle_member_category(&mut self, member_id: &str, category_id: &str) -> Result<bool> {
        if self.category(category_id).is_none() {
            return Err(Error::not_found("Category", category_id));
        }
        let member = self
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| Error::not_found("Member", member_id))?;
        Ok(member.toggle_category(category_id))
    }
}

/// Form used to create or rename a board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBoard {
    pub name: String,
}

impl NewBoard {
    pub fn new(name: impl Into<String>) -> Self {
        NewBoard { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_board() -> (Board, String, String) {
        let mut board = Board::new(&NewBoard::new("Trip")).unwrap();
        let food = board.add_category(&NewCategory::new("Food")).unwrap();
        let drink = board.add_category(&NewCategory::new("Drink")).unwrap();
        board
            .add_member(&NewMember::new("Alice", vec![food.clone()], 0))
            .unwrap();
        board
            .add_member(&NewMember::new("Bob", vec![food.clone(), drink.clone()], 0))
            .unwrap();
        board
            .add_product(&NewProduct::new("Pizza", 1200, vec![food.clone()]))
            .unwrap();
        board
            .add_product(&NewProduct::new("Wine", 900, vec![drink.clone()]))
            .unwrap();
        (board, food, drink)
    }

    #[test]
    fn test_board_creation() {
        let board = Board::new(&NewBoard::new("Flat")).unwrap();

        assert_eq!(board.id.len(), 32);
        assert_eq!(board.name, "Flat");
        assert!(board.categories.is_empty());
        assert!(board.products.is_empty());
        assert!(board.members.is_empty());
    }

    #[test]
    fn test_board_empty_name_rejected() {
        assert!(Board::new(&NewBoard::new("")).is_err());
    }

    #[test]
    fn test_board_totals() {
        let (board, _, _) = sample_board();
        assert_eq!(board.total_price(), 2100);
        assert_eq!(board.total_paid(), 0);
    }

    #[test]
    fn test_board_totals_saturate() {
        let (mut board, _, _) = sample_board();
        // stored rows bypass form validation
        board.products[0].price = i64::MAX;
        board.members[0].paid = i64::MAX;
        board.members[1].paid = 1;

        assert_eq!(board.total_price(), i64::MAX);
        assert_eq!(board.total_paid(), i64::MAX);
    }

    #[test]
    fn test_board_rejects_unparseable_category_reference() {
        let (mut board, _, _) = sample_board();
        let result = board.add_product(&NewProduct::new("Bread", 250, vec!["food".into()]));

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(board.products.len(), 2);
    }

    #[test]
    fn test_remove_category_cascades() {
        let (mut board, food, drink) = sample_board();

        board.remove_category(&drink).unwrap();

        assert_eq!(board.categories.len(), 1);
        assert!(board.products.iter().all(|p| !p.has_category(&drink)));
        assert!(board.members.iter().all(|m| !m.is_subscribed(&drink)));
        // untouched references survive
        assert!(board.members.iter().all(|m| m.is_subscribed(&food)));
    }

    #[test]
    fn test_remove_unknown_category_is_not_found() {
        let (mut board, _, _) = sample_board();
        let result = board.remove_category("missing");
        assert!(matches!(result, Err(Error::NotFound { kind: "Category", .. })));
    }

    #[test]
    fn test_edit_member() {
        let (mut board, food, _) = sample_board();
        let alice = board.members[0].id.clone();

        board
            .edit_member(&alice, &NewMember::new("Alice B.", vec![food], 450))
            .unwrap();

        let member = board.member(&alice).unwrap();
        assert_eq!(member.name, "Alice B.");
        assert_eq!(member.paid, 450);
    }

    #[test]
    fn test_edit_unknown_product_is_not_found() {
        let (mut board, _, _) = sample_board();
        let result = board.edit_product("nope", &NewProduct::new("X", 1, vec![]));
        assert!(matches!(result, Err(Error::NotFound { kind: "Product", .. })));
    }

    #[test]
    fn test_remove_member_and_product() {
        let (mut board, _, _) = sample_board();
        let bob = board.members[1].id.clone();
        let wine = board.products[1].id.clone();

        board.remove_member(&bob).unwrap();
        board.remove_product(&wine).unwrap();

        assert_eq!(board.members.len(), 1);
        assert_eq!(board.products.len(), 1);
        assert!(board.remove_member(&bob).is_err());
    }

    #[test]
    fn test_toggle_member_category() {
        let (mut board, _, drink) = sample_board();
        let alice = board.members[0].id.clone();

        assert!(board.toggle_member_category(&alice, &drink).unwrap());
        assert!(board.member(&alice).unwrap().is_subscribed(&drink));
        assert!(!board.toggle_member_category(&alice, &drink).unwrap());
    }

    #[test]
    fn test_toggle_requires_known_category() {
        let (mut board, _, _) = sample_board();
        let pizza = board.products[0].id.clone();
        assert!(board.toggle_product_category(&pizza, "unknown").is_err());
    }

    #[test]
    fn test_board_json_shape() {
        let (board, _, _) = sample_board();
        let value = serde_json::to_value(&board).unwrap();

        assert!(value["categories"].is_array());
        assert_eq!(value["products"][0]["price"], 1200);
        assert_eq!(value["members"][0]["paid"], 0);
    }
}
