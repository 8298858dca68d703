// ⚖️ Cost Apportionment Engine - who owes what on a board
//
// Every product's price is split evenly across the members subscribed to at
// least one of the product's categories:
//
//   debit(member) = Σ price(p) / eligible(p)   for every p the member is eligible for
//
// Shares are accumulated as f64 and rounded to whole minor units at the end,
// so rounded debits may drift from the sum of prices by at most one unit per
// product. The engine is a pure function over a board snapshot.

use crate::entities::{sum_amounts, Board, Product};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

// ============================================================================
// PER-PRODUCT SHARES
// ============================================================================

/// How one product's price is split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductShare {
    pub product_id: String,
    pub price: i64,

    /// Members subscribed to at least one of the product's categories
    pub eligible: usize,

    /// Unrounded share charged to each eligible member
    pub share: f64,
}

impl ProductShare {
    pub fn is_unassigned(&self) -> bool {
        self.eligible == 0
    }
}

/// Number of members whose subscriptions intersect the product's categories
pub fn eligible_count(board: &Board, product: &Product) -> usize {
    board
        .members
        .iter()
        .filter(|member| member.is_eligible_for(product))
        .count()
}

/// Divisor used for a product's share, floored at 1 so the share is
/// always finite even when nobody is eligible
fn share_divisor(eligible: usize) -> f64 {
    eligible.max(1) as f64
}

pub fn product_shares(board: &Board) -> Vec<ProductShare> {
    board
        .products
        .iter()
        .map(|product| {
            let eligible = eligible_count(board, product);
            ProductShare {
                product_id: product.id.clone(),
                price: product.price,
                eligible,
                share: product.price as f64 / share_divisor(eligible),
            }
        })
        .collect()
}

// ============================================================================
// DEBITS
// ============================================================================

/// Unrounded debit of every member, in board order
fn raw_debits(board: &Board) -> Vec<f64> {
    let shares = product_shares(board);

    board
        .members
        .iter()
        .map(|member| {
            board
                .products
                .iter()
                .zip(&shares)
                .filter(|(product, _)| member.is_eligible_for(product))
                .map(|(_, share)| share.share)
                .sum()
        })
        .collect()
}

fn round_minor(value: f64) -> i64 {
    value.round() as i64
}

/// Owed amount per member id, in minor units
///
/// Members with no eligible product owe 0; products nobody is eligible
/// for are charged to nobody. A board without members yields an empty map.
pub fn compute_debits(board: &Board) -> BTreeMap<String, i64> {
    board
        .members
        .iter()
        .zip(raw_debits(board))
        .map(|(member, debit)| (member.id.clone(), round_minor(debit)))
        .collect()
}

// ============================================================================
// DEBIT SHEET (members table with paid / debit / balance)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDebit {
    pub member_id: String,
    pub name: String,
    pub paid: i64,
    pub debit: i64,

    /// paid - debit; negative means the member still owes money
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitSheet {
    pub board_id: String,
    pub members: Vec<MemberDebit>,
    pub products: Vec<ProductShare>,
    pub total_price: i64,
    pub total_paid: i64,
    pub total_debit: i64,

    /// Price of products no member is eligible for
    pub unassigned: i64,
}

impl DebitSheet {
    pub fn member(&self, member_id: &str) -> Option<&MemberDebit> {
        self.members.iter().find(|m| m.member_id == member_id)
    }

    /// Rounding drift between charged debits and assigned prices
    pub fn rounding_drift(&self) -> i64 {
        self.total_debit
            .saturating_sub(self.total_price.saturating_sub(self.unassigned))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} members, {} products: total {}, paid {}, charged {}, unassigned {}",
            self.members.len(),
            self.products.len(),
            crate::money::format_cents(self.total_price),
            crate::money::format_cents(self.total_paid),
            crate::money::format_cents(self.total_debit),
            crate::money::format_cents(self.unassigned),
        )
    }
}

/// Build the full members sheet for a board
///
/// Balances are rounded from the unrounded debit, so `paid - debit` can
/// differ from `balance` by one unit.
pub fn debit_sheet(board: &Board) -> DebitSheet {
    let products = product_shares(board);
    let raw = raw_debits(board);

    let members: Vec<MemberDebit> = board
        .members
        .iter()
        .zip(raw)
        .map(|(member, debit)| MemberDebit {
            member_id: member.id.clone(),
            name: member.name.clone(),
            paid: member.paid,
            debit: round_minor(debit),
            balance: round_minor(member.paid as f64 - debit),
        })
        .collect();

    let unassigned = sum_amounts(products.iter().filter(|p| p.is_unassigned()).map(|p| p.price));

    DebitSheet {
        board_id: board.id.clone(),
        total_price: board.total_price(),
        total_paid: board.total_paid(),
        total_debit: sum_amounts(members.iter().map(|m| m.debit)),
        unassigned,
        members,
        products,
    }
}

// ============================================================================
// MEMO CACHE
// ============================================================================

/// Fingerprint of everything the engine reads from a board
///
/// Names are included because the sheet carries member names. The values
/// are hashed as JSON so that no two different boards share an encoding.
pub fn board_fingerprint(board: &Board) -> String {
    let members: Vec<_> = board
        .members
        .iter()
        .map(|m| (&m.id, &m.name, m.paid, &m.categories))
        .collect();
    let products: Vec<_> = board
        .products
        .iter()
        .map(|p| (&p.id, p.price, &p.categories))
        .collect();

    // strings and integers always serialize
    let encoded = serde_json::to_vec(&(members, products)).unwrap_or_default();
    format!("{:x}", Sha256::digest(&encoded))
}

/// Debit sheets memoized per board, recomputed when the board changes
#[derive(Default)]
pub struct DebitCache {
    entries: RwLock<HashMap<String, (String, Arc<DebitSheet>)>>,
}

impl DebitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, board: &Board) -> Arc<DebitSheet> {
        let fingerprint = board_fingerprint(board);

        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some((cached, sheet)) = entries.get(&board.id) {
                if *cached == fingerprint {
                    return Arc::clone(sheet);
                }
            }
        }

        tracing::debug!(board = %board.id, "recomputing debit sheet");
        let sheet = Arc::new(debit_sheet(board));

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(board.id.clone(), (fingerprint, Arc::clone(&sheet)));
        sheet
    }

    /// Forget a board (e.g. after it was deleted)
    pub fn invalidate(&self, board_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(board_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================
