//! Set-valued attributes of a listing version (stored as JSONB).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::FeatureId;

/// A catalog feature (suite, pool, parking spot, ...) with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFeature {
    pub feature_id: FeatureId,
    pub quantity: i32,
}

/// A place the owner would accept in exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangePlace {
    #[serde(default)]
    pub neighborhood: Option<String>,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancingBlocker {
    IrregularDocumentation,
    PendingInventory,
    Lien,
    Usucapiao,
    NoHabiteSe,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuaranteeType {
    Deposit,
    Guarantor,
    SuretyBond,
    CapitalizationBond,
    GuaranteeInsurance,
}

/// Rental guarantee accepted by the owner, ordered by priority (1 = preferred).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guarantee {
    pub guarantee: GuaranteeType,
    pub priority: i16,
}

/// Extra floor of a warehouse beyond the ground floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseFloor {
    pub floor_name: String,
    pub floor_order: i16,
    pub floor_height: Decimal,
}

/// Who may schedule visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "visit_policy", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitPolicy {
    OwnerOnly,
    RealtorOnly,
    OwnerOrRealtor,
}

/// Who accompanies visitors on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "accompanying_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccompanyingType {
    Owner,
    Assistant,
    Tenant,
    Unaccompanied,
}

// =============================================================================
// Normalization
// =============================================================================

/// Removes duplicates keeping first occurrence order.
pub fn dedup_preserving_order<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Duplicate guarantee types collapse to the first entry; the result is
/// ordered by priority.
pub fn normalize_guarantees(guarantees: &[Guarantee]) -> Vec<Guarantee> {
    let mut out: Vec<Guarantee> = Vec::with_capacity(guarantees.len());
    for g in guarantees {
        if !out.iter().any(|o| o.guarantee == g.guarantee) {
            out.push(*g);
        }
    }
    out.sort_by_key(|g| g.priority);
    out
}

/// Priorities of the first duplicated pair, if any.
pub fn duplicated_priority(guarantees: &[Guarantee]) -> Option<i16> {
    let mut seen = std::collections::HashSet::new();
    guarantees
        .iter()
        .map(|g| g.priority)
        .find(|p| !seen.insert(*p))
}
