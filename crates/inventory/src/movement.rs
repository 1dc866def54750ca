//! Stock movements: the immutable ledger entries behind every stock change.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mealledger_core::{
    ActorId, DomainError, DomainResult, InventoryItemId, MovementId, ProcurementId, ProductionId,
    TenantId,
};

/// Kind of ledger entry. The kind fixes which sign the quantity may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    In,
    Out,
    Adjustment,
    Transfer,
    Expired,
    Damaged,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
            MovementKind::Adjustment => "ADJUSTMENT",
            MovementKind::Transfer => "TRANSFER",
            MovementKind::Expired => "EXPIRED",
            MovementKind::Damaged => "DAMAGED",
        }
    }

    /// Whether a signed quantity is legal for this kind.
    ///
    /// `IN` only adds, `OUT`/`EXPIRED`/`DAMAGED` only remove, while
    /// `ADJUSTMENT` and `TRANSFER` go either way. Zero is never legal.
    pub fn accepts(self, quantity: Decimal) -> bool {
        if quantity.is_zero() {
            return false;
        }
        match self {
            MovementKind::In => quantity > Decimal::ZERO,
            MovementKind::Out | MovementKind::Expired | MovementKind::Damaged => {
                quantity < Decimal::ZERO
            }
            MovementKind::Adjustment | MovementKind::Transfer => true,
        }
    }

    /// Kinds that remove stock without a counterpart receipt.
    pub fn is_issue(self) -> bool {
        matches!(
            self,
            MovementKind::Out | MovementKind::Expired | MovementKind::Damaged | MovementKind::Transfer
        )
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementKind::In),
            "OUT" => Ok(MovementKind::Out),
            "ADJUSTMENT" => Ok(MovementKind::Adjustment),
            "TRANSFER" => Ok(MovementKind::Transfer),
            "EXPIRED" => Ok(MovementKind::Expired),
            "DAMAGED" => Ok(MovementKind::Damaged),
            other => Err(DomainError::validation(format!("unknown movement kind '{other}'"))),
        }
    }
}

/// Business event a movement originated from.
///
/// A loose back-reference: the ledger stores the `(type, id)` pair and never
/// follows it, so entries stay valid after the originating record is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReference {
    Procurement(ProcurementId),
    ProcurementReversal(ProcurementId),
    Production(ProductionId),
    Adjustment(Uuid),
    Transfer(Uuid),
}

impl MovementReference {
    pub fn reference_type(&self) -> &'static str {
        match self {
            MovementReference::Procurement(_) => "PROCUREMENT",
            MovementReference::ProcurementReversal(_) => "PROCUREMENT_REVERSAL",
            MovementReference::Production(_) => "PRODUCTION",
            MovementReference::Adjustment(_) => "ADJUSTMENT",
            MovementReference::Transfer(_) => "TRANSFER",
        }
    }

    pub fn reference_id(&self) -> Uuid {
        match self {
            MovementReference::Procurement(id) | MovementReference::ProcurementReversal(id) => {
                *id.as_uuid()
            }
            MovementReference::Production(id) => *id.as_uuid(),
            MovementReference::Adjustment(id) | MovementReference::Transfer(id) => *id,
        }
    }

    /// Rebuild a reference from its stored `(type, id)` pair.
    pub fn from_parts(reference_type: &str, reference_id: Uuid) -> DomainResult<Self> {
        match reference_type {
            "PROCUREMENT" => Ok(Self::Procurement(ProcurementId::from_uuid(reference_id))),
            "PROCUREMENT_REVERSAL" => Ok(Self::ProcurementReversal(ProcurementId::from_uuid(
                reference_id,
            ))),
            "PRODUCTION" => Ok(Self::Production(ProductionId::from_uuid(reference_id))),
            "ADJUSTMENT" => Ok(Self::Adjustment(reference_id)),
            "TRANSFER" => Ok(Self::Transfer(reference_id)),
            other => Err(DomainError::validation(format!(
                "unknown movement reference type '{other}'"
            ))),
        }
    }

    /// References that may appear at most once per item.
    ///
    /// A procurement is posted once per item and reversed once per item, and
    /// a production batch consumes each item once. Storage rejects a second
    /// entry carrying the same reference.
    pub fn is_unique_per_item(&self) -> bool {
        matches!(
            self,
            MovementReference::Procurement(_)
                | MovementReference::ProcurementReversal(_)
                | MovementReference::Production(_)
        )
    }
}

impl core::fmt::Display for MovementReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.reference_type(), self.reference_id())
    }
}

/// Immutable ledger entry: one quantity change to one item.
///
/// `quantity` is the signed delta (`stock_after - stock_before`) and
/// `total_cost` is `quantity × unit_cost`, so outbound entries carry a
/// negative total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    /// 1-based position in the item's ledger.
    pub sequence: u64,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub average_cost_before: Decimal,
    pub average_cost_after: Decimal,
    pub reference: Option<MovementReference>,
    pub note: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    /// Check the entry is internally consistent.
    pub fn verify(&self) -> DomainResult<()> {
        if !self.kind.accepts(self.quantity) {
            return Err(DomainError::invariant(format!(
                "movement {}: quantity {} is not valid for kind {}",
                self.id, self.quantity, self.kind
            )));
        }
        if self.stock_after.checked_sub(self.stock_before) != Some(self.quantity) {
            return Err(DomainError::invariant(format!(
                "movement {}: stock_after - stock_before ({} - {}) does not equal quantity {}",
                self.id, self.stock_after, self.stock_before, self.quantity
            )));
        }
        if self.stock_after < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "movement {}: stock_after {} is negative",
                self.id, self.stock_after
            )));
        }
        if self.quantity.checked_mul(self.unit_cost) != Some(self.total_cost) {
            return Err(DomainError::invariant(format!(
                "movement {}: total_cost {} does not equal quantity × unit_cost",
                self.id, self.total_cost
            )));
        }
        Ok(())
    }

    pub fn is_inbound(&self) -> bool {
        self.quantity > Decimal::ZERO
    }
}

/// Verify one item's ledger as returned by storage (ordered by sequence).
///
/// Checks that every entry is consistent, sequences run 1, 2, 3, ... without
/// gaps, and each entry starts where the previous one ended:
/// `stock_after(N) == stock_before(N + 1)`.
pub fn verify_ledger_chain(movements: &[StockMovement]) -> DomainResult<()> {
    let Some(first) = movements.first() else {
        return Ok(());
    };

    if !first.stock_before.is_zero() || !first.average_cost_before.is_zero() {
        return Err(DomainError::invariant(format!(
            "movement {}: ledger must open from zero stock and zero cost",
            first.id
        )));
    }

    let mut previous: Option<&StockMovement> = None;
    for (idx, movement) in movements.iter().enumerate() {
        movement.verify()?;

        if movement.tenant_id != first.tenant_id || movement.item_id != first.item_id {
            return Err(DomainError::invariant(format!(
                "movement {}: ledger mixes items or tenants",
                movement.id
            )));
        }

        let expected_sequence = idx as u64 + 1;
        if movement.sequence != expected_sequence {
            return Err(DomainError::invariant(format!(
                "movement {}: sequence {} found where {} was expected",
                movement.id, movement.sequence, expected_sequence
            )));
        }

        if let Some(prev) = previous {
            if prev.stock_after != movement.stock_before {
                return Err(DomainError::invariant(format!(
                    "movement {}: stock_before {} does not continue from {}",
                    movement.id, movement.stock_before, prev.stock_after
                )));
            }
            if prev.average_cost_after != movement.average_cost_before {
                return Err(DomainError::invariant(format!(
                    "movement {}: average_cost_before {} does not continue from {}",
                    movement.id, movement.average_cost_before, prev.average_cost_after
                )));
            }
        }
        previous = Some(movement);
    }

    Ok(())
}
