use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mealledger_core::{
    DomainError, InventoryItemId, ProcurementId, TenantId, add_amount, div_amount, mul_amount,
    round_cost,
};

/// Procurement status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcurementStatus {
    Draft,
    Submitted,
    Approved,
    Ordered,
    PartiallyReceived,
    Received,
    Completed,
    Cancelled,
}

impl ProcurementStatus {
    /// Statuses meaning goods are physically on site.
    pub const RECEIVABLE: [ProcurementStatus; 3] = [
        ProcurementStatus::PartiallyReceived,
        ProcurementStatus::Received,
        ProcurementStatus::Completed,
    ];

    pub fn is_receivable(self) -> bool {
        Self::RECEIVABLE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcurementStatus::Draft => "DRAFT",
            ProcurementStatus::Submitted => "SUBMITTED",
            ProcurementStatus::Approved => "APPROVED",
            ProcurementStatus::Ordered => "ORDERED",
            ProcurementStatus::PartiallyReceived => "PARTIALLY_RECEIVED",
            ProcurementStatus::Received => "RECEIVED",
            ProcurementStatus::Completed => "COMPLETED",
            ProcurementStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn can_transition_to(self, next: ProcurementStatus) -> bool {
        use ProcurementStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Approved)
                | (Approved, Ordered)
                | (Ordered, PartiallyReceived)
                | (Ordered, Received)
                | (PartiallyReceived, Received)
                | (Received, Completed)
        ) || (next == Cancelled && !matches!(self, Completed | Cancelled))
    }
}

impl core::fmt::Display for ProcurementStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Procurement line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementLine {
    pub line_no: u32,
    pub description: String,
    /// Link to the stock-keeping unit this line feeds. Lines without a link
    /// cannot be posted.
    pub inventory_item_id: Option<InventoryItemId>,
    pub received_quantity: Decimal,
    pub unit_price: Decimal,
    pub is_accepted: bool,
}

impl ProcurementLine {
    /// Received something and the delivery was not rejected.
    pub fn is_eligible(&self) -> bool {
        self.received_quantity > Decimal::ZERO && self.is_accepted
    }
}

/// Why a receipt's lines cannot be posted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostingError {
    #[error("{} eligible line(s) have no inventory link", .0.len())]
    Unlinked(Vec<UnlinkedLine>),

    #[error(transparent)]
    Amount(#[from] DomainError),
}

/// An eligible line that carries no inventory link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkedLine {
    pub line_no: u32,
    pub description: String,
}

impl core::fmt::Display for UnlinkedLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "line {} ({})", self.line_no, self.description)
    }
}

/// What one item receives from a procurement.
///
/// Lines for the same item are merged: quantities are summed and the unit
/// price is the quantity-weighted average of the merged lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingLine {
    pub item_id: InventoryItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_nos: Vec<u32>,
}

/// A procurement order and its delivered lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementReceipt {
    pub id: ProcurementId,
    pub tenant_id: TenantId,
    pub status: ProcurementStatus,
    pub supplier_name: String,
    pub actual_delivery_date: Option<DateTime<Utc>>,
    pub line_items: Vec<ProcurementLine>,
}

impl ProcurementReceipt {
    pub fn eligible_lines(&self) -> impl Iterator<Item = &ProcurementLine> {
        self.line_items.iter().filter(|line| line.is_eligible())
    }

    /// Lines that block posting. Empty means the receipt may be posted.
    pub fn unlinked_lines(&self) -> Vec<UnlinkedLine> {
        self.eligible_lines()
            .filter(|line| line.inventory_item_id.is_none())
            .map(|line| UnlinkedLine {
                line_no: line.line_no,
                description: line.description.clone(),
            })
            .collect()
    }

    /// Group eligible lines per item, in first-seen order.
    ///
    /// Fails closed: if any eligible line is unlinked the whole receipt is
    /// rejected and every offending line is returned. Quantities or values
    /// too large to add up are rejected as well.
    pub fn posting_lines(&self) -> Result<Vec<PostingLine>, PostingError> {
        let unlinked = self.unlinked_lines();
        if !unlinked.is_empty() {
            return Err(PostingError::Unlinked(unlinked));
        }

        let mut postings: Vec<PostingLine> = Vec::new();
        let mut values: Vec<Decimal> = Vec::new();

        for line in self.eligible_lines() {
            let Some(item_id) = line.inventory_item_id else {
                continue;
            };
            let value = mul_amount(line.received_quantity, line.unit_price)?;

            match postings.iter().position(|p| p.item_id == item_id) {
                Some(idx) => {
                    let posting = &mut postings[idx];
                    posting.quantity = add_amount(posting.quantity, line.received_quantity)?;
                    posting.line_nos.push(line.line_no);
                    values[idx] = add_amount(values[idx], value)?;
                    posting.unit_price = round_cost(div_amount(values[idx], posting.quantity)?);
                }
                None => {
                    postings.push(PostingLine {
                        item_id,
                        quantity: line.received_quantity,
                        unit_price: line.unit_price,
                        line_nos: vec![line.line_no],
                    });
                    values.push(value);
                }
            }
        }

        Ok(postings)
    }

    /// Move the procurement along its lifecycle.
    pub fn transition(&mut self, next: ProcurementStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invariant(format!(
                "procurement {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Cancel the procurement. Returns whether stock had already been
    /// received, in which case its movements must be reversed.
    pub fn cancel(&mut self) -> Result<bool, DomainError> {
        let had_receipts = self.status.is_receivable();
        self.transition(ProcurementStatus::Cancelled)?;
        Ok(had_receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(
        line_no: u32,
        item: Option<InventoryItemId>,
        quantity: Decimal,
        price: Decimal,
        accepted: bool,
    ) -> ProcurementLine {
        ProcurementLine {
            line_no,
            description: format!("line {line_no}"),
            inventory_item_id: item,
            received_quantity: quantity,
            unit_price: price,
            is_accepted: accepted,
        }
    }

    fn receipt(status: ProcurementStatus, lines: Vec<ProcurementLine>) -> ProcurementReceipt {
        ProcurementReceipt {
            id: ProcurementId::new(),
            tenant_id: TenantId::new(),
            status,
            supplier_name: "CV Sumber Pangan".to_string(),
            actual_delivery_date: Some(Utc::now()),
            line_items: lines,
        }
    }

    #[test]
    fn receivable_set_is_closed() {
        assert!(ProcurementStatus::Received.is_receivable());
        assert!(ProcurementStatus::PartiallyReceived.is_receivable());
        assert!(ProcurementStatus::Completed.is_receivable());
        assert!(!ProcurementStatus::Approved.is_receivable());
        assert!(!ProcurementStatus::Cancelled.is_receivable());
    }

    #[test]
    fn rejected_and_empty_lines_are_not_eligible() {
        let item = InventoryItemId::new();
        let r = receipt(
            ProcurementStatus::Received,
            vec![
                line(1, Some(item), dec!(10), dec!(100), true),
                line(2, Some(item), dec!(5), dec!(100), false),
                line(3, None, dec!(0), dec!(100), true),
            ],
        );
        let eligible: Vec<u32> = r.eligible_lines().map(|l| l.line_no).collect();
        assert_eq!(eligible, vec![1]);
    }

    #[test]
    fn unlinked_eligible_lines_block_the_whole_receipt() {
        let r = receipt(
            ProcurementStatus::Received,
            vec![
                line(1, Some(InventoryItemId::new()), dec!(10), dec!(100), true),
                line(2, None, dec!(3), dec!(50), true),
                line(3, None, dec!(4), dec!(50), true),
                // Unlinked but rejected: does not block.
                line(4, None, dec!(4), dec!(50), false),
            ],
        );
        let PostingError::Unlinked(unlinked) = r.posting_lines().unwrap_err() else {
            panic!("expected unlinked lines");
        };
        let numbers: Vec<u32> = unlinked.iter().map(|l| l.line_no).collect();
        assert_eq!(numbers, vec![2, 3]);
        assert_eq!(unlinked[0].to_string(), "line 2 (line 2)");
    }

    #[test]
    fn lines_for_one_item_merge_with_weighted_price() {
        let rice = InventoryItemId::new();
        let eggs = InventoryItemId::new();
        let r = receipt(
            ProcurementStatus::Received,
            vec![
                line(1, Some(rice), dec!(100), dec!(10000), true),
                line(2, Some(eggs), dec!(30), dec!(2000), true),
                line(3, Some(rice), dec!(50), dec!(16000), true),
            ],
        );
        let postings = r.posting_lines().unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].item_id, rice);
        assert_eq!(postings[0].quantity, dec!(150));
        assert_eq!(postings[0].unit_price, dec!(12000));
        assert_eq!(postings[0].line_nos, vec![1, 3]);
        assert_eq!(postings[1].unit_price, dec!(2000));
    }

    #[test]
    fn oversized_line_value_is_an_error() {
        let r = receipt(
            ProcurementStatus::Received,
            vec![line(
                1,
                Some(InventoryItemId::new()),
                dec!(1000000000000000),
                dec!(100000000000000),
                true,
            )],
        );
        let err = r.posting_lines().unwrap_err();
        assert!(matches!(err, PostingError::Amount(DomainError::Validation(_))));
    }

    #[test]
    fn cancel_reports_whether_stock_was_received() {
        let mut ordered = receipt(ProcurementStatus::Ordered, vec![]);
        assert!(!ordered.cancel().unwrap());

        let mut received = receipt(ProcurementStatus::Received, vec![]);
        assert!(received.cancel().unwrap());
        assert_eq!(received.status, ProcurementStatus::Cancelled);

        let err = received.cancel().unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn lifecycle_rejects_skipping_to_received() {
        let mut r = receipt(ProcurementStatus::Draft, vec![]);
        assert!(r.transition(ProcurementStatus::Received).is_err());
        r.transition(ProcurementStatus::Submitted).unwrap();
        r.transition(ProcurementStatus::Approved).unwrap();
        r.transition(ProcurementStatus::Ordered).unwrap();
        r.transition(ProcurementStatus::Received).unwrap();
        assert!(r.status.is_receivable());
    }

    proptest! {
        /// Property: merging never loses or invents quantity.
        #[test]
        fn merged_quantity_equals_eligible_quantity(
            lines in prop::collection::vec((0usize..3, 0u32..500, 1u32..20_000, any::<bool>()), 0..12)
        ) {
            let items = [InventoryItemId::new(), InventoryItemId::new(), InventoryItemId::new()];
            let lines: Vec<ProcurementLine> = lines
                .into_iter()
                .enumerate()
                .map(|(idx, (item, qty, price, accepted))| {
                    line(idx as u32 + 1, Some(items[item]), Decimal::from(qty), Decimal::from(price), accepted)
                })
                .collect();
            let r = receipt(ProcurementStatus::Received, lines);

            let eligible: Decimal = r.eligible_lines().map(|l| l.received_quantity).sum();
            let postings = r.posting_lines().unwrap();
            let posted: Decimal = postings.iter().map(|p| p.quantity).sum();
            prop_assert_eq!(eligible, posted);
            prop_assert!(postings.len() <= 3);
        }
    }
}
