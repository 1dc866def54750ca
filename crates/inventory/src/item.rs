use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mealledger_core::{
    ActorId, Aggregate, AggregateRoot, DomainError, DomainResult, InventoryItemId, MovementId,
    TenantId, add_amount, mul_amount,
};

use crate::costing::weighted_average_cost;
use crate::movement::{MovementKind, MovementReference, StockMovement, verify_ledger_chain};

/// Where an item's stock sits relative to its configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    BelowMinimum,
    Normal,
    AboveMaximum,
}

/// Storage shape of an item: the cached projection of its ledger.
///
/// Only storage adapters construct items from a snapshot; every other
/// mutation goes through [`Aggregate::apply`] over ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: InventoryItemId,
    pub tenant_id: TenantId,
    pub name: String,
    pub unit: String,
    pub current_stock: Decimal,
    pub average_cost: Decimal,
    pub last_cost: Option<Decimal>,
    pub min_stock: Decimal,
    pub max_stock: Option<Decimal>,
    pub version: u64,
}

/// Aggregate root: InventoryItem.
///
/// `current_stock`, `average_cost` and `last_cost` are a denormalized
/// projection of the item's ledger. They change only by applying a
/// [`StockMovement`], so replaying the ledger always reproduces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: TenantId,
    name: String,
    unit: String,
    current_stock: Decimal,
    average_cost: Decimal,
    last_cost: Option<Decimal>,
    min_stock: Decimal,
    max_stock: Option<Decimal>,
    version: u64,
}

impl InventoryItem {
    /// Register a new item with zero stock and zero cost.
    pub fn new(
        tenant_id: TenantId,
        id: InventoryItemId,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let unit = unit.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        if unit.trim().is_empty() {
            return Err(DomainError::validation("unit of measure cannot be empty"));
        }

        Ok(Self {
            id,
            tenant_id,
            name,
            unit,
            current_stock: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            last_cost: None,
            min_stock: Decimal::ZERO,
            max_stock: None,
            version: 0,
        })
    }

    /// Set reorder thresholds. Thresholds are metadata, not stock.
    pub fn with_thresholds(
        mut self,
        min_stock: Decimal,
        max_stock: Option<Decimal>,
    ) -> Result<Self, DomainError> {
        if min_stock < Decimal::ZERO {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }
        if let Some(max) = max_stock {
            if max < min_stock {
                return Err(DomainError::validation(
                    "maximum stock cannot be below minimum stock",
                ));
            }
        }
        self.min_stock = min_stock;
        self.max_stock = max_stock;
        Ok(self)
    }

    pub fn from_snapshot(snapshot: ItemSnapshot) -> Self {
        Self {
            id: snapshot.id,
            tenant_id: snapshot.tenant_id,
            name: snapshot.name,
            unit: snapshot.unit,
            current_stock: snapshot.current_stock,
            average_cost: snapshot.average_cost,
            last_cost: snapshot.last_cost,
            min_stock: snapshot.min_stock,
            max_stock: snapshot.max_stock,
            version: snapshot.version,
        }
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name.clone(),
            unit: self.unit.clone(),
            current_stock: self.current_stock,
            average_cost: self.average_cost,
            last_cost: self.last_cost,
            min_stock: self.min_stock,
            max_stock: self.max_stock,
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn average_cost(&self) -> Decimal {
        self.average_cost
    }

    pub fn last_cost(&self) -> Option<Decimal> {
        self.last_cost
    }

    pub fn min_stock(&self) -> Decimal {
        self.min_stock
    }

    pub fn max_stock(&self) -> Option<Decimal> {
        self.max_stock
    }

    /// Stock value at the current average cost.
    pub fn stock_value(&self) -> DomainResult<Decimal> {
        mul_amount(self.current_stock, self.average_cost)
    }

    pub fn stock_level(&self) -> StockLevel {
        if self.current_stock.is_zero() {
            StockLevel::OutOfStock
        } else if self.current_stock < self.min_stock {
            StockLevel::BelowMinimum
        } else if self.max_stock.is_some_and(|max| self.current_stock > max) {
            StockLevel::AboveMaximum
        } else {
            StockLevel::Normal
        }
    }

    /// Rebuild the stock projection by replaying a ledger over this item's
    /// identity and thresholds. The cached figures of `self` are ignored.
    pub fn replay(&self, movements: &[StockMovement]) -> Result<Self, DomainError> {
        verify_ledger_chain(movements)?;

        let mut rebuilt = self.clone();
        rebuilt.current_stock = Decimal::ZERO;
        rebuilt.average_cost = Decimal::ZERO;
        rebuilt.last_cost = None;
        rebuilt.version = 0;

        for movement in movements {
            if movement.tenant_id != self.tenant_id || movement.item_id != self.id {
                return Err(DomainError::invariant(format!(
                    "movement {} does not belong to item {}",
                    movement.id, self.id
                )));
            }
            rebuilt.apply(movement);
        }
        Ok(rebuilt)
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Metadata every ledger-producing command carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementContext {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub reference: Option<MovementReference>,
    pub note: Option<String>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock. Blends the receipt price into the average cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub context: MovementContext,
    /// `In` for supplier receipts, `Transfer` for stock arriving from
    /// another location.
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Command: IssueStock. Removes stock valued at the current average cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub context: MovementContext,
    /// One of `Out`, `Expired`, `Damaged` or `Transfer`.
    pub kind: MovementKind,
    /// Positive magnitude; the ledger entry carries it negated.
    pub quantity: Decimal,
}

/// Command: AdjustStock. Signed count correction valued at average cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub context: MovementContext,
    pub delta: Decimal,
}

/// Command: ReverseReceipt. Compensates an earlier inbound entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseReceipt {
    pub context: MovementContext,
    pub original: StockMovement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Receive(ReceiveStock),
    Issue(IssueStock),
    Adjust(AdjustStock),
    Reverse(ReverseReceipt),
}

impl StockCommand {
    pub fn context(&self) -> &MovementContext {
        match self {
            StockCommand::Receive(cmd) => &cmd.context,
            StockCommand::Issue(cmd) => &cmd.context,
            StockCommand::Adjust(cmd) => &cmd.context,
            StockCommand::Reverse(cmd) => &cmd.context,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = StockCommand;
    type Event = StockMovement;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.current_stock = event.stock_after;
        self.average_cost = event.average_cost_after;
        if event.kind == MovementKind::In {
            self.last_cost = Some(event.unit_cost);
        }

        // One ledger entry, one version.
        self.version = event.sequence;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_scope(command.context())?;
        match command {
            StockCommand::Receive(cmd) => self.handle_receive(cmd),
            StockCommand::Issue(cmd) => self.handle_issue(cmd),
            StockCommand::Adjust(cmd) => self.handle_adjust(cmd),
            StockCommand::Reverse(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_scope(&self, ctx: &MovementContext) -> Result<(), DomainError> {
        if ctx.tenant_id != self.tenant_id {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if ctx.item_id != self.id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn entry(
        &self,
        ctx: &MovementContext,
        kind: MovementKind,
        quantity: Decimal,
        unit_cost: Decimal,
        average_cost_after: Decimal,
    ) -> Result<StockMovement, DomainError> {
        let stock_after = add_amount(self.current_stock, quantity)?;
        if stock_after < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(self.current_stock, -quantity));
        }

        let movement = StockMovement {
            id: ctx.movement_id,
            tenant_id: self.tenant_id,
            item_id: self.id,
            sequence: self.version + 1,
            kind,
            quantity,
            unit_cost,
            total_cost: mul_amount(quantity, unit_cost)?,
            stock_before: self.current_stock,
            stock_after,
            average_cost_before: self.average_cost,
            average_cost_after,
            reference: ctx.reference,
            note: ctx.note.clone(),
            actor: ctx.actor,
            occurred_at: ctx.occurred_at,
        };
        movement.verify()?;
        Ok(movement)
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StockMovement>, DomainError> {
        if !matches!(cmd.kind, MovementKind::In | MovementKind::Transfer) {
            return Err(DomainError::validation(format!(
                "{} cannot be used to receive stock",
                cmd.kind
            )));
        }
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        if cmd.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let new_average = weighted_average_cost(
            self.current_stock,
            self.average_cost,
            cmd.quantity,
            cmd.unit_cost,
        )?;

        Ok(vec![self.entry(
            &cmd.context,
            cmd.kind,
            cmd.quantity,
            cmd.unit_cost,
            new_average,
        )?])
    }

    fn handle_issue(&self, cmd: &IssueStock) -> Result<Vec<StockMovement>, DomainError> {
        if !cmd.kind.is_issue() {
            return Err(DomainError::validation(format!(
                "{} cannot be used to issue stock",
                cmd.kind
            )));
        }
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("issued quantity must be positive"));
        }
        if cmd.quantity > self.current_stock {
            return Err(DomainError::insufficient_stock(self.current_stock, cmd.quantity));
        }

        Ok(vec![self.entry(
            &cmd.context,
            cmd.kind,
            -cmd.quantity,
            self.average_cost,
            self.average_cost,
        )?])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockMovement>, DomainError> {
        if cmd.delta.is_zero() {
            return Err(DomainError::validation("adjustment delta cannot be zero"));
        }

        Ok(vec![self.entry(
            &cmd.context,
            MovementKind::Adjustment,
            cmd.delta,
            self.average_cost,
            self.average_cost,
        )?])
    }

    /// Reversal copies the original unit cost and leaves the average cost
    /// untouched: the average reflects receipts in the order they happened.
    fn handle_reverse(&self, cmd: &ReverseReceipt) -> Result<Vec<StockMovement>, DomainError> {
        let original = &cmd.original;
        if original.tenant_id != self.tenant_id || original.item_id != self.id {
            return Err(DomainError::invariant(
                "reversed movement belongs to a different item",
            ));
        }
        if !original.is_inbound() {
            return Err(DomainError::validation(format!(
                "movement {} is not a receipt and cannot be reversed",
                original.id
            )));
        }
        if self.current_stock < original.quantity {
            return Err(DomainError::insufficient_stock(
                self.current_stock,
                original.quantity,
            ));
        }

        Ok(vec![self.entry(
            &cmd.context,
            MovementKind::Out,
            -original.quantity,
            original.unit_cost,
            self.average_cost,
        )?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealledger_core::ProcurementId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_item() -> InventoryItem {
        InventoryItem::new(TenantId::new(), InventoryItemId::new(), "Beras", "kg").unwrap()
    }

    fn ctx(item: &InventoryItem, reference: Option<MovementReference>) -> MovementContext {
        MovementContext {
            tenant_id: item.tenant_id(),
            item_id: item.id_typed(),
            movement_id: MovementId::new(),
            reference,
            note: None,
            actor: ActorId::new(),
            occurred_at: Utc::now(),
        }
    }

    fn receive(item: &mut InventoryItem, quantity: Decimal, unit_cost: Decimal) -> StockMovement {
        let cmd = StockCommand::Receive(ReceiveStock {
            context: ctx(item, Some(MovementReference::Procurement(ProcurementId::new()))),
            kind: MovementKind::In,
            quantity,
            unit_cost,
        });
        let mut events = item.handle(&cmd).unwrap();
        let movement = events.remove(0);
        item.apply(&movement);
        movement
    }

    #[test]
    fn new_item_requires_name_and_unit() {
        assert!(InventoryItem::new(TenantId::new(), InventoryItemId::new(), " ", "kg").is_err());
        assert!(InventoryItem::new(TenantId::new(), InventoryItemId::new(), "Telur", "").is_err());
    }

    #[test]
    fn oversized_receipt_is_rejected_without_panicking() {
        let item = test_item();
        let cmd = StockCommand::Receive(ReceiveStock {
            context: ctx(&item, None),
            kind: MovementKind::In,
            quantity: dec!(1000000000000000),
            unit_cost: dec!(100000000000000),
        });
        let err = item.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("out of range")));
        assert_eq!(item.version(), 0);
    }

    #[test]
    fn two_receipts_blend_average_cost() {
        let mut item = test_item();

        let first = receive(&mut item, dec!(100), dec!(10000));
        assert_eq!(item.current_stock(), dec!(100));
        assert_eq!(item.average_cost(), dec!(10000));
        assert_eq!(first.stock_before, dec!(0));
        assert_eq!(first.stock_after, dec!(100));
        assert_eq!(first.total_cost, dec!(1000000));

        let second = receive(&mut item, dec!(50), dec!(16000));
        assert_eq!(item.current_stock(), dec!(150));
        assert_eq!(item.average_cost(), dec!(12000));
        assert_eq!(item.last_cost(), Some(dec!(16000)));
        assert_eq!(second.sequence, 2);
        assert_eq!(second.stock_before, first.stock_after);
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn reversal_restores_stock_but_keeps_average_cost() {
        let mut item = test_item();
        receive(&mut item, dec!(100), dec!(10000));
        let second = receive(&mut item, dec!(50), dec!(16000));

        let cmd = StockCommand::Reverse(ReverseReceipt {
            context: ctx(&item, Some(MovementReference::ProcurementReversal(ProcurementId::new()))),
            original: second.clone(),
        });
        let events = item.handle(&cmd).unwrap();
        let reversal = &events[0];
        assert_eq!(reversal.kind, MovementKind::Out);
        assert_eq!(reversal.quantity, dec!(-50));
        assert_eq!(reversal.unit_cost, dec!(16000));
        assert_eq!(reversal.total_cost, -second.total_cost);

        item.apply(reversal);
        assert_eq!(item.current_stock(), dec!(100));
        assert_eq!(item.average_cost(), dec!(12000));
        assert_eq!(item.last_cost(), Some(dec!(16000)));
    }

    #[test]
    fn reversal_cannot_drive_stock_negative() {
        let mut item = test_item();
        let receipt = receive(&mut item, dec!(20), dec!(5000));

        let issue = StockCommand::Issue(IssueStock {
            context: ctx(&item, None),
            kind: MovementKind::Out,
            quantity: dec!(15),
        });
        let events = item.handle(&issue).unwrap();
        item.apply(&events[0]);

        let cmd = StockCommand::Reverse(ReverseReceipt {
            context: ctx(&item, None),
            original: receipt,
        });
        match item.handle(&cmd).unwrap_err() {
            DomainError::InsufficientStock {
                available,
                required,
            } => {
                assert_eq!(available, dec!(5));
                assert_eq!(required, dec!(20));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
    }

    #[test]
    fn issue_is_valued_at_average_cost() {
        let mut item = test_item();
        receive(&mut item, dec!(10), dec!(100));
        receive(&mut item, dec!(10), dec!(200));

        let cmd = StockCommand::Issue(IssueStock {
            context: ctx(&item, None),
            kind: MovementKind::Damaged,
            quantity: dec!(4),
        });
        let events = item.handle(&cmd).unwrap();
        assert_eq!(events[0].quantity, dec!(-4));
        assert_eq!(events[0].unit_cost, dec!(150));
        assert_eq!(events[0].total_cost, dec!(-600));
    }

    #[test]
    fn issue_rejects_receipt_kinds_and_overdraw() {
        let mut item = test_item();
        receive(&mut item, dec!(3), dec!(100));

        let wrong_kind = StockCommand::Issue(IssueStock {
            context: ctx(&item, None),
            kind: MovementKind::In,
            quantity: dec!(1),
        });
        assert!(matches!(item.handle(&wrong_kind), Err(DomainError::Validation(_))));

        let overdraw = StockCommand::Issue(IssueStock {
            context: ctx(&item, None),
            kind: MovementKind::Out,
            quantity: dec!(4),
        });
        assert!(matches!(
            item.handle(&overdraw),
            Err(DomainError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn negative_adjustment_is_bounded_by_stock() {
        let mut item = test_item();
        receive(&mut item, dec!(2), dec!(100));

        let cmd = StockCommand::Adjust(AdjustStock {
            context: ctx(&item, None),
            delta: dec!(-3),
        });
        assert!(matches!(
            item.handle(&cmd),
            Err(DomainError::InsufficientStock { .. })
        ));

        let cmd = StockCommand::Adjust(AdjustStock {
            context: ctx(&item, None),
            delta: dec!(-2),
        });
        let events = item.handle(&cmd).unwrap();
        item.apply(&events[0]);
        assert_eq!(item.current_stock(), dec!(0));
        assert_eq!(item.stock_level(), StockLevel::OutOfStock);
    }

    #[test]
    fn commands_for_other_tenants_are_rejected() {
        let item = test_item();
        let mut context = ctx(&item, None);
        context.tenant_id = TenantId::new();
        let cmd = StockCommand::Adjust(AdjustStock {
            context,
            delta: dec!(1),
        });
        assert!(matches!(item.handle(&cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn stock_level_follows_thresholds() {
        let mut item = test_item()
            .with_thresholds(dec!(10), Some(dec!(50)))
            .unwrap();
        receive(&mut item, dec!(5), dec!(1));
        assert_eq!(item.stock_level(), StockLevel::BelowMinimum);
        receive(&mut item, dec!(10), dec!(1));
        assert_eq!(item.stock_level(), StockLevel::Normal);
        receive(&mut item, dec!(40), dec!(1));
        assert_eq!(item.stock_level(), StockLevel::AboveMaximum);

        assert!(test_item().with_thresholds(dec!(5), Some(dec!(1))).is_err());
    }

    #[test]
    fn replay_reproduces_cached_projection() {
        let mut item = test_item();
        let movements = vec![
            receive(&mut item, dec!(100), dec!(10000)),
            receive(&mut item, dec!(50), dec!(16000)),
        ];

        let replayed = test_item_like(&item).replay(&movements).unwrap();
        assert_eq!(replayed, item);
    }

    fn test_item_like(item: &InventoryItem) -> InventoryItem {
        InventoryItem::new(item.tenant_id(), item.id_typed(), item.name(), item.unit()).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of receipts the cached stock equals
        /// the sum of the ledger's signed quantities and the chain holds.
        #[test]
        fn cached_stock_matches_ledger_sum(
            receipts in prop::collection::vec((1u32..10_000u32, 0u32..50_000u32), 1..20)
        ) {
            let mut item = test_item();
            let mut ledger = Vec::new();

            for (quantity, price) in receipts {
                ledger.push(receive(&mut item, Decimal::from(quantity), Decimal::from(price)));
            }

            let sum: Decimal = ledger.iter().map(|m| m.quantity).sum();
            prop_assert_eq!(item.current_stock(), sum);
            prop_assert!(verify_ledger_chain(&ledger).is_ok());
            prop_assert!(item.average_cost() >= Decimal::ZERO);
        }
    }
}
