use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mealledger_core::{
    DomainError, DomainResult, InventoryItemId, MenuId, TenantId, add_amount, div_amount,
    mul_amount,
};

const PER_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Menu ingredient. Quantities are defined per 100 units of serving size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuIngredient {
    pub item_id: InventoryItemId,
    pub base_quantity_per_100: Decimal,
    pub unit: String,
}

impl MenuIngredient {
    /// `base_quantity_per_100 × serving_size / 100`.
    pub fn quantity_per_portion(&self, serving_size: Decimal) -> DomainResult<Decimal> {
        div_amount(mul_amount(self.base_quantity_per_100, serving_size)?, PER_HUNDRED)
    }
}

/// How much of one item a number of portions needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub item_id: InventoryItemId,
    pub unit: String,
    pub quantity_per_portion: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub tenant_id: TenantId,
    pub name: String,
    pub serving_size: Decimal,
    pub ingredients: Vec<MenuIngredient>,
}

impl Menu {
    /// Scaled ingredient quantities for `portion_count` portions.
    ///
    /// This is the only place menu quantities are scaled by serving size;
    /// every consumer of menu quantities goes through it.
    pub fn requirements(&self, portion_count: u32) -> DomainResult<Vec<IngredientRequirement>> {
        if self.serving_size <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "menu {} has no positive serving size",
                self.id
            )));
        }

        let portions = Decimal::from(portion_count);
        let mut requirements: Vec<IngredientRequirement> = Vec::new();

        for ingredient in &self.ingredients {
            if ingredient.base_quantity_per_100 < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "menu {}: ingredient {} has a negative quantity",
                    self.id, ingredient.item_id
                )));
            }
            let per_portion = ingredient.quantity_per_portion(self.serving_size)?;
            let quantity = mul_amount(per_portion, portions)?;

            match requirements
                .iter_mut()
                .find(|r| r.item_id == ingredient.item_id)
            {
                Some(existing) => {
                    existing.quantity_per_portion =
                        add_amount(existing.quantity_per_portion, per_portion)?;
                    existing.quantity = add_amount(existing.quantity, quantity)?;
                }
                None => requirements.push(IngredientRequirement {
                    item_id: ingredient.item_id,
                    unit: ingredient.unit.clone(),
                    quantity_per_portion: per_portion,
                    quantity,
                }),
            }
        }

        Ok(requirements)
    }
}
