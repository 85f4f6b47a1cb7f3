//! Prep label generation
//!
//! Builds dated prep labels for a recipe batch: prep date, expiry from the
//! recipe's shelf life, and the allergen line servers read off the container.

use chrono::{Days, NaiveDate};
use std::collections::BTreeSet;

use servit_common::Recipe;

/// One printable prep label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepLabel {
    pub item_name: String,
    pub prep_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub allergens: Vec<String>,
}

impl PrepLabel {
    /// Expiry is `prep_date + shelf_life_days`; zero shelf life expires same day.
    pub fn new(
        item_name: &str,
        shelf_life_days: u32,
        allergens: &BTreeSet<String>,
        prep_date: NaiveDate,
    ) -> Self {
        let expiry_date = prep_date
            .checked_add_days(Days::new(u64::from(shelf_life_days)))
            .unwrap_or(prep_date);
        Self {
            item_name: item_name.to_string(),
            prep_date,
            expiry_date,
            allergens: allergens.iter().cloned().collect(),
        }
    }

    /// Label for a recipe batch prepped on `prep_date`, allergens resolved
    /// by the caller (usually from a costing pass).
    pub fn for_recipe(
        recipe: &Recipe,
        allergens: &BTreeSet<String>,
        prep_date: NaiveDate,
    ) -> Self {
        Self::new(&recipe.name, recipe.shelf_life_days, allergens, prep_date)
    }

    /// Allergen line as printed; "None" when the batch carries no allergens
    pub fn allergen_line(&self) -> String {
        if self.allergens.is_empty() {
            "None".to_string()
        } else {
            self.allergens.join(", ")
        }
    }

    /// Plain-text label block for the thermal printer
    pub fn render(&self) -> String {
        format!(
            "{}\nPrepped: {}\nUse by:  {}\nAllergens: {}\n",
            self.item_name,
            self.prep_date.format("%Y-%m-%d"),
            self.expiry_date.format("%Y-%m-%d"),
            self.allergen_line()
        )
    }
}

/// Repeat the label `quantity` times, one per container
pub fn render_batch(label: &PrepLabel, quantity: u32) -> String {
    let copies = quantity.max(1);
    let mut out = String::new();
    for i in 0..copies {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&label.render());
    }
    out
}
