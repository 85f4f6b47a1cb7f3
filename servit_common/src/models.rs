//! Canonical domain model for ServIt 360
//!
//! One schema for every consumer; the persistence layer normalizes on read so
//! callers never have to coalesce field-name variants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A purchasable ingredient with declared allergens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    /// Display unit for quantities, e.g. "g", "ml", "pcs"
    pub unit: String,
    /// Allergen tags from a fixed vocabulary; a set, so duplicates collapse
    #[serde(default)]
    pub allergens: BTreeSet<String>,
}

impl Ingredient {
    pub fn new(id: &str, name: &str, unit: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            allergens: BTreeSet::new(),
        }
    }

    pub fn with_allergens(mut self, allergens: &[&str]) -> Self {
        self.allergens = allergens.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// One row of a recipe: an ingredient reference with a quantity
///
/// The reference is weak; the ingredient may have been deleted since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeLine {
    #[serde(rename = "ingredientId")]
    pub ingredient_id: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub unit: String,
}

impl RecipeLine {
    pub fn new(ingredient_id: &str, qty: f64, unit: &str) -> Self {
        Self {
            ingredient_id: ingredient_id.to_string(),
            qty,
            unit: unit.to_string(),
        }
    }
}

/// A recipe: ordered ingredient lines plus prep metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    /// Number of portions produced; malformed values are tolerated downstream
    #[serde(rename = "yield", default = "default_yield")]
    pub yield_qty: f64,
    #[serde(rename = "yieldUnit", default = "default_yield_unit")]
    pub yield_unit: String,
    #[serde(rename = "shelfLifeDays", default)]
    pub shelf_life_days: u32,
    #[serde(default)]
    pub tools: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub lines: Vec<RecipeLine>,
    /// Ids of sub-recipes this dish assembles
    #[serde(default)]
    pub components: Vec<String>,
}

fn default_yield() -> f64 {
    1.0
}

fn default_yield_unit() -> String {
    "portion".to_string()
}

impl Recipe {
    pub fn new(id: &str, name: &str, yield_qty: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            yield_qty,
            yield_unit: default_yield_unit(),
            shelf_life_days: 0,
            tools: String::new(),
            method: String::new(),
            lines: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<RecipeLine>) -> Self {
        self.lines = lines;
        self
    }
}

/// Kind of menu item, open-ended for future stations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItemType {
    Prep,
    Purchased,
    Expo,
    LineStation,
    Other(String),
}

impl MenuItemType {
    pub fn as_str(&self) -> &str {
        match self {
            MenuItemType::Prep => "Prep",
            MenuItemType::Purchased => "Purchased",
            MenuItemType::Expo => "Expo",
            MenuItemType::LineStation => "Line Station",
            MenuItemType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Prep" => MenuItemType::Prep,
            "Purchased" => MenuItemType::Purchased,
            "Expo" => MenuItemType::Expo,
            "Line Station" => MenuItemType::LineStation,
            other => MenuItemType::Other(other.to_string()),
        }
    }
}

impl Serialize for MenuItemType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MenuItemType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(MenuItemType::parse(&s))
    }
}

/// A sellable menu item, optionally linked to a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(rename = "type")]
    pub item_type: MenuItemType,
    /// Enum-like free string: Pantry, Grill, Fryer, Saute, Mozza, ...
    #[serde(default)]
    pub station: String,
    /// Weak reference; may be absent or dangling
    #[serde(rename = "recipeId", default)]
    pub recipe_id: Option<String>,
    /// Gates visibility to culinary/server views
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl MenuItem {
    pub fn new(id: &str, name: &str, item_type: MenuItemType, station: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            brand: String::new(),
            item_type,
            station: station.to_string(),
            recipe_id: None,
            active: true,
        }
    }

    pub fn with_recipe(mut self, recipe_id: &str) -> Self {
        self.recipe_id = Some(recipe_id.to_string());
        self
    }
}

/// One effective-dated price row
///
/// Shared shape for ingredient unit cost and menu-item sell price.
/// `effective_to == None` marks the currently active record; a record is
/// closed exactly once and never reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: i64,
    /// `unit_cost` for ingredients, `sell_price` for menu items
    pub value: f64,
    pub currency: String,
    #[serde(rename = "effectiveFrom")]
    pub effective_from: String,
    #[serde(rename = "effectiveTo")]
    pub effective_to: Option<String>,
    #[serde(rename = "vendorId")]
    pub vendor_id: String,
    #[serde(rename = "locationId")]
    pub location_id: String,
}

impl PriceRecord {
    /// True if this is the open (currently active) record
    pub fn is_open(&self) -> bool {
        self.effective_to.is_none()
    }
}

/// One costed recipe line in a [`ComputedCost`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostLine {
    pub ingredient_id: String,
    /// Falls back to the raw id when the ingredient no longer resolves
    pub ingredient_name: String,
    pub qty: f64,
    pub unit: String,
    pub unit_cost: f64,
    pub ext_cost: f64,
}

/// Output of the cost & allergen resolver; recomputed on demand, never stored
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ComputedCost {
    pub total: f64,
    pub lines: Vec<CostLine>,
    /// Union of line allergens, sorted for stable display
    pub allergens: Vec<String>,
}

/// One punched sale from the server dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: i64,
    #[serde(rename = "menuItemId")]
    pub menu_item_id: String,
    #[serde(rename = "menuItemName")]
    pub menu_item_name: String,
    #[serde(default)]
    pub station: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    pub qty: f64,
    #[serde(rename = "pricePerUnit")]
    pub price_per_unit: f64,
    /// Stored when the client computed it; otherwise derived
    #[serde(rename = "lineTotal")]
    pub line_total: Option<f64>,
    /// Service day as YYYY-MM-DD
    #[serde(rename = "serviceDate")]
    pub service_date: String,
    #[serde(rename = "locationId", default)]
    pub location_id: String,
    #[serde(rename = "table", default)]
    pub table_label: String,
    #[serde(rename = "serverName", default)]
    pub server_name: String,
}

impl SaleRecord {
    /// Line revenue: stored total when present, else price × qty
    pub fn revenue(&self) -> f64 {
        self.line_total
            .unwrap_or_else(|| self.price_per_unit * self.qty)
    }
}
