//! Shared types for ServIt 360 restaurant operations
//!
//! Domain models (ingredients, recipes, menu items, price records) and the
//! unified error type used by the operations crates.

pub mod error;
pub mod models;

pub use error::{Result, ServitError};
pub use models::{
    ComputedCost, CostLine, Ingredient, MenuItem, MenuItemType, PriceRecord, Recipe, RecipeLine,
    SaleRecord,
};
