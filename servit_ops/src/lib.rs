//! ServIt 360 operations core
//!
//! Corporate staff manage ingredients, recipes, and menu items; culinary staff
//! browse specs and print prep labels; servers punch sales. This crate holds
//! the domain logic behind those surfaces: the effective-dated price store,
//! the cost & allergen resolver, the integrity scan, and sales roll-ups,
//! all persisted in SQLite.

pub mod costing;
pub mod database;
pub mod integrity;
pub mod labels;
pub mod prefs;
pub mod pricing;
pub mod sales;

pub use costing::{compute_cost_and_allergens, cost_per_portion, scale_cost, ScaleFactor};
pub use database::init_schema;
pub use pricing::{add_price, current_price, PriceBook, PriceDimensions};
pub use servit_common::{Result, ServitError};
