//! Sales insights and theoretical food cost
//!
//! Aggregates punched sales over a date range and costs them against the
//! live recipe prices: total revenue, COGS, food-cost percentage against the
//! HQ target, per-date and per-location breakdowns, top sellers, and average
//! check per table.

use chrono::{Datelike, Days, NaiveDate};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::costing::cost_per_portion;
use crate::database::{get_recipe, ingredient_map, list_menu_items, sales_in_range};
use crate::Result;

/// HQ target food cost percentage
pub const TARGET_FOOD_COST_PCT: f64 = 50.0;

/// Inclusive service-date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn custom(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn today(today: NaiveDate) -> Self {
        Self { start: today, end: today }
    }

    pub fn yesterday(today: NaiveDate) -> Self {
        let d = today.pred_opt().unwrap_or(today);
        Self { start: d, end: d }
    }

    /// Monday through today
    pub fn this_week(today: NaiveDate) -> Self {
        let back = today.weekday().num_days_from_monday() as u64;
        let start = today.checked_sub_days(Days::new(back)).unwrap_or(today);
        Self { start, end: today }
    }

    /// The full Monday-to-Sunday week before this one
    pub fn last_week(today: NaiveDate) -> Self {
        let back = today.weekday().num_days_from_monday() as u64;
        let end = today
            .checked_sub_days(Days::new(back + 1))
            .unwrap_or(today);
        let start = end.checked_sub_days(Days::new(6)).unwrap_or(end);
        Self { start, end }
    }

    /// First of the month through today
    pub fn this_month(today: NaiveDate) -> Self {
        let start =
            NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
        Self { start, end: today }
    }

    /// Parse a preset name, anchored at `today`
    pub fn preset(name: &str, today: NaiveDate) -> Option<Self> {
        match name {
            "today" => Some(Self::today(today)),
            "yesterday" => Some(Self::yesterday(today)),
            "this-week" => Some(Self::this_week(today)),
            "last-week" => Some(Self::last_week(today)),
            "this-month" => Some(Self::this_month(today)),
            _ => None,
        }
    }
}

/// Revenue/COGS roll-up bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesBucket {
    pub key: String,
    pub sales: f64,
    pub items: f64,
    pub cogs: f64,
}

/// Top-seller row
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSales {
    pub menu_item_id: String,
    pub name: String,
    pub station: String,
    pub qty: f64,
    pub sales: f64,
    pub cogs: f64,
}

/// Full sales insight summary for one range/location filter
#[derive(Debug, Clone, Default)]
pub struct SalesSummary {
    pub total_sales: f64,
    pub total_items: f64,
    pub total_cogs: f64,
    /// COGS as a percentage of sales; 0 when there are no sales
    pub food_cost_pct: f64,
    /// food_cost_pct minus the HQ target
    pub variance_pct: f64,
    pub by_date: Vec<SalesBucket>,
    pub by_location: Vec<SalesBucket>,
    /// Top 10 items by revenue
    pub top_items: Vec<ItemSales>,
    pub tables_count: usize,
    pub avg_check: f64,
}

/// Theoretical cost per sold unit of each active menu item
///
/// Cost comes from the linked recipe's cost per portion; items with no link,
/// a dangling link, or an uncostable recipe cost zero (best-effort costing).
pub fn menu_item_unit_costs(conn: &Connection) -> Result<HashMap<String, f64>> {
    let ingredients = ingredient_map(conn)?;
    let mut recipe_costs: HashMap<String, f64> = HashMap::new();
    let mut out = HashMap::new();

    for item in list_menu_items(conn, true)? {
        let cost = match item.recipe_id.as_deref() {
            Some(rid) => match recipe_costs.get(rid).copied() {
                Some(cached) => cached,
                None => {
                    let cost = match get_recipe(conn, rid)? {
                        Some(recipe) => cost_per_portion(conn, &recipe, &ingredients)?,
                        None => 0.0,
                    };
                    recipe_costs.insert(rid.to_string(), cost);
                    cost
                }
            },
            None => 0.0,
        };
        out.insert(item.id, cost);
    }
    Ok(out)
}

/// Aggregate sales for a range, optionally one location
pub fn sales_summary(
    conn: &Connection,
    range: DateRange,
    location: Option<&str>,
) -> Result<SalesSummary> {
    let from = range.start.format("%Y-%m-%d").to_string();
    let to = range.end.format("%Y-%m-%d").to_string();
    let sales = sales_in_range(conn, &from, &to, location)?;
    log::info!(
        "Loaded {} sale(s) for {}..{} ({})",
        sales.len(),
        from,
        to,
        location.unwrap_or("all locations")
    );
    if sales.is_empty() {
        return Ok(SalesSummary::default());
    }

    let unit_costs = menu_item_unit_costs(conn)?;

    let mut summary = SalesSummary::default();
    let mut by_date: BTreeMap<String, SalesBucket> = BTreeMap::new();
    let mut by_location: BTreeMap<String, SalesBucket> = BTreeMap::new();
    let mut by_item: HashMap<String, ItemSales> = HashMap::new();
    let mut tables: HashSet<String> = HashSet::new();

    for sale in &sales {
        let revenue = sale.revenue();
        let unit_cost = unit_costs.get(&sale.menu_item_id).copied().unwrap_or(0.0);
        let cogs = unit_cost * sale.qty;

        summary.total_sales += revenue;
        summary.total_items += sale.qty;
        summary.total_cogs += cogs;

        let date_bucket = by_date
            .entry(sale.service_date.clone())
            .or_insert_with(|| SalesBucket {
                key: sale.service_date.clone(),
                ..Default::default()
            });
        date_bucket.sales += revenue;
        date_bucket.items += sale.qty;
        date_bucket.cogs += cogs;

        let loc = if sale.location_id.is_empty() {
            "Unknown".to_string()
        } else {
            sale.location_id.clone()
        };
        let loc_bucket = by_location.entry(loc.clone()).or_insert_with(|| SalesBucket {
            key: loc,
            ..Default::default()
        });
        loc_bucket.sales += revenue;
        loc_bucket.items += sale.qty;
        loc_bucket.cogs += cogs;

        let item = by_item
            .entry(sale.menu_item_id.clone())
            .or_insert_with(|| ItemSales {
                menu_item_id: sale.menu_item_id.clone(),
                name: if sale.menu_item_name.is_empty() {
                    sale.menu_item_id.clone()
                } else {
                    sale.menu_item_name.clone()
                },
                station: sale.station.clone(),
                qty: 0.0,
                sales: 0.0,
                cogs: 0.0,
            });
        item.qty += sale.qty;
        item.sales += revenue;
        item.cogs += cogs;

        // Walk-in sales without a table label stay out of the table count,
        // so they never dilute the average check.
        if !sale.table_label.is_empty() {
            tables.insert(format!("{}|{}", sale.service_date, sale.table_label));
        }
    }

    summary.food_cost_pct = if summary.total_sales > 0.0 {
        summary.total_cogs / summary.total_sales * 100.0
    } else {
        0.0
    };
    summary.variance_pct = summary.food_cost_pct - TARGET_FOOD_COST_PCT;
    summary.by_date = by_date.into_values().collect();
    summary.by_location = by_location.into_values().collect();

    let mut top: Vec<ItemSales> = by_item.into_values().collect();
    top.sort_by(|a, b| b.sales.partial_cmp(&a.sales).unwrap_or(std::cmp::Ordering::Equal));
    top.truncate(10);
    summary.top_items = top;

    summary.tables_count = tables.len();
    summary.avg_check = if summary.tables_count > 0 {
        summary.total_sales / summary.tables_count as f64
    } else {
        0.0
    };

    Ok(summary)
}
