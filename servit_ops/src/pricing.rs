//! Effective-dated price store
//!
//! Each ingredient and menu item owns a history of price rows with validity
//! intervals. At most one row per entity (and optional vendor/location scope)
//! is open (`effective_to IS NULL`) at a time; adding a price closes every
//! open row and opens a new one inside a single transaction, so the invariant
//! holds even when two writers race: SQLite serializes the write transactions
//! and the later one's close step sees the earlier one's commit.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use servit_common::{PriceRecord, ServitError};

use crate::Result;

/// Which price history a call operates on
///
/// Both books share the row shape; only the table and value column differ.
/// The column names `unit_cost` and `sell_price` are part of the stored
/// contract and must stay stable for external read-only scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBook {
    /// Ingredient purchase cost per unit
    IngredientCost,
    /// Menu item sell price per portion
    MenuSellPrice,
}

impl PriceBook {
    fn table(self) -> &'static str {
        match self {
            PriceBook::IngredientCost => "ingredient_prices",
            PriceBook::MenuSellPrice => "menu_item_prices",
        }
    }

    fn entity_column(self) -> &'static str {
        match self {
            PriceBook::IngredientCost => "ingredient_id",
            PriceBook::MenuSellPrice => "menu_item_id",
        }
    }

    fn value_column(self) -> &'static str {
        match self {
            PriceBook::IngredientCost => "unit_cost",
            PriceBook::MenuSellPrice => "sell_price",
        }
    }
}

/// Optional vendor/location scope for a price row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceDimensions {
    pub vendor_id: String,
    pub location_id: String,
}

impl Default for PriceDimensions {
    fn default() -> Self {
        Self {
            vendor_id: "default".to_string(),
            location_id: "default".to_string(),
        }
    }
}

impl PriceDimensions {
    pub fn new(vendor_id: &str, location_id: &str) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            location_id: location_id.to_string(),
        }
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PriceRecord> {
    Ok(PriceRecord {
        id: row.get(0)?,
        value: row.get(1)?,
        currency: row.get(2)?,
        vendor_id: row.get(3)?,
        location_id: row.get(4)?,
        effective_from: row.get(5)?,
        effective_to: row.get(6)?,
    })
}

/// Add a price, closing any open row first
///
/// The close-then-open sequence runs as one transaction: every open row in
/// scope gets `effective_to = now`, then one new row opens with
/// `effective_from = now`. All-or-nothing; a failed call leaves the history
/// untouched and is safe to retry. When `dims` is given, only open rows with
/// the same vendor/location are closed and the new row carries those
/// dimensions; otherwise all open rows for the entity are closed.
///
/// Returns the new row id. `value` must be a finite, non-negative number.
pub fn add_price(
    conn: &mut Connection,
    book: PriceBook,
    entity_id: &str,
    value: f64,
    dims: Option<&PriceDimensions>,
) -> Result<i64> {
    if !value.is_finite() || value < 0.0 {
        return Err(ServitError::InvalidPrice(format!(
            "{value} is not a finite non-negative number"
        )));
    }

    let now = Utc::now().to_rfc3339();
    let write_dims = dims.cloned().unwrap_or_default();
    let table = book.table();
    let entity_col = book.entity_column();
    let value_col = book.value_column();

    let tx = conn.transaction()?;
    let closed = match dims {
        Some(d) => tx.execute(
            &format!(
                "UPDATE {table} SET effective_to = ?1
                 WHERE {entity_col} = ?2 AND effective_to IS NULL
                   AND vendor_id = ?3 AND location_id = ?4"
            ),
            params![&now, entity_id, &d.vendor_id, &d.location_id],
        )?,
        None => tx.execute(
            &format!(
                "UPDATE {table} SET effective_to = ?1
                 WHERE {entity_col} = ?2 AND effective_to IS NULL"
            ),
            params![&now, entity_id],
        )?,
    };
    tx.execute(
        &format!(
            "INSERT INTO {table}
             ({entity_col}, {value_col}, currency, vendor_id, location_id, effective_from, effective_to)
             VALUES (?1, ?2, 'CAD', ?3, ?4, ?5, NULL)"
        ),
        params![entity_id, value, &write_dims.vendor_id, &write_dims.location_id, &now],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    log::info!(
        "Added {} price {} for {} (closed {} previous row(s))",
        value_col,
        value,
        entity_id,
        closed
    );
    Ok(id)
}

/// All price rows for an entity, newest first
pub fn price_history(
    conn: &Connection,
    book: PriceBook,
    entity_id: &str,
) -> Result<Vec<PriceRecord>> {
    let mut records = load_records(conn, book, entity_id, None)?;
    records.sort_by_key(|r| std::cmp::Reverse((effective_from_ts(r), r.id)));
    Ok(records)
}

/// The price to use right now
///
/// Returns the open row if one exists. Histories where every row has been
/// closed (a data gap the resolver must tolerate) fall back to the row with
/// the newest `effective_from`; rows with absent or unparseable timestamps
/// sort below every well-formed row. Returns `None` only when the entity has
/// no price rows at all.
pub fn current_price(
    conn: &Connection,
    book: PriceBook,
    entity_id: &str,
    dims: Option<&PriceDimensions>,
) -> Result<Option<PriceRecord>> {
    let records = load_records(conn, book, entity_id, dims)?;
    if records.is_empty() {
        return Ok(None);
    }

    if let Some(open) = records.iter().filter(|r| r.is_open()).max_by_key(|r| {
        (effective_from_ts(r), r.id)
    }) {
        return Ok(Some(open.clone()));
    }

    Ok(records
        .into_iter()
        .max_by_key(|r| (effective_from_ts(r), r.id)))
}

fn load_records(
    conn: &Connection,
    book: PriceBook,
    entity_id: &str,
    dims: Option<&PriceDimensions>,
) -> Result<Vec<PriceRecord>> {
    let table = book.table();
    let entity_col = book.entity_column();
    let value_col = book.value_column();

    let rows = match dims {
        Some(d) => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, {value_col}, currency, vendor_id, location_id, effective_from, effective_to
                 FROM {table}
                 WHERE {entity_col} = ?1 AND vendor_id = ?2 AND location_id = ?3"
            ))?;
            let rows = stmt
                .query_map(params![entity_id, &d.vendor_id, &d.location_id], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, {value_col}, currency, vendor_id, location_id, effective_from, effective_to
                 FROM {table}
                 WHERE {entity_col} = ?1"
            ))?;
            let rows = stmt
                .query_map(params![entity_id], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(rows)
}

/// Comparable timestamp for a row's `effective_from`
///
/// Unparseable or empty timestamps compare lowest, so well-formed rows always
/// outrank malformed ones during the fallback tie-break.
fn effective_from_ts(record: &PriceRecord) -> i64 {
    DateTime::parse_from_rfc3339(&record.effective_from)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(i64::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_db;

    fn open_count(conn: &Connection, entity: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM ingredient_prices
             WHERE ingredient_id = ?1 AND effective_to IS NULL",
            params![entity],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn first_add_opens_one_record() {
        let mut conn = test_db();
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.002, None).unwrap();

        assert_eq!(open_count(&conn, "flour"), 1);
        let current = current_price(&conn, PriceBook::IngredientCost, "flour", None)
            .unwrap()
            .unwrap();
        assert_eq!(current.value, 0.002);
        assert!(current.is_open());
    }

    #[test]
    fn sequential_adds_keep_exactly_one_open_record() {
        let mut conn = test_db();
        for value in [0.002, 0.003, 0.004, 0.0035, 0.005] {
            add_price(&mut conn, PriceBook::IngredientCost, "flour", value, None).unwrap();
            assert_eq!(open_count(&conn, "flour"), 1);
        }

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ingredient_prices WHERE ingredient_id = 'flour'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total, 5);
        let current = current_price(&conn, PriceBook::IngredientCost, "flour", None)
            .unwrap()
            .unwrap();
        assert_eq!(current.value, 0.005);
    }

    #[test]
    fn current_record_has_max_effective_from() {
        let mut conn = test_db();
        for value in [1.0, 2.0, 3.0] {
            add_price(&mut conn, PriceBook::IngredientCost, "butter", value, None).unwrap();
        }
        let history = price_history(&conn, PriceBook::IngredientCost, "butter").unwrap();
        let current = current_price(&conn, PriceBook::IngredientCost, "butter", None)
            .unwrap()
            .unwrap();
        for rec in &history {
            assert!(
                current.effective_from >= rec.effective_from,
                "current row must have the newest effective_from"
            );
        }
    }

    #[test]
    fn add_price_closes_previous_open_record() {
        let mut conn = test_db();
        let first = add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.003, None).unwrap();
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.004, None).unwrap();

        let history = price_history(&conn, PriceBook::IngredientCost, "flour").unwrap();
        let old = history.iter().find(|r| r.id == first).unwrap();
        assert!(old.effective_to.is_some(), "previous row must be closed");
        let current = current_price(&conn, PriceBook::IngredientCost, "flour", None)
            .unwrap()
            .unwrap();
        assert_eq!(current.value, 0.004);
    }

    #[test]
    fn rejects_non_finite_and_negative_values() {
        let mut conn = test_db();
        for bad in [f64::NAN, f64::INFINITY, -0.5] {
            let err = add_price(&mut conn, PriceBook::IngredientCost, "flour", bad, None);
            assert!(matches!(err, Err(ServitError::InvalidPrice(_))));
        }
        // Zero is allowed.
        add_price(&mut conn, PriceBook::IngredientCost, "water", 0.0, None).unwrap();
    }

    #[test]
    fn current_price_none_when_no_records() {
        let conn = test_db();
        let res = current_price(&conn, PriceBook::IngredientCost, "ghost", None).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn fallback_picks_newest_when_no_open_record() {
        let conn = test_db();
        // Corrupt history: every row closed. The store must still answer.
        for (from, to, value) in [
            ("2026-01-01T00:00:00+00:00", "2026-02-01T00:00:00+00:00", 1.0),
            ("2026-02-01T00:00:00+00:00", "2026-03-01T00:00:00+00:00", 2.0),
            ("2026-03-01T00:00:00+00:00", "2026-04-01T00:00:00+00:00", 3.0),
        ] {
            conn.execute(
                "INSERT INTO ingredient_prices
                 (ingredient_id, unit_cost, currency, effective_from, effective_to)
                 VALUES ('flour', ?1, 'CAD', ?2, ?3)",
                params![value, from, to],
            )
            .unwrap();
        }

        let current = current_price(&conn, PriceBook::IngredientCost, "flour", None)
            .unwrap()
            .unwrap();
        assert_eq!(current.value, 3.0);
    }

    #[test]
    fn fallback_ranks_malformed_timestamps_last() {
        let conn = test_db();
        conn.execute(
            "INSERT INTO ingredient_prices
             (ingredient_id, unit_cost, currency, effective_from, effective_to)
             VALUES ('flour', 9.0, 'CAD', 'not-a-date', '2026-04-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ingredient_prices
             (ingredient_id, unit_cost, currency, effective_from, effective_to)
             VALUES ('flour', 2.0, 'CAD', '2026-01-01T00:00:00+00:00', '2026-02-01T00:00:00+00:00')",
            [],
        )
        .unwrap();

        let current = current_price(&conn, PriceBook::IngredientCost, "flour", None)
            .unwrap()
            .unwrap();
        assert_eq!(current.value, 2.0, "well-formed rows outrank malformed ones");
    }

    #[test]
    fn dimension_scoped_histories_are_independent() {
        let mut conn = test_db();
        let sysco = PriceDimensions::new("sysco", "Burlington");
        let gfs = PriceDimensions::new("gfs", "Guelph");
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.002, Some(&sysco)).unwrap();
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.005, Some(&gfs)).unwrap();

        // Both scopes keep their own open row.
        assert_eq!(open_count(&conn, "flour"), 2);
        let s = current_price(&conn, PriceBook::IngredientCost, "flour", Some(&sysco))
            .unwrap()
            .unwrap();
        assert_eq!(s.value, 0.002);
        let g = current_price(&conn, PriceBook::IngredientCost, "flour", Some(&gfs))
            .unwrap()
            .unwrap();
        assert_eq!(g.value, 0.005);

        // A new price in one scope closes only that scope's row.
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.003, Some(&sysco)).unwrap();
        let s = current_price(&conn, PriceBook::IngredientCost, "flour", Some(&sysco))
            .unwrap()
            .unwrap();
        assert_eq!(s.value, 0.003);
        let g = current_price(&conn, PriceBook::IngredientCost, "flour", Some(&gfs))
            .unwrap()
            .unwrap();
        assert_eq!(g.value, 0.005);
    }

    #[test]
    fn menu_price_book_is_separate() {
        let mut conn = test_db();
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.003, None).unwrap();
        add_price(&mut conn, PriceBook::MenuSellPrice, "pizza", 18.5, None).unwrap();

        assert!(current_price(&conn, PriceBook::MenuSellPrice, "flour", None)
            .unwrap()
            .is_none());
        let sell = current_price(&conn, PriceBook::MenuSellPrice, "pizza", None)
            .unwrap()
            .unwrap();
        assert_eq!(sell.value, 18.5);
    }

    #[test]
    fn price_history_is_newest_first() {
        let mut conn = test_db();
        for value in [1.0, 2.0, 3.0] {
            add_price(&mut conn, PriceBook::IngredientCost, "oil", value, None).unwrap();
        }
        let history = price_history(&conn, PriceBook::IngredientCost, "oil").unwrap();
        let values: Vec<f64> = history.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![3.0, 2.0, 1.0]);
        assert!(history[0].is_open());
        assert!(history[1].effective_to.is_some());
    }
}
