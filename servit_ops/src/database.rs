//! SQLite persistence for ServIt 360
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! All writes are transactional. List-valued fields (allergens, recipe lines,
//! components) are stored as JSON text columns and normalized on read, so
//! consumers only ever see the canonical model from `servit_common`.

use rusqlite::{params, Connection, Row};
use servit_common::{Ingredient, MenuItem, MenuItemType, Recipe, SaleRecord};
use std::collections::HashMap;

use crate::Result;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `ingredients`, `recipes`, `menu_items`: the culinary catalog
/// - `ingredient_prices`, `menu_item_prices`: effective-dated price history
/// - `server_sales`: punched sales from the server dashboard
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ingredients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            unit TEXT NOT NULL,
            allergens TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            yield_qty REAL NOT NULL DEFAULT 1,
            yield_unit TEXT NOT NULL DEFAULT 'portion',
            shelf_life_days INTEGER NOT NULL DEFAULT 0,
            tools TEXT NOT NULL DEFAULT '',
            method TEXT NOT NULL DEFAULT '',
            lines TEXT NOT NULL DEFAULT '[]',
            components TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS menu_items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            brand TEXT NOT NULL DEFAULT '',
            item_type TEXT NOT NULL,
            station TEXT NOT NULL DEFAULT '',
            recipe_id TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Effective-dated price history. effective_to IS NULL marks the
        -- currently active row; rows are closed once and never reopened.
        CREATE TABLE IF NOT EXISTS ingredient_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ingredient_id TEXT NOT NULL,
            unit_cost REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'CAD',
            vendor_id TEXT NOT NULL DEFAULT 'default',
            location_id TEXT NOT NULL DEFAULT 'default',
            effective_from TEXT NOT NULL,
            effective_to TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_ingredient_prices_entity
            ON ingredient_prices(ingredient_id);
        CREATE INDEX IF NOT EXISTS idx_ingredient_prices_open
            ON ingredient_prices(ingredient_id) WHERE effective_to IS NULL;

        CREATE TABLE IF NOT EXISTS menu_item_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            menu_item_id TEXT NOT NULL,
            sell_price REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'CAD',
            vendor_id TEXT NOT NULL DEFAULT 'default',
            location_id TEXT NOT NULL DEFAULT 'default',
            effective_from TEXT NOT NULL,
            effective_to TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_menu_item_prices_entity
            ON menu_item_prices(menu_item_id);
        CREATE INDEX IF NOT EXISTS idx_menu_item_prices_open
            ON menu_item_prices(menu_item_id) WHERE effective_to IS NULL;

        CREATE TABLE IF NOT EXISTS server_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            menu_item_id TEXT NOT NULL,
            menu_item_name TEXT NOT NULL DEFAULT '',
            station TEXT NOT NULL DEFAULT '',
            item_type TEXT NOT NULL DEFAULT '',
            qty REAL NOT NULL DEFAULT 1,
            price_per_unit REAL NOT NULL DEFAULT 0,
            line_total REAL,
            service_date TEXT NOT NULL,
            location_id TEXT NOT NULL DEFAULT '',
            table_label TEXT NOT NULL DEFAULT '',
            server_name TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_server_sales_date ON server_sales(service_date);
        CREATE INDEX IF NOT EXISTS idx_server_sales_item ON server_sales(menu_item_id);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

fn json_column_error(e: serde_json::Error, idx: usize) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

// ── Ingredients ────────────────────────────────────────────────────────────

fn ingredient_from_row(row: &Row<'_>) -> rusqlite::Result<Ingredient> {
    let allergens: String = row.get(3)?;
    Ok(Ingredient {
        id: row.get(0)?,
        name: row.get(1)?,
        unit: row.get(2)?,
        allergens: serde_json::from_str(&allergens).map_err(|e| json_column_error(e, 3))?,
    })
}

/// Insert or update an ingredient
pub fn upsert_ingredient(conn: &mut Connection, ingredient: &Ingredient) -> Result<()> {
    let allergens = serde_json::to_string(&ingredient.allergens)?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO ingredients (id, name, unit, allergens, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![&ingredient.id, &ingredient.name, &ingredient.unit, &allergens],
    )?;
    tx.commit()?;
    log::debug!("Upserted ingredient {}", ingredient.id);
    Ok(())
}

pub fn get_ingredient(conn: &Connection, id: &str) -> Result<Option<Ingredient>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, unit, allergens FROM ingredients WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(ingredient_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn list_ingredients(conn: &Connection) -> Result<Vec<Ingredient>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, unit, allergens FROM ingredients ORDER BY name COLLATE NOCASE",
    )?;
    let rows = stmt
        .query_map([], ingredient_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All ingredients keyed by id, the shape the cost resolver consumes
pub fn ingredient_map(conn: &Connection) -> Result<HashMap<String, Ingredient>> {
    let list = list_ingredients(conn)?;
    Ok(list.into_iter().map(|i| (i.id.clone(), i)).collect())
}

/// Delete an ingredient and its price history
///
/// No cascade protection: recipes referencing the ingredient keep their lines
/// and degrade to zero-cost contributions. The integrity scan surfaces them.
pub fn delete_ingredient(conn: &mut Connection, id: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM ingredient_prices WHERE ingredient_id = ?1", params![id])?;
    let n = tx.execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
    tx.commit()?;
    log::info!("Deleted ingredient {} ({} row)", id, n);
    Ok(())
}

// ── Recipes ────────────────────────────────────────────────────────────────

fn recipe_from_row(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    let lines: String = row.get(7)?;
    let components: String = row.get(8)?;
    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        yield_qty: row.get(2)?,
        yield_unit: row.get(3)?,
        shelf_life_days: row.get(4)?,
        tools: row.get(5)?,
        method: row.get(6)?,
        lines: serde_json::from_str(&lines).map_err(|e| json_column_error(e, 7))?,
        components: serde_json::from_str(&components).map_err(|e| json_column_error(e, 8))?,
    })
}

const RECIPE_COLUMNS: &str =
    "id, name, yield_qty, yield_unit, shelf_life_days, tools, method, lines, components";

pub fn upsert_recipe(conn: &mut Connection, recipe: &Recipe) -> Result<()> {
    let lines = serde_json::to_string(&recipe.lines)?;
    let components = serde_json::to_string(&recipe.components)?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO recipes
         (id, name, yield_qty, yield_unit, shelf_life_days, tools, method, lines, components, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))",
        params![
            &recipe.id,
            &recipe.name,
            recipe.yield_qty,
            &recipe.yield_unit,
            recipe.shelf_life_days,
            &recipe.tools,
            &recipe.method,
            &lines,
            &components,
        ],
    )?;
    tx.commit()?;
    log::debug!("Upserted recipe {}", recipe.id);
    Ok(())
}

pub fn get_recipe(conn: &Connection, id: &str) -> Result<Option<Recipe>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(recipe_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn list_recipes(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY name COLLATE NOCASE"
    ))?;
    let rows = stmt
        .query_map([], recipe_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn delete_recipe(conn: &mut Connection, id: &str) -> Result<()> {
    let tx = conn.transaction()?;
    let n = tx.execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
    tx.commit()?;
    log::info!("Deleted recipe {} ({} row)", id, n);
    Ok(())
}

// ── Menu items ─────────────────────────────────────────────────────────────

fn menu_item_from_row(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    let item_type: String = row.get(3)?;
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get(1)?,
        brand: row.get(2)?,
        item_type: MenuItemType::parse(&item_type),
        station: row.get(4)?,
        recipe_id: row.get(5)?,
        active: row.get(6)?,
    })
}

const MENU_COLUMNS: &str = "id, name, brand, item_type, station, recipe_id, active";

pub fn upsert_menu_item(conn: &mut Connection, item: &MenuItem) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO menu_items
         (id, name, brand, item_type, station, recipe_id, active, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
        params![
            &item.id,
            &item.name,
            &item.brand,
            item.item_type.as_str(),
            &item.station,
            &item.recipe_id,
            item.active,
        ],
    )?;
    tx.commit()?;
    log::debug!("Upserted menu item {}", item.id);
    Ok(())
}

pub fn get_menu_item(conn: &Connection, id: &str) -> Result<Option<MenuItem>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {MENU_COLUMNS} FROM menu_items WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(menu_item_from_row(row)?)),
        None => Ok(None),
    }
}

/// List menu items, optionally restricted to active ones
pub fn list_menu_items(conn: &Connection, active_only: bool) -> Result<Vec<MenuItem>> {
    let sql = if active_only {
        format!("SELECT {MENU_COLUMNS} FROM menu_items WHERE active = 1 ORDER BY name COLLATE NOCASE")
    } else {
        format!("SELECT {MENU_COLUMNS} FROM menu_items ORDER BY name COLLATE NOCASE")
    };
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map([], menu_item_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn delete_menu_item(conn: &mut Connection, id: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM menu_item_prices WHERE menu_item_id = ?1", params![id])?;
    let n = tx.execute("DELETE FROM menu_items WHERE id = ?1", params![id])?;
    tx.commit()?;
    log::info!("Deleted menu item {} ({} row)", id, n);
    Ok(())
}

/// A menu item search hit, noting when the match came through an ingredient
#[derive(Debug, Clone)]
pub struct MenuSearchHit {
    pub item: MenuItem,
    /// Name of the matching ingredient, when the item matched via its recipe
    pub matched_ingredient: Option<String>,
}

/// Search active menu items by name or brand, case-insensitive, exact matches
/// first. A query that hits an ingredient name also surfaces items whose
/// linked recipe uses that ingredient.
pub fn search_menu_items(conn: &Connection, query: &str) -> Result<Vec<MenuSearchHit>> {
    let pattern = format!("%{}%", query);
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {MENU_COLUMNS} FROM menu_items
         WHERE active = 1 AND (name LIKE ?1 COLLATE NOCASE OR brand LIKE ?1 COLLATE NOCASE)
         ORDER BY
             CASE WHEN name = ?2 COLLATE NOCASE THEN 0 ELSE 1 END,
             name COLLATE NOCASE"
    ))?;
    let direct = stmt
        .query_map(params![pattern, query], menu_item_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut hits: Vec<MenuSearchHit> = direct
        .into_iter()
        .map(|item| MenuSearchHit {
            item,
            matched_ingredient: None,
        })
        .collect();

    // Ingredient-based matches: find ingredients whose name matches, then
    // items whose linked recipe references one of them.
    let needle = query.trim().to_lowercase();
    if !needle.is_empty() {
        let matching_ings: Vec<Ingredient> = list_ingredients(conn)?
            .into_iter()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .collect();
        if !matching_ings.is_empty() {
            let recipes = list_recipes(conn)?;
            let recipe_by_id: HashMap<&str, &Recipe> =
                recipes.iter().map(|r| (r.id.as_str(), r)).collect();
            let seen: std::collections::HashSet<String> =
                hits.iter().map(|h| h.item.id.clone()).collect();
            for item in list_menu_items(conn, true)? {
                if seen.contains(&item.id) {
                    continue;
                }
                let Some(recipe) = item.recipe_id.as_deref().and_then(|r| recipe_by_id.get(r))
                else {
                    continue;
                };
                let hit = recipe.lines.iter().find_map(|ln| {
                    matching_ings
                        .iter()
                        .find(|i| i.id == ln.ingredient_id)
                        .map(|i| i.name.clone())
                });
                if let Some(ingredient_name) = hit {
                    hits.push(MenuSearchHit {
                        item,
                        matched_ingredient: Some(ingredient_name),
                    });
                }
            }
        }
    }

    Ok(hits)
}

/// Menu items that use a recipe, directly or through a component link
///
/// Computed on read rather than stored, so the reverse index can never drift
/// from the forward links.
pub fn used_in_menu_items(conn: &Connection, recipe_id: &str) -> Result<Vec<MenuItem>> {
    let recipes = list_recipes(conn)?;
    let uses_recipe: std::collections::HashSet<&str> = recipes
        .iter()
        .filter(|r| r.components.iter().any(|c| c == recipe_id))
        .map(|r| r.id.as_str())
        .collect();

    let items = list_menu_items(conn, false)?
        .into_iter()
        .filter(|mi| match mi.recipe_id.as_deref() {
            Some(rid) => rid == recipe_id || uses_recipe.contains(rid),
            None => false,
        })
        .collect();
    Ok(items)
}

// ── Server sales ───────────────────────────────────────────────────────────

/// Record one punched sale; returns the new row id
pub fn record_sale(conn: &mut Connection, sale: &SaleRecord) -> Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO server_sales
         (menu_item_id, menu_item_name, station, item_type, qty, price_per_unit,
          line_total, service_date, location_id, table_label, server_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &sale.menu_item_id,
            &sale.menu_item_name,
            &sale.station,
            &sale.item_type,
            sale.qty,
            sale.price_per_unit,
            sale.line_total,
            &sale.service_date,
            &sale.location_id,
            &sale.table_label,
            &sale.server_name,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<SaleRecord> {
    Ok(SaleRecord {
        id: row.get(0)?,
        menu_item_id: row.get(1)?,
        menu_item_name: row.get(2)?,
        station: row.get(3)?,
        item_type: row.get(4)?,
        qty: row.get(5)?,
        price_per_unit: row.get(6)?,
        line_total: row.get(7)?,
        service_date: row.get(8)?,
        location_id: row.get(9)?,
        table_label: row.get(10)?,
        server_name: row.get(11)?,
    })
}

/// Sales within an inclusive service-date range, optionally one location
pub fn sales_in_range(
    conn: &Connection,
    from: &str,
    to: &str,
    location: Option<&str>,
) -> Result<Vec<SaleRecord>> {
    const SALE_COLUMNS: &str = "id, menu_item_id, menu_item_name, station, item_type, qty, \
                                price_per_unit, line_total, service_date, location_id, \
                                table_label, server_name";
    let rows = match location {
        Some(loc) => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SALE_COLUMNS} FROM server_sales
                 WHERE service_date >= ?1 AND service_date <= ?2 AND location_id = ?3
                 ORDER BY service_date, id"
            ))?;
            let rows = stmt
                .query_map(params![from, to, loc], sale_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SALE_COLUMNS} FROM server_sales
                 WHERE service_date >= ?1 AND service_date <= ?2
                 ORDER BY service_date, id"
            ))?;
            let rows = stmt
                .query_map(params![from, to], sale_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(rows)
}

#[cfg(test)]
pub(crate) fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}
