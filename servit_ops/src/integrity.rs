//! Culinary data integrity scan
//!
//! Walks ingredients, recipes, and menu items looking for the gaps that block
//! COGS: missing or inactive prices, dangling ingredient references, broken
//! menu-to-recipe links. The scan itself is read-only; repairs happen only
//! through the explicit [`apply_auto_fixes`] step, and price rows are never
//! touched.

use rusqlite::{params, Connection};
use servit_common::Recipe;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::database::{list_ingredients, list_menu_items, list_recipes, upsert_menu_item};
use crate::pricing::{current_price, PriceBook};
use crate::Result;

/// Issues found for one document
#[derive(Debug, Clone)]
pub struct Issue {
    pub id: String,
    pub name: String,
    pub problems: Vec<String>,
}

/// A menu item issue, possibly with a suggested recipe link
#[derive(Debug, Clone)]
pub struct MenuIssue {
    pub id: String,
    pub name: String,
    pub station: String,
    pub problems: Vec<String>,
    pub suggested_recipe_id: Option<String>,
    pub suggested_recipe_name: Option<String>,
}

impl MenuIssue {
    pub fn can_auto_fix(&self) -> bool {
        self.suggested_recipe_id.is_some()
    }
}

/// Scan totals and issue counts
#[derive(Debug, Clone, Default)]
pub struct IntegritySummary {
    pub total_menu_items: usize,
    pub total_recipes: usize,
    pub total_ingredients: usize,
    pub cost_ready_menu_items: usize,
    pub cost_blocked_menu_items: usize,
}

/// Output of a full integrity scan
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub summary: IntegritySummary,
    pub ingredient_issues: Vec<Issue>,
    pub recipe_issues: Vec<Issue>,
    pub menu_issues: Vec<MenuIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.ingredient_issues.is_empty()
            && self.recipe_issues.is_empty()
            && self.menu_issues.is_empty()
    }

    pub fn auto_fixable(&self) -> usize {
        self.menu_issues.iter().filter(|m| m.can_auto_fix()).count()
    }
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Find a recipe to link a broken menu item to: exact normalized name match
/// first, then substring containment either way.
fn suggest_recipe<'a>(item_name: &str, recipes: &'a [Recipe]) -> Option<&'a Recipe> {
    let needle = norm(item_name);
    if needle.is_empty() {
        return None;
    }
    recipes
        .iter()
        .find(|r| norm(&r.name) == needle)
        .or_else(|| {
            recipes.iter().find(|r| {
                let rn = norm(&r.name);
                !rn.is_empty() && (rn.contains(&needle) || needle.contains(&rn))
            })
        })
}

/// Run the full scan
pub fn run_scan(conn: &Connection) -> Result<IntegrityReport> {
    log::info!("Starting culinary data integrity scan");

    let ingredients = list_ingredients(conn)?;
    let recipes = list_recipes(conn)?;
    let menu_items = list_menu_items(conn, false)?;
    log::info!(
        "Loaded {} menu items, {} recipes, {} ingredients",
        menu_items.len(),
        recipes.len(),
        ingredients.len()
    );

    let recipe_ids: HashSet<&str> = recipes.iter().map(|r| r.id.as_str()).collect();
    let ingredient_by_id: HashMap<&str, &servit_common::Ingredient> =
        ingredients.iter().map(|i| (i.id.as_str(), i)).collect();

    // Ingredient pricing: each needs an open price row with a usable value.
    let mut ingredient_issues = Vec::new();
    let mut cost_ready: HashMap<&str, bool> = HashMap::new();
    for ing in &ingredients {
        let mut problems = Vec::new();
        let mut has_current = false;

        let history_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ingredient_prices WHERE ingredient_id = ?1",
            params![&ing.id],
            |row| row.get(0),
        )?;
        if history_count == 0 {
            problems.push("No price rows.".to_string());
        } else {
            let open: i64 = conn.query_row(
                "SELECT COUNT(*) FROM ingredient_prices
                 WHERE ingredient_id = ?1 AND effective_to IS NULL",
                params![&ing.id],
                |row| row.get(0),
            )?;
            if open == 0 {
                problems.push("No active price row (effective_to IS NULL).".to_string());
            } else {
                has_current = current_price(conn, PriceBook::IngredientCost, &ing.id, None)?
                    .is_some();
            }
        }

        cost_ready.insert(ing.id.as_str(), has_current);
        if !problems.is_empty() {
            ingredient_issues.push(Issue {
                id: ing.id.clone(),
                name: ing.name.clone(),
                problems,
            });
        }
    }
    log::info!(
        "Ingredient pricing check complete, {} with issues",
        ingredient_issues.len()
    );

    // Recipes: yield sanity, dangling lines, unpriced lines.
    let mut recipe_issues = Vec::new();
    let mut costable: HashMap<&str, bool> = HashMap::new();
    for recipe in &recipes {
        let mut problems = Vec::new();
        if recipe.yield_qty <= 0.0 {
            problems.push("Yield is missing or <= 0.".to_string());
        }

        let mut all_exist = true;
        let mut all_priced = true;
        for line in &recipe.lines {
            match ingredient_by_id.get(line.ingredient_id.as_str()) {
                None => {
                    problems.push(format!(
                        "Missing ingredient: id \"{}\" not found.",
                        line.ingredient_id
                    ));
                    all_exist = false;
                    all_priced = false;
                }
                Some(ing) => {
                    if !cost_ready.get(ing.id.as_str()).copied().unwrap_or(false) {
                        problems.push(format!("Ingredient \"{}\" has no active price.", ing.name));
                        all_priced = false;
                    }
                }
            }
        }

        costable.insert(
            recipe.id.as_str(),
            all_exist && all_priced && recipe.yield_qty > 0.0,
        );
        if !problems.is_empty() {
            recipe_issues.push(Issue {
                id: recipe.id.clone(),
                name: recipe.name.clone(),
                problems,
            });
        }
    }
    log::info!(
        "Recipe integrity check complete, {} with issues",
        recipe_issues.len()
    );

    // Menu items: broken links and cost readiness.
    let mut menu_issues = Vec::new();
    let mut cost_ready_count = 0;
    let mut cost_blocked_count = 0;
    for item in &menu_items {
        let mut problems = Vec::new();
        let mut suggestion: Option<&Recipe> = None;

        match item.recipe_id.as_deref() {
            None => {
                problems.push("Missing recipe link.".to_string());
                suggestion = suggest_recipe(&item.name, &recipes);
            }
            Some(rid) if !recipe_ids.contains(rid) => {
                problems.push(format!("recipe_id \"{rid}\" does not match any recipe."));
                suggestion = suggest_recipe(&item.name, &recipes);
            }
            Some(rid) => {
                if costable.get(rid).copied().unwrap_or(false) {
                    cost_ready_count += 1;
                } else {
                    problems.push(
                        "Linked recipe is not fully costable (missing prices / yield / ingredients)."
                            .to_string(),
                    );
                    cost_blocked_count += 1;
                }
            }
        }

        if let Some(r) = suggestion {
            problems.push(format!("Can auto-link to recipe \"{}\".", r.name));
        }

        if !problems.is_empty() {
            menu_issues.push(MenuIssue {
                id: item.id.clone(),
                name: item.name.clone(),
                station: item.station.clone(),
                problems,
                suggested_recipe_id: suggestion.map(|r| r.id.clone()),
                suggested_recipe_name: suggestion.map(|r| r.name.clone()),
            });
        }
    }
    log::info!(
        "Menu item check complete, {} with issues",
        menu_issues.len()
    );

    Ok(IntegrityReport {
        summary: IntegritySummary {
            total_menu_items: menu_items.len(),
            total_recipes: recipes.len(),
            total_ingredients: ingredients.len(),
            cost_ready_menu_items: cost_ready_count,
            cost_blocked_menu_items: cost_blocked_count,
        },
        ingredient_issues,
        recipe_issues,
        menu_issues,
    })
}

/// Write the suggested recipe links found by a scan
///
/// Only touches `menu_items.recipe_id`; price rows and recipes stay as they
/// are. Returns the number of menu items updated.
pub fn apply_auto_fixes(conn: &mut Connection, report: &IntegrityReport) -> Result<usize> {
    let mut updated = 0;
    for issue in &report.menu_issues {
        let Some(recipe_id) = issue.suggested_recipe_id.as_deref() else {
            continue;
        };
        let Some(mut item) = crate::database::get_menu_item(conn, &issue.id)? else {
            continue;
        };
        item.recipe_id = Some(recipe_id.to_string());
        upsert_menu_item(conn, &item)?;
        updated += 1;
    }
    log::info!("Auto-fix complete, updated {} menu item(s)", updated);
    Ok(updated)
}

/// Plain-text report for the CLI
pub fn format_report(report: &IntegrityReport) -> String {
    let mut out = String::new();
    let s = &report.summary;
    out.push_str("Culinary Data Integrity Report\n");
    out.push_str("------------------------------\n");
    let _ = writeln!(
        out,
        "Menu items:  {} (cost-ready: {}, cost-blocked: {})",
        s.total_menu_items, s.cost_ready_menu_items, s.cost_blocked_menu_items
    );
    let _ = writeln!(
        out,
        "Recipes:     {} (with issues: {})",
        s.total_recipes,
        report.recipe_issues.len()
    );
    let _ = writeln!(
        out,
        "Ingredients: {} (with pricing issues: {})",
        s.total_ingredients,
        report.ingredient_issues.len()
    );

    out.push_str("\nMenu items with issues:\n");
    if report.menu_issues.is_empty() {
        out.push_str("  none\n");
    }
    for m in &report.menu_issues {
        let tag = if m.can_auto_fix() { " [auto-fixable]" } else { "" };
        let _ = writeln!(out, "  {} ({}){}", m.name, m.id, tag);
        for p in &m.problems {
            let _ = writeln!(out, "    - {p}");
        }
    }

    out.push_str("\nRecipes with issues:\n");
    if report.recipe_issues.is_empty() {
        out.push_str("  none\n");
    }
    for r in &report.recipe_issues {
        let _ = writeln!(out, "  {} ({})", r.name, r.id);
        for p in &r.problems {
            let _ = writeln!(out, "    - {p}");
        }
    }

    out.push_str("\nIngredients with pricing issues:\n");
    if report.ingredient_issues.is_empty() {
        out.push_str("  none\n");
    }
    for i in &report.ingredient_issues {
        let _ = writeln!(out, "  {} ({})", i.name, i.id);
        for p in &i.problems {
            let _ = writeln!(out, "    - {p}");
        }
    }
    out
}
