//! Cost and allergen roll-up for recipes
//!
//! One shared implementation for every call site (recipe editor, culinary
//! spec panel, sales insights, integrity scan). Costing is best-effort, not
//! strict validation: a missing ingredient or missing price contributes zero
//! and never fails the roll-up.

use rusqlite::Connection;
use servit_common::{ComputedCost, CostLine, Ingredient, Recipe};
use std::collections::{BTreeSet, HashMap};

use crate::pricing::{current_price, PriceBook};
use crate::Result;

/// Resolve a recipe's live cost and allergen union
///
/// Per line, in input order: union the ingredient's declared allergens, look
/// up the current unit cost, and extend by quantity. Lines referencing a
/// missing ingredient keep the raw id as display name and contribute zero
/// allergens; missing prices cost zero. The total is the exact sum of line
/// extended costs.
pub fn compute_cost_and_allergens(
    conn: &Connection,
    recipe: &Recipe,
    ingredient_map: &HashMap<String, Ingredient>,
) -> Result<ComputedCost> {
    let mut total = 0.0;
    let mut allergens = BTreeSet::new();
    let mut lines = Vec::with_capacity(recipe.lines.len());

    for line in &recipe.lines {
        let ingredient = ingredient_map.get(&line.ingredient_id);
        if let Some(ing) = ingredient {
            allergens.extend(ing.allergens.iter().cloned());
        }

        let unit_cost = current_price(conn, PriceBook::IngredientCost, &line.ingredient_id, None)?
            .map(|p| p.value)
            .unwrap_or(0.0);
        let ext_cost = unit_cost * line.qty;
        total += ext_cost;

        lines.push(CostLine {
            ingredient_id: line.ingredient_id.clone(),
            ingredient_name: ingredient
                .map(|i| i.name.clone())
                .unwrap_or_else(|| line.ingredient_id.clone()),
            qty: line.qty,
            unit: if line.unit.is_empty() {
                ingredient.map(|i| i.unit.clone()).unwrap_or_default()
            } else {
                line.unit.clone()
            },
            unit_cost,
            ext_cost,
        });
    }

    Ok(ComputedCost {
        total,
        lines,
        allergens: allergens.into_iter().collect(),
    })
}

/// Theoretical cost of one portion
///
/// Divides the recipe total by its yield; a zero or negative yield falls back
/// to a divisor of 1 instead of erroring, so a malformed recipe still shows a
/// number. Fractional yields pass through unchanged.
pub fn cost_per_portion(
    conn: &Connection,
    recipe: &Recipe,
    ingredient_map: &HashMap<String, Ingredient>,
) -> Result<f64> {
    let computed = compute_cost_and_allergens(conn, recipe, ingredient_map)?;
    let divisor = if recipe.yield_qty > 0.0 {
        recipe.yield_qty
    } else {
        1.0
    };
    Ok(computed.total / divisor)
}

/// Scale multiplier for viewing a recipe at a different batch size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    /// Direct multiplier, e.g. the spec panel's 1x..8x selector
    pub fn from_multiplier(mult: f64) -> Self {
        if mult.is_finite() && mult > 0.0 {
            ScaleFactor(mult)
        } else {
            ScaleFactor(1.0)
        }
    }

    /// Derived from a desired yield against the recipe's base yield
    pub fn from_desired_yield(desired: f64, base_yield: f64) -> Self {
        let base = if base_yield > 0.0 { base_yield } else { 1.0 };
        Self::from_multiplier(desired / base)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Scale a computed cost for display at a different batch size
///
/// Every line quantity and extended cost is multiplied by the factor; the
/// total is recomputed as the sum of scaled lines rather than scaling the
/// base total, so it always equals the displayed lines exactly.
pub fn scale_cost(computed: &ComputedCost, factor: ScaleFactor) -> ComputedCost {
    let f = factor.value();
    let lines: Vec<CostLine> = computed
        .lines
        .iter()
        .map(|ln| CostLine {
            ingredient_id: ln.ingredient_id.clone(),
            ingredient_name: ln.ingredient_name.clone(),
            qty: ln.qty * f,
            unit: ln.unit.clone(),
            unit_cost: ln.unit_cost,
            ext_cost: ln.ext_cost * f,
        })
        .collect();
    let total = lines.iter().map(|ln| ln.ext_cost).sum();
    ComputedCost {
        total,
        lines,
        allergens: computed.allergens.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ingredient_map, test_db, upsert_ingredient};
    use crate::pricing::add_price;
    use rusqlite::params;
    use servit_common::RecipeLine;

    fn seed_ingredient(
        conn: &mut Connection,
        id: &str,
        name: &str,
        allergens: &[&str],
        unit_cost: Option<f64>,
    ) {
        upsert_ingredient(
            conn,
            &Ingredient::new(id, name, "g").with_allergens(allergens),
        )
        .unwrap();
        if let Some(cost) = unit_cost {
            add_price(conn, PriceBook::IngredientCost, id, cost, None).unwrap();
        }
    }

    #[test]
    fn flour_line_resolves_current_price() {
        // Flour has a closed Jan price and an open Feb price; the line must
        // cost out at the open price.
        let mut conn = test_db();
        seed_ingredient(&mut conn, "flour", "Flour", &["gluten"], None);
        conn.execute(
            "INSERT INTO ingredient_prices
             (ingredient_id, unit_cost, currency, effective_from, effective_to)
             VALUES ('flour', 0.002, 'CAD', '2026-01-01T00:00:00+00:00', '2026-02-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ingredient_prices
             (ingredient_id, unit_cost, currency, effective_from, effective_to)
             VALUES ('flour', 0.003, 'CAD', '2026-02-01T00:00:00+00:00', NULL)",
            [],
        )
        .unwrap();

        let recipe = Recipe::new("dough", "Dough", 1.0)
            .with_lines(vec![RecipeLine::new("flour", 500.0, "g")]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();

        assert_eq!(computed.lines.len(), 1);
        assert!((computed.lines[0].unit_cost - 0.003).abs() < 1e-12);
        assert!((computed.lines[0].ext_cost - 1.5).abs() < 1e-12);
        assert!((computed.total - 1.5).abs() < 1e-12);
    }

    #[test]
    fn adding_price_shifts_line_cost() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "flour", "Flour", &[], Some(0.003));
        add_price(&mut conn, PriceBook::IngredientCost, "flour", 0.004, None).unwrap();

        // Previous row is now closed; only the 0.004 row is open.
        let closed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ingredient_prices
                 WHERE ingredient_id = 'flour' AND effective_to IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(closed, 1);

        let recipe = Recipe::new("dough", "Dough", 1.0)
            .with_lines(vec![RecipeLine::new("flour", 500.0, "g")]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();
        assert!((computed.total - 2.0).abs() < 1e-12);
    }

    #[test]
    fn missing_ingredient_degrades_to_zero() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "tomato", "Tomato", &[], Some(0.01));

        let recipe = Recipe::new("mystery", "Mystery", 1.0).with_lines(vec![
            RecipeLine::new("tomato", 100.0, "g"),
            RecipeLine::new("long-deleted", 50.0, "g"),
        ]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();

        assert_eq!(computed.lines.len(), 2);
        let ghost = &computed.lines[1];
        assert_eq!(ghost.ingredient_name, "long-deleted");
        assert_eq!(ghost.unit_cost, 0.0);
        assert_eq!(ghost.ext_cost, 0.0);
        // Total still sums over the surviving line.
        assert!((computed.total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unpriced_ingredient_costs_zero_but_keeps_allergens() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "peanut", "Peanut", &["peanut"], None);

        let recipe = Recipe::new("satay", "Satay", 1.0)
            .with_lines(vec![RecipeLine::new("peanut", 30.0, "g")]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();

        assert_eq!(computed.total, 0.0);
        assert_eq!(computed.allergens, vec!["peanut".to_string()]);
    }

    #[test]
    fn allergens_union_across_lines() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "a", "A", &["milk", "soy"], Some(1.0));
        seed_ingredient(&mut conn, "b", "B", &["soy", "egg"], Some(1.0));

        let recipe = Recipe::new("mix", "Mix", 1.0).with_lines(vec![
            RecipeLine::new("a", 1.0, "g"),
            RecipeLine::new("b", 1.0, "g"),
        ]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();

        let set: BTreeSet<&str> = computed.allergens.iter().map(|s| s.as_str()).collect();
        assert_eq!(set, BTreeSet::from(["egg", "milk", "soy"]));
        assert_eq!(computed.allergens.len(), 3);
    }

    #[test]
    fn empty_recipe_resolves_to_zero() {
        let conn = test_db();
        let recipe = Recipe::new("blank", "Blank", 4.0);
        let computed = compute_cost_and_allergens(&conn, &recipe, &HashMap::new()).unwrap();
        assert_eq!(computed.total, 0.0);
        assert!(computed.lines.is_empty());
        assert!(computed.allergens.is_empty());
    }

    #[test]
    fn line_order_is_preserved() {
        let mut conn = test_db();
        for id in ["c", "a", "b"] {
            seed_ingredient(&mut conn, id, id, &[], Some(1.0));
        }
        let recipe = Recipe::new("r", "R", 1.0).with_lines(vec![
            RecipeLine::new("c", 1.0, "g"),
            RecipeLine::new("a", 1.0, "g"),
            RecipeLine::new("b", 1.0, "g"),
        ]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();
        let ids: Vec<&str> = computed.lines.iter().map(|l| l.ingredient_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn total_equals_sum_of_line_costs() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "x", "X", &[], Some(0.1));
        seed_ingredient(&mut conn, "y", "Y", &[], Some(0.07));
        let recipe = Recipe::new("r", "R", 1.0).with_lines(vec![
            RecipeLine::new("x", 3.0, "g"),
            RecipeLine::new("y", 11.0, "g"),
        ]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();
        let sum: f64 = computed.lines.iter().map(|l| l.ext_cost).sum();
        assert_eq!(computed.total, sum);
    }

    #[test]
    fn cost_per_portion_divides_by_yield() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "x", "X", &[], Some(1.0));
        let recipe = Recipe::new("r", "R", 4.0)
            .with_lines(vec![RecipeLine::new("x", 8.0, "g")]);
        let map = ingredient_map(&conn).unwrap();
        let per_portion = cost_per_portion(&conn, &recipe, &map).unwrap();
        assert!((per_portion - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cost_per_portion_floors_malformed_yield_at_one() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "x", "X", &[], Some(1.0));
        let map = ingredient_map(&conn).unwrap();

        for bad_yield in [0.0, -3.0] {
            let recipe = Recipe::new("r", "R", bad_yield)
                .with_lines(vec![RecipeLine::new("x", 8.0, "g")]);
            let per_portion = cost_per_portion(&conn, &recipe, &map).unwrap();
            assert!((per_portion - 8.0).abs() < 1e-12);
        }
    }

    #[test]
    fn scaling_is_linear() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "x", "X", &[], Some(0.37));
        seed_ingredient(&mut conn, "y", "Y", &[], Some(1.13));
        let recipe = Recipe::new("r", "R", 2.0).with_lines(vec![
            RecipeLine::new("x", 123.4, "g"),
            RecipeLine::new("y", 7.0, "g"),
        ]);
        let map = ingredient_map(&conn).unwrap();
        let base = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();

        for f in [0.5, 1.0, 3.0, 7.25] {
            let scaled = scale_cost(&base, ScaleFactor::from_multiplier(f));
            let expected = base.total * f;
            let rel = (scaled.total - expected).abs() / expected.abs().max(1e-12);
            assert!(rel < 1e-9, "factor {f}: {} vs {expected}", scaled.total);
            for (s, b) in scaled.lines.iter().zip(base.lines.iter()) {
                assert!((s.qty - b.qty * f).abs() < 1e-9);
                assert!((s.ext_cost - b.ext_cost * f).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn scale_factor_from_desired_yield() {
        let f = ScaleFactor::from_desired_yield(12.0, 4.0);
        assert_eq!(f.value(), 3.0);
        // Malformed base yield falls back to 1.
        let f = ScaleFactor::from_desired_yield(5.0, 0.0);
        assert_eq!(f.value(), 5.0);
        // Nonsense multipliers fall back to identity.
        assert_eq!(ScaleFactor::from_multiplier(0.0).value(), 1.0);
        assert_eq!(ScaleFactor::from_multiplier(f64::NAN).value(), 1.0);
    }

    #[test]
    fn line_unit_falls_back_to_ingredient_unit() {
        let mut conn = test_db();
        upsert_ingredient(&mut conn, &Ingredient::new("milk", "Milk", "ml")).unwrap();
        add_price(&mut conn, PriceBook::IngredientCost, "milk", 0.001, None).unwrap();
        let recipe = Recipe::new("r", "R", 1.0)
            .with_lines(vec![RecipeLine::new("milk", 200.0, "")]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();
        assert_eq!(computed.lines[0].unit, "ml");
    }

    #[test]
    fn fallback_price_used_when_history_has_no_open_row() {
        let mut conn = test_db();
        seed_ingredient(&mut conn, "flour", "Flour", &[], None);
        conn.execute(
            "INSERT INTO ingredient_prices
             (ingredient_id, unit_cost, currency, effective_from, effective_to)
             VALUES ('flour', 0.002, 'CAD', '2026-01-01T00:00:00+00:00', '2026-02-01T00:00:00+00:00')",
            params![],
        )
        .unwrap();

        let recipe = Recipe::new("dough", "Dough", 1.0)
            .with_lines(vec![RecipeLine::new("flour", 100.0, "g")]);
        let map = ingredient_map(&conn).unwrap();
        let computed = compute_cost_and_allergens(&conn, &recipe, &map).unwrap();
        assert!((computed.total - 0.2).abs() < 1e-12);
    }
}
