//! ServIt 360 - Restaurant Operations Database
//!
//! Manages ingredients, recipes, menu items, effective-dated prices, prep
//! labels, and server sales against a local SQLite database.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use servit_ops::costing::{compute_cost_and_allergens, cost_per_portion, scale_cost, ScaleFactor};
use servit_ops::database::{
    get_recipe, init_schema, list_ingredients, record_sale, upsert_ingredient, upsert_menu_item,
    upsert_recipe,
};
use servit_ops::integrity::{apply_auto_fixes, format_report, run_scan};
use servit_ops::labels::{render_batch, PrepLabel};
use servit_ops::prefs::{FileBackend, PrefsBackend};
use servit_ops::pricing::{add_price, current_price, price_history, PriceBook, PriceDimensions};
use servit_ops::sales::{sales_summary, DateRange};
use servit_ops::Result;
use servit_common::{Ingredient, MenuItem, Recipe, SaleRecord};
use std::path::PathBuf;

/// ServIt 360 operations CLI - ingredients, recipes, pricing, and sales
#[derive(Parser, Debug)]
#[command(name = "servit_ops")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update an ingredient
    AddIngredient {
        id: String,
        name: String,
        /// Purchase unit, e.g. g, ml, each
        unit: String,
        /// Comma-separated allergen list
        #[arg(long, default_value = "")]
        allergens: String,
    },
    /// List all ingredients
    ListIngredients,
    /// Import recipes from a JSON array file
    ImportRecipes { file: PathBuf },
    /// Import menu items from a JSON array file
    ImportMenu { file: PathBuf },
    /// Record a new price, closing the previous open one
    AddPrice {
        /// Price book: ingredient or menu
        #[arg(long, default_value = "ingredient")]
        book: String,
        entity_id: String,
        value: f64,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Show the current price and history for an entity
    Price {
        #[arg(long, default_value = "ingredient")]
        book: String,
        entity_id: String,
        /// Print the full history instead of just the current price
        #[arg(long, default_value_t = false)]
        history: bool,
    },
    /// Cost a recipe against current ingredient prices
    Cost {
        recipe_id: String,
        /// Batch multiplier
        #[arg(long)]
        scale: Option<f64>,
        /// Desired yield; scale factor becomes desired / base yield
        #[arg(long = "yield")]
        desired_yield: Option<f64>,
    },
    /// Print prep labels for a recipe
    Label {
        recipe_id: String,
        /// Prep date as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Copies to print (default: saved print quantity preference)
        #[arg(long)]
        copies: Option<u32>,
    },
    /// Toggle a recipe as a favorite
    Favorite { recipe_id: String },
    /// Show favorites and recently viewed recipes
    Prefs,
    /// Scan culinary data for broken links and missing prices
    Integrity {
        /// Apply safe automatic fixes (relink menu items by name)
        #[arg(long, default_value_t = false)]
        fix: bool,
    },
    /// Punch a server sale
    RecordSale {
        menu_item_id: String,
        qty: f64,
        price_per_unit: f64,
        /// Service date as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        table: String,
        #[arg(long, default_value = "")]
        server: String,
    },
    /// Sales summary for a date range
    Sales {
        /// Preset: today, yesterday, this-week, last-week, this-month
        #[arg(long, default_value = "today")]
        range: String,
        /// Custom range start (overrides --range, requires --to)
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
}

/// Returns the default database path: ~/.local/share/servit_ops/servit.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("servit_ops")
        .join("servit.db")
        .to_string_lossy()
        .to_string()
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run_command(&mut conn, args.command) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run_command(conn: &mut Connection, command: Command) -> Result<()> {
    match command {
        Command::AddIngredient {
            id,
            name,
            unit,
            allergens,
        } => {
            let mut ingredient = Ingredient::new(&id, &name, &unit);
            ingredient.allergens = allergens
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            upsert_ingredient(conn, &ingredient)?;
            println!("Saved ingredient {}", id);
        }
        Command::ListIngredients => {
            for ing in list_ingredients(conn)? {
                let allergens: Vec<&str> = ing.allergens.iter().map(String::as_str).collect();
                println!("{}\t{}\t{}\t[{}]", ing.id, ing.name, ing.unit, allergens.join(", "));
            }
        }
        Command::ImportRecipes { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let recipes: Vec<Recipe> = serde_json::from_str(&raw)?;
            for recipe in &recipes {
                upsert_recipe(conn, recipe)?;
            }
            println!("Imported {} recipe(s) from {}", recipes.len(), file.display());
        }
        Command::ImportMenu { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let items: Vec<MenuItem> = serde_json::from_str(&raw)?;
            for item in &items {
                upsert_menu_item(conn, item)?;
            }
            println!("Imported {} menu item(s) from {}", items.len(), file.display());
        }
        Command::AddPrice {
            book,
            entity_id,
            value,
            vendor,
            location,
        } => {
            let book = parse_book(&book)?;
            let dims = match (vendor, location) {
                (None, None) => None,
                (v, l) => Some(PriceDimensions::new(
                    v.as_deref().unwrap_or("default"),
                    l.as_deref().unwrap_or("default"),
                )),
            };
            let id = add_price(conn, book, &entity_id, value, dims.as_ref())?;
            println!("Recorded price {} for {} (row {})", value, entity_id, id);
        }
        Command::Price {
            book,
            entity_id,
            history,
        } => {
            let book = parse_book(&book)?;
            if history {
                for record in price_history(conn, book, &entity_id)? {
                    println!(
                        "{}\t{}\t{} -> {}\t{}/{}",
                        record.value,
                        record.currency,
                        record.effective_from,
                        record.effective_to.as_deref().unwrap_or("open"),
                        record.vendor_id,
                        record.location_id
                    );
                }
            } else {
                match current_price(conn, book, &entity_id, None)? {
                    Some(record) => println!(
                        "{} {} (effective from {})",
                        record.value, record.currency, record.effective_from
                    ),
                    None => println!("No price recorded for {}", entity_id),
                }
            }
        }
        Command::Cost {
            recipe_id,
            scale,
            desired_yield,
        } => {
            let recipe = get_recipe(conn, &recipe_id)?
                .ok_or_else(|| servit_ops::ServitError::NotFound(recipe_id.clone()))?;
            let ingredients = servit_ops::database::ingredient_map(conn)?;
            let mut cost = compute_cost_and_allergens(conn, &recipe, &ingredients)?;

            if let Some(factor) = requested_scale(scale, desired_yield, recipe.yield_qty) {
                cost = scale_cost(&cost, factor);
                println!("Scale factor: {:.3}", factor.value());
            }

            for line in &cost.lines {
                println!(
                    "{}\t{} {}\t@ {:.4}\t= {:.2}",
                    line.ingredient_name, line.qty, line.unit, line.unit_cost, line.ext_cost
                );
            }
            println!("Total: {:.2}", cost.total);
            println!(
                "Per portion: {:.2}",
                cost_per_portion(conn, &recipe, &ingredients)?
            );
            let allergens: Vec<&str> = cost.allergens.iter().map(String::as_str).collect();
            println!(
                "Allergens: {}",
                if allergens.is_empty() { "None".to_string() } else { allergens.join(", ") }
            );
        }
        Command::Label {
            recipe_id,
            date,
            copies,
        } => {
            let recipe = get_recipe(conn, &recipe_id)?
                .ok_or_else(|| servit_ops::ServitError::NotFound(recipe_id.clone()))?;
            let ingredients = servit_ops::database::ingredient_map(conn)?;
            let cost = compute_cost_and_allergens(conn, &recipe, &ingredients)?;
            let prep_date = parse_date_or_today(date.as_deref())?;
            let allergens = cost.allergens.iter().cloned().collect();
            let label = PrepLabel::for_recipe(&recipe, &allergens, prep_date);

            let mut backend = FileBackend::new(FileBackend::default_path());
            let mut prefs = backend.load()?;
            let copies = copies.unwrap_or(prefs.print_quantity);
            prefs.mark_viewed(&recipe_id);
            backend.save(&prefs)?;

            print!("{}", render_batch(&label, copies));
        }
        Command::Favorite { recipe_id } => {
            let mut backend = FileBackend::new(FileBackend::default_path());
            let mut prefs = backend.load()?;
            let now_favorite = prefs.toggle_favorite(&recipe_id);
            backend.save(&prefs)?;
            if now_favorite {
                println!("Added {} to favorites", recipe_id);
            } else {
                println!("Removed {} from favorites", recipe_id);
            }
        }
        Command::Prefs => {
            let backend = FileBackend::new(FileBackend::default_path());
            let prefs = backend.load()?;
            let favorites: Vec<&str> = prefs.favorites.iter().map(String::as_str).collect();
            println!("Favorites: {}", favorites.join(", "));
            println!("Recently viewed: {}", prefs.recently_viewed.join(", "));
            println!("Print quantity: {}", prefs.print_quantity);
            println!("Role: {}", prefs.role);
        }
        Command::Integrity { fix } => {
            let report = run_scan(conn)?;
            print!("{}", format_report(&report));
            if fix {
                let fixed = apply_auto_fixes(conn, &report)?;
                println!("Applied {} automatic fix(es)", fixed);
            } else if report.auto_fixable() > 0 {
                println!(
                    "{} issue(s) can be fixed automatically; re-run with --fix",
                    report.auto_fixable()
                );
            }
        }
        Command::RecordSale {
            menu_item_id,
            qty,
            price_per_unit,
            date,
            location,
            table,
            server,
        } => {
            let service_date = parse_date_or_today(date.as_deref())?
                .format("%Y-%m-%d")
                .to_string();
            let item = servit_ops::database::get_menu_item(conn, &menu_item_id)?;
            let sale = SaleRecord {
                id: 0,
                menu_item_name: item
                    .as_ref()
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| menu_item_id.clone()),
                station: item.as_ref().map(|i| i.station.clone()).unwrap_or_default(),
                item_type: item
                    .as_ref()
                    .map(|i| i.item_type.as_str().to_string())
                    .unwrap_or_default(),
                menu_item_id,
                qty,
                price_per_unit,
                line_total: Some(price_per_unit * qty),
                service_date,
                location_id: location,
                table_label: table,
                server_name: server,
            };
            let id = record_sale(conn, &sale)?;
            println!("Recorded sale {} ({:.2})", id, sale.revenue());
        }
        Command::Sales {
            range,
            from,
            to,
            location,
        } => {
            let today = Utc::now().date_naive();
            let range = match (from, to) {
                (Some(from), Some(to)) => DateRange::custom(parse_date(&from)?, parse_date(&to)?),
                (None, None) => DateRange::preset(&range, today).ok_or_else(|| {
                    servit_ops::ServitError::InvalidInput(format!("unknown range preset: {range}"))
                })?,
                _ => {
                    return Err(servit_ops::ServitError::InvalidInput(
                        "--from and --to must be given together".to_string(),
                    ))
                }
            };
            let summary = sales_summary(conn, range, location.as_deref())?;
            println!(
                "Sales: {:.2}  Items: {}  COGS: {:.2}",
                summary.total_sales, summary.total_items, summary.total_cogs
            );
            println!(
                "Food cost: {:.1}% (target {:.0}%, variance {:+.1}%)",
                summary.food_cost_pct,
                servit_ops::sales::TARGET_FOOD_COST_PCT,
                summary.variance_pct
            );
            println!(
                "Tables: {}  Avg check: {:.2}",
                summary.tables_count, summary.avg_check
            );
            if !summary.top_items.is_empty() {
                println!("Top items:");
                for item in &summary.top_items {
                    println!(
                        "  {}\tqty {}\tsales {:.2}\tcogs {:.2}",
                        item.name, item.qty, item.sales, item.cogs
                    );
                }
            }
            for bucket in &summary.by_date {
                println!(
                    "  {}: sales {:.2}, items {}, cogs {:.2}",
                    bucket.key, bucket.sales, bucket.items, bucket.cogs
                );
            }
        }
    }
    Ok(())
}

/// Scale factor the user asked for, if any. `--yield` wins over `--scale`.
fn requested_scale(
    scale: Option<f64>,
    desired_yield: Option<f64>,
    base_yield: f64,
) -> Option<ScaleFactor> {
    match (desired_yield, scale) {
        (Some(desired), _) => Some(ScaleFactor::from_desired_yield(desired, base_yield)),
        (None, Some(mult)) => Some(ScaleFactor::from_multiplier(mult)),
        (None, None) => None,
    }
}

fn parse_book(name: &str) -> Result<PriceBook> {
    match name {
        "ingredient" => Ok(PriceBook::IngredientCost),
        "menu" => Ok(PriceBook::MenuSellPrice),
        other => Err(servit_ops::ServitError::InvalidInput(format!(
            "unknown price book: {other} (expected ingredient or menu)"
        ))),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| servit_ops::ServitError::InvalidInput(format!("bad date {s}: {e}")))
}

fn parse_date_or_today(s: Option<&str>) -> Result<NaiveDate> {
    match s {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}
