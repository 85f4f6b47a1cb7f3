//! Per-user culinary preferences
//!
//! Favorites, a capped recently-viewed list, label print quantity, and the
//! viewer role. Persisted as JSON so a station tablet keeps its state across
//! restarts; tests swap in the in-memory backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use crate::Result;

/// Recently-viewed list cap
pub const RECENT_CAP: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub favorites: BTreeSet<String>,
    /// Most recent first, capped at [`RECENT_CAP`]
    #[serde(default)]
    pub recently_viewed: Vec<String>,
    #[serde(default = "default_print_quantity")]
    pub print_quantity: u32,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_print_quantity() -> u32 {
    1
}

fn default_role() -> String {
    "cook".to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            favorites: BTreeSet::new(),
            recently_viewed: Vec::new(),
            print_quantity: default_print_quantity(),
            role: default_role(),
        }
    }
}

impl Preferences {
    /// Returns true when the item is now a favorite
    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        if self.favorites.remove(id) {
            false
        } else {
            self.favorites.insert(id.to_string());
            true
        }
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.contains(id)
    }

    /// Push to the front of the recently-viewed list, deduplicating and
    /// dropping the oldest entry past the cap.
    pub fn mark_viewed(&mut self, id: &str) {
        self.recently_viewed.retain(|r| r != id);
        self.recently_viewed.insert(0, id.to_string());
        self.recently_viewed.truncate(RECENT_CAP);
    }
}

/// Where preferences live between sessions
pub trait PrefsBackend {
    fn load(&self) -> Result<Preferences>;
    fn save(&mut self, prefs: &Preferences) -> Result<()>;
}

/// Non-persistent backend for tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    prefs: Preferences,
}

impl PrefsBackend for MemoryBackend {
    fn load(&self) -> Result<Preferences> {
        Ok(self.prefs.clone())
    }

    fn save(&mut self, prefs: &Preferences) -> Result<()> {
        self.prefs = prefs.clone();
        Ok(())
    }
}

/// JSON file backend, one file per user
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the platform config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("servit")
            .join("prefs.json")
    }
}

impl PrefsBackend for FileBackend {
    /// Missing file reads as defaults so first launch needs no setup step.
    fn load(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&mut self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(prefs)?)?;
        log::debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }
}
