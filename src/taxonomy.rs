//! Read-only reference data: per-locale category/location taxonomies and the
//! message catalog. Files live under the data directory as
//! `categories/<locale>.json`, `locations/<locale>.json`,
//! `messages/<locale>.json` and are loaded fresh per call; the data is static
//! per deployment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VahtiError};

/// Supported interface languages. The database stores the short key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    English,
    Finnish,
    Ukrainian,
    Russian,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::English,
        Language::Finnish,
        Language::Ukrainian,
        Language::Russian,
    ];

    /// Locale key used for file names and the preference row.
    pub fn key(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Finnish => "fi",
            Language::Ukrainian => "uk",
            Language::Russian => "ru",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.key() == key)
    }

    /// Label shown on the language keyboard.
    pub fn choice_label(self) -> &'static str {
        match self {
            Language::English => "\u{1F1EC}\u{1F1E7} English",
            Language::Finnish => "\u{1F1EB}\u{1F1EE} Suomi",
            Language::Ukrainian => "\u{1F1FA}\u{1F1E6} \u{423}\u{43A}\u{440}\u{430}\u{457}\u{43D}\u{441}\u{44C}\u{43A}\u{430}",
            Language::Russian => "\u{1F1F7}\u{1F1FA} \u{420}\u{443}\u{441}\u{441}\u{43A}\u{438}\u{439}",
        }
    }

    pub fn from_choice(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.choice_label() == text)
    }
}

// ---------- Category taxonomy ----------

#[derive(Debug, Clone, Deserialize)]
pub struct ProductType {
    pub name: String,
    pub code: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subcategory {
    pub name: String,
    pub code: i64,
    #[serde(default)]
    pub product_types: Vec<ProductType>,
}

impl Subcategory {
    pub fn product_type(&self, name: &str) -> Option<&ProductType> {
        self.product_types.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub name: String,
    pub code: i64,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

impl Category {
    pub fn subcategory(&self, name: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.name == name)
    }
}

/// Ordered category > subcategory > product type tree for one locale.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CategoryTree {
    pub categories: Vec<Category>,
}

impl CategoryTree {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }
}

// ---------- Location taxonomy ----------

#[derive(Debug, Clone, Deserialize)]
pub struct Area {
    pub name: String,
    pub code: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct City {
    pub name: String,
    pub code: i64,
    #[serde(default)]
    pub areas: Vec<Area>,
}

impl City {
    pub fn area(&self, name: &str) -> Option<&Area> {
        self.areas.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub name: String,
    pub code: i64,
    #[serde(default)]
    pub cities: Vec<City>,
}

impl Region {
    pub fn city(&self, name: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.name == name)
    }
}

/// Ordered region > city > area tree for one locale.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct LocationTree {
    pub regions: Vec<Region>,
}

impl LocationTree {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }
}

// ---------- Message catalog ----------

/// Localized interface strings. Placeholders like `{item}` are substituted
/// with `str::replace` at the call site. A missing key is a load-time error,
/// not a runtime fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct Messages {
    pub menu: String,
    pub add_item: String,
    pub items: String,
    pub settings: String,
    pub lets_add: String,
    pub enter_item: String,
    pub invalid_item: String,
    pub item_limit: String,
    pub select_category: String,
    pub select_subcategory: String,
    pub select_product_type: String,
    pub select_region: String,
    pub select_city: String,
    pub select_area: String,
    pub add_more_categories: String,
    pub add_more_locations: String,
    pub yes: String,
    pub no: String,
    pub invalid_choice: String,
    pub need_category: String,
    pub need_location: String,
    pub missing_data: String,
    pub save_failed: String,
    pub item_added: String,
    pub item_line: String,
    pub category_line: String,
    pub locations_header: String,
    pub location_line: String,
    pub added_time: String,
    pub items_list: String,
    pub no_items: String,
    pub remove_item: String,
    pub item_removed: String,
    pub item_not_found: String,
    pub settings_menu: String,
    pub change_language: String,
    pub contact: String,
    pub back: String,
    pub change_language_prompt: String,
    pub contact_prompt: String,
    pub new_listing: String,
    pub all_categories: String,
    pub all_subcategories: String,
    pub all_product_types: String,
    pub whole_country: String,
    pub all_cities: String,
    pub all_areas: String,
}

impl Messages {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------- Loaders ----------

fn locale_path(dir: &Path, kind: &str, language: Language) -> PathBuf {
    dir.join(kind).join(format!("{}.json", language.key()))
}

fn read_locale_file(dir: &Path, kind: &str, language: Language) -> Result<String> {
    let path = locale_path(dir, kind, language);
    if !path.exists() {
        return Err(VahtiError::LocaleNotFound(format!(
            "{}/{}",
            kind,
            language.key()
        )));
    }
    Ok(std::fs::read_to_string(&path)?)
}

pub fn load_categories(dir: &Path, language: Language) -> Result<CategoryTree> {
    CategoryTree::from_json(&read_locale_file(dir, "categories", language)?)
}

pub fn load_locations(dir: &Path, language: Language) -> Result<LocationTree> {
    LocationTree::from_json(&read_locale_file(dir, "locations", language)?)
}

pub fn load_messages(dir: &Path, language: Language) -> Result<Messages> {
    Messages::from_json(&read_locale_file(dir, "messages", language)?)
}

/// Everything the conversation engine needs for one locale, loaded together.
#[derive(Debug, Clone)]
pub struct LocaleData {
    pub categories: CategoryTree,
    pub locations: LocationTree,
    pub messages: Messages,
}

pub fn load_locale(dir: &Path, language: Language) -> Result<LocaleData> {
    Ok(LocaleData {
        categories: load_categories(dir, language)?,
        locations: load_locations(dir, language)?,
        messages: load_messages(dir, language)?,
    })
}
