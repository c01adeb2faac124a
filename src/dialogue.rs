//! The conversation engine: a per-owner state machine that collects an item
//! name, one-or-more category selections and one-or-more location selections,
//! then compiles and saves the tracked item. Every collector validates its
//! input against the keyboard it sent and re-prompts the same step on
//! anything else.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::channel::{Incoming, Reply};
use crate::compile;
use crate::db::Database;
use crate::error::{Result, VahtiError};
use crate::item::{valid_item_name, TrackedItem, MAX_ITEMS_PER_OWNER};
use crate::selection::{
    normalize_add, sort_for_output, CategorySelection, LocationSelection, Pick,
};
use crate::taxonomy::{self, Language, LocaleData, Messages};

/// Sent before the language prompt; no locale is known yet, so it is fixed.
const WELCOME: &str = "\u{1F44B} Hi! Welcome to Torivahti!\n\n\u{1F916} Torivahti notifies you when a new listing matching your saved search appears on tori.fi.\n\n<i>Torivahti is not affiliated with tori.fi or Schibsted Media Group.</i>";
const LANGUAGE_PROMPT: &str = "\u{1F4AC} Please select your preferred language:";
const INVALID_LANGUAGE: &str = "\u{2757} Please select a valid language.";

/// Where the next input for one owner will be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Language,
    MainMenu,
    Item,
    Category,
    Subcategory,
    ProductType,
    MoreCategories,
    Region,
    City,
    Area,
    MoreLocations,
    SettingsMenu,
    /// Abnormal termination; the next message starts a fresh session.
    Ended,
}

/// In-progress item data, fully consumed at save time.
#[derive(Debug, Default)]
struct Scratch {
    name: Option<String>,
    categories: Vec<CategorySelection>,
    locations: Vec<LocationSelection>,
    /// The category chain being filled in while walking the sub-prompts.
    open_category: Option<(String, Option<String>)>,
    /// The location chain being filled in.
    open_location: Option<(String, Option<String>)>,
}

#[derive(Debug)]
struct Session {
    state: State,
    scratch: Scratch,
}

impl Session {
    fn at(state: State) -> Self {
        Self {
            state,
            scratch: Scratch::default(),
        }
    }
}

/// The conversation engine. One instance serves all owners; turns for one
/// owner must arrive in order (the transport loop is single-threaded, which
/// guarantees that).
pub struct Dialogue {
    db: Database,
    reference_dir: PathBuf,
    sessions: HashMap<i64, Session>,
}

impl Dialogue {
    pub fn new(db: Database, reference_dir: PathBuf) -> Self {
        Self {
            db,
            reference_dir,
            sessions: HashMap::new(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Process one inbound event and produce the replies to deliver.
    pub fn handle(&mut self, owner: i64, event: &Incoming) -> Result<Vec<Reply>> {
        match event {
            Incoming::RemoveItem(id) => self.remove_item(owner, id),
            Incoming::Text(text) => self.handle_text(owner, text.trim()),
        }
    }

    fn handle_text(&mut self, owner: i64, text: &str) -> Result<Vec<Reply>> {
        let mut session = match self.sessions.remove(&owner) {
            Some(s) if s.state != State::Ended => s,
            // First contact (or a fresh start after an abnormal end): welcome,
            // then either the language picker or straight to the menu.
            _ => {
                return match self.db.get_language(owner)? {
                    Some(language) => {
                        let locale = self.load_locale(language)?;
                        self.sessions.insert(owner, Session::at(State::MainMenu));
                        Ok(vec![
                            Reply::text(WELCOME),
                            main_menu_reply(&locale.messages),
                        ])
                    }
                    None => {
                        self.sessions.insert(owner, Session::at(State::Language));
                        Ok(vec![Reply::text(WELCOME), language_prompt()])
                    }
                };
            }
        };

        let replies = self.step(owner, &mut session, text)?;
        if session.state != State::Ended {
            self.sessions.insert(owner, session);
        }
        Ok(replies)
    }

    fn step(&mut self, owner: i64, session: &mut Session, text: &str) -> Result<Vec<Reply>> {
        if session.state == State::Language {
            return self.on_language(owner, session, text);
        }

        let language = self.db.get_language(owner)?.unwrap_or(Language::English);
        let locale = self.load_locale(language)?;

        match session.state {
            State::Language | State::Ended => Ok(vec![]),
            State::MainMenu => self.on_main_menu(owner, session, text, &locale),
            State::Item => Ok(on_item(session, text, &locale)),
            State::Category => Ok(on_category(session, text, &locale)),
            State::Subcategory => Ok(on_subcategory(session, text, &locale)),
            State::ProductType => Ok(on_product_type(session, text, &locale)),
            State::MoreCategories => Ok(on_more_categories(session, text, &locale)),
            State::Region => Ok(on_region(session, text, &locale)),
            State::City => Ok(on_city(session, text, &locale)),
            State::Area => Ok(on_area(session, text, &locale)),
            State::MoreLocations => self.on_more_locations(owner, session, text, &locale, language),
            State::SettingsMenu => self.on_settings(owner, session, text, &locale),
        }
    }

    fn load_locale(&self, language: Language) -> Result<LocaleData> {
        taxonomy::load_locale(&self.reference_dir, language)
    }

    // ---------- collectors ----------

    fn on_language(&mut self, owner: i64, session: &mut Session, text: &str) -> Result<Vec<Reply>> {
        match Language::from_choice(text) {
            Some(language) => {
                self.db.set_language(owner, language)?;
                let locale = self.load_locale(language)?;
                session.state = State::MainMenu;
                Ok(vec![main_menu_reply(&locale.messages)])
            }
            None => Ok(vec![Reply::text(INVALID_LANGUAGE), language_prompt()]),
        }
    }

    fn on_main_menu(
        &mut self,
        owner: i64,
        session: &mut Session,
        text: &str,
        locale: &LocaleData,
    ) -> Result<Vec<Reply>> {
        let m = &locale.messages;
        if text == m.add_item {
            // Admission gate: never enter the item flow over the cap, and
            // leave no scratch behind.
            if self.db.count_items(owner)? >= MAX_ITEMS_PER_OWNER {
                let notice = m
                    .item_limit
                    .replace("{max}", &MAX_ITEMS_PER_OWNER.to_string());
                return Ok(vec![Reply::text(notice), main_menu_reply(m)]);
            }
            session.scratch = Scratch::default();
            session.state = State::Item;
            Ok(vec![Reply::text(&m.lets_add), Reply::text(&m.enter_item)])
        } else if text == m.items {
            self.items_list(owner, locale)
        } else if text == m.settings {
            session.state = State::SettingsMenu;
            Ok(vec![settings_reply(m)])
        } else {
            Ok(vec![Reply::text(&m.invalid_choice), main_menu_reply(m)])
        }
    }

    fn items_list(&self, owner: i64, locale: &LocaleData) -> Result<Vec<Reply>> {
        let m = &locale.messages;
        let items = self.db.list_items_by_owner(owner)?;
        if items.is_empty() {
            return Ok(vec![Reply::text(&m.no_items)]);
        }

        let mut replies = vec![Reply::text(&m.items_list)];
        for item in items {
            replies.push(Reply::item_card(
                item_card_text(&item, m),
                &m.remove_item,
                item.id.to_string(),
            ));
        }
        Ok(replies)
    }

    fn on_more_locations(
        &mut self,
        owner: i64,
        session: &mut Session,
        text: &str,
        locale: &LocaleData,
        language: Language,
    ) -> Result<Vec<Reply>> {
        let m = &locale.messages;
        if text == m.yes {
            session.state = State::Region;
            Ok(vec![region_reply(locale)])
        } else if text == m.no {
            if session.scratch.locations.is_empty() {
                session.state = State::Region;
                Ok(vec![Reply::text(&m.need_location), region_reply(locale)])
            } else {
                self.save(owner, session, locale, language)
            }
        } else {
            Ok(vec![Reply::text(&m.invalid_choice), yes_no_reply(&m.add_more_locations, m)])
        }
    }

    /// Terminal step: compile, persist, confirm.
    fn save(
        &mut self,
        owner: i64,
        session: &mut Session,
        locale: &LocaleData,
        language: Language,
    ) -> Result<Vec<Reply>> {
        let m = &locale.messages;
        let scratch = std::mem::take(&mut session.scratch);

        let mut missing = Vec::new();
        if scratch.name.is_none() {
            missing.push("item");
        }
        if scratch.categories.is_empty() {
            missing.push("categories");
        }
        if scratch.locations.is_empty() {
            missing.push("locations");
        }
        if !missing.is_empty() {
            session.state = State::Ended;
            return Ok(vec![Reply::text(
                m.missing_data.replace("{missing}", &missing.join(", ")),
            )]);
        }

        let name = scratch.name.unwrap_or_default();
        let mut categories = scratch.categories;
        let mut locations = scratch.locations;
        sort_for_output(&mut categories);
        sort_for_output(&mut locations);

        let link = match compile::build_link(
            &name,
            &categories,
            &locations,
            &locale.categories,
            &locale.locations,
            language,
        ) {
            Ok(link) => link,
            // Selection/taxonomy inconsistency: fatal to this save attempt,
            // surfaced generically.
            Err(e @ VahtiError::Lookup { .. }) => {
                eprintln!("  [ERROR] save for owner {owner} failed: {e}");
                session.state = State::MainMenu;
                return Ok(vec![Reply::text(&m.save_failed), main_menu_reply(m)]);
            }
            Err(e) => return Err(e),
        };

        let item = TrackedItem::new(owner, name, categories, locations, link);
        self.db.insert_item(&item)?;

        let mut confirmation = String::from(&m.item_added);
        confirmation.push('\n');
        confirmation.push_str(&item_card_text(&item, m));

        session.state = State::MainMenu;
        Ok(vec![Reply::text(confirmation), main_menu_reply(m)])
    }

    fn on_settings(
        &mut self,
        owner: i64,
        session: &mut Session,
        text: &str,
        locale: &LocaleData,
    ) -> Result<Vec<Reply>> {
        let m = &locale.messages;
        if text == m.change_language {
            self.db.delete_language(owner)?;
            session.state = State::Language;
            Ok(vec![Reply::text(&m.change_language_prompt), language_prompt()])
        } else if text == m.contact {
            // informational only, no state change
            Ok(vec![Reply::text(&m.contact_prompt)])
        } else if text == m.back {
            session.state = State::MainMenu;
            Ok(vec![main_menu_reply(m)])
        } else {
            Ok(vec![Reply::text(&m.invalid_choice), settings_reply(m)])
        }
    }

    fn remove_item(&mut self, owner: i64, id: &str) -> Result<Vec<Reply>> {
        let language = self.db.get_language(owner)?.unwrap_or(Language::English);
        let m = taxonomy::load_messages(&self.reference_dir, language)?;

        match self.db.get_item(id)? {
            Some(item) if item.owner_id == owner => {
                self.db.delete_item(&item.id)?;
                Ok(vec![Reply::text(m.item_removed.replace("{item}", &item.name))])
            }
            _ => Ok(vec![Reply::text(&m.item_not_found)]),
        }
    }
}

// ---------- stateless collectors ----------

fn on_item(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    if !valid_item_name(text) {
        return vec![Reply::text(&m.invalid_item), Reply::text(&m.enter_item)];
    }
    session.scratch.name = Some(text.to_string());
    session.state = State::Category;
    vec![category_reply(locale)]
}

fn on_category(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    if text == m.all_categories {
        normalize_add(&mut session.scratch.categories, CategorySelection::any());
        session.state = State::MoreCategories;
        return vec![yes_no_reply(&m.add_more_categories, m)];
    }
    match locale.categories.category(text) {
        Some(category) if category.subcategories.is_empty() => {
            // no children: synthesize the lower-level wildcards and move on
            push_category(session, text, None, None);
            vec![yes_no_reply(&m.add_more_categories, m)]
        }
        Some(_) => {
            session.scratch.open_category = Some((text.to_string(), None));
            session.state = State::Subcategory;
            vec![subcategory_reply(text, locale)]
        }
        None => vec![Reply::text(&m.invalid_choice), category_reply(locale)],
    }
}

fn on_subcategory(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    let Some((category_name, _)) = session.scratch.open_category.clone() else {
        session.state = State::Category;
        return vec![category_reply(locale)];
    };

    if text == m.all_subcategories {
        push_category(session, &category_name, None, None);
        return vec![yes_no_reply(&m.add_more_categories, m)];
    }

    let subcategory = locale
        .categories
        .category(&category_name)
        .and_then(|c| c.subcategory(text));
    match subcategory {
        Some(sub) if sub.product_types.is_empty() => {
            push_category(session, &category_name, Some(text), None);
            vec![yes_no_reply(&m.add_more_categories, m)]
        }
        Some(_) => {
            session.scratch.open_category = Some((category_name.clone(), Some(text.to_string())));
            session.state = State::ProductType;
            vec![product_type_reply(&category_name, text, locale)]
        }
        None => vec![
            Reply::text(&m.invalid_choice),
            subcategory_reply(&category_name, locale),
        ],
    }
}

fn on_product_type(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    let Some((category_name, Some(sub_name))) = session.scratch.open_category.clone() else {
        session.state = State::Category;
        return vec![category_reply(locale)];
    };

    if text == m.all_product_types {
        push_category(session, &category_name, Some(&sub_name), None);
        return vec![yes_no_reply(&m.add_more_categories, m)];
    }

    let known = locale
        .categories
        .category(&category_name)
        .and_then(|c| c.subcategory(&sub_name))
        .and_then(|s| s.product_type(text))
        .is_some();
    if known {
        push_category(session, &category_name, Some(&sub_name), Some(text));
        vec![yes_no_reply(&m.add_more_categories, m)]
    } else {
        vec![
            Reply::text(&m.invalid_choice),
            product_type_reply(&category_name, &sub_name, locale),
        ]
    }
}

fn on_more_categories(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    if text == m.yes {
        session.state = State::Category;
        vec![category_reply(locale)]
    } else if text == m.no {
        if session.scratch.categories.is_empty() {
            session.state = State::Category;
            vec![Reply::text(&m.need_category), category_reply(locale)]
        } else {
            session.state = State::Region;
            vec![region_reply(locale)]
        }
    } else {
        vec![
            Reply::text(&m.invalid_choice),
            yes_no_reply(&m.add_more_categories, m),
        ]
    }
}

fn on_region(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    if text == m.whole_country {
        normalize_add(
            &mut session.scratch.locations,
            LocationSelection::whole_country(),
        );
        session.state = State::MoreLocations;
        return vec![yes_no_reply(&m.add_more_locations, m)];
    }
    match locale.locations.region(text) {
        Some(region) if region.cities.is_empty() => {
            push_location(session, text, None, None);
            vec![yes_no_reply(&m.add_more_locations, m)]
        }
        Some(_) => {
            session.scratch.open_location = Some((text.to_string(), None));
            session.state = State::City;
            vec![city_reply(text, locale)]
        }
        None => vec![Reply::text(&m.invalid_choice), region_reply(locale)],
    }
}

fn on_city(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    let Some((region_name, _)) = session.scratch.open_location.clone() else {
        session.state = State::Region;
        return vec![region_reply(locale)];
    };

    if text == m.all_cities {
        push_location(session, &region_name, None, None);
        return vec![yes_no_reply(&m.add_more_locations, m)];
    }

    let city = locale
        .locations
        .region(&region_name)
        .and_then(|r| r.city(text));
    match city {
        Some(city) if city.areas.is_empty() => {
            // city has no areas: skip the area prompt entirely
            push_location(session, &region_name, Some(text), None);
            vec![yes_no_reply(&m.add_more_locations, m)]
        }
        Some(_) => {
            session.scratch.open_location = Some((region_name.clone(), Some(text.to_string())));
            session.state = State::Area;
            vec![area_reply(&region_name, text, locale)]
        }
        None => vec![
            Reply::text(&m.invalid_choice),
            city_reply(&region_name, locale),
        ],
    }
}

fn on_area(session: &mut Session, text: &str, locale: &LocaleData) -> Vec<Reply> {
    let m = &locale.messages;
    let Some((region_name, Some(city_name))) = session.scratch.open_location.clone() else {
        session.state = State::Region;
        return vec![region_reply(locale)];
    };

    if text == m.all_areas {
        push_location(session, &region_name, Some(&city_name), None);
        return vec![yes_no_reply(&m.add_more_locations, m)];
    }

    let known = locale
        .locations
        .region(&region_name)
        .and_then(|r| r.city(&city_name))
        .and_then(|c| c.area(text))
        .is_some();
    if known {
        push_location(session, &region_name, Some(&city_name), Some(text));
        vec![yes_no_reply(&m.add_more_locations, m)]
    } else {
        vec![
            Reply::text(&m.invalid_choice),
            area_reply(&region_name, &city_name, locale),
        ]
    }
}

// ---------- scratch helpers ----------

fn pick(name: Option<&str>) -> Pick {
    match name {
        Some(n) => Pick::named(n),
        None => Pick::Any,
    }
}

fn push_category(session: &mut Session, category: &str, sub: Option<&str>, product: Option<&str>) {
    normalize_add(
        &mut session.scratch.categories,
        CategorySelection {
            category: Pick::named(category),
            subcategory: pick(sub),
            product_type: pick(product),
        },
    );
    session.scratch.open_category = None;
    session.state = State::MoreCategories;
}

fn push_location(session: &mut Session, region: &str, city: Option<&str>, area: Option<&str>) {
    normalize_add(
        &mut session.scratch.locations,
        LocationSelection {
            region: Pick::named(region),
            city: pick(city),
            area: pick(area),
        },
    );
    session.scratch.open_location = None;
    session.state = State::MoreLocations;
}

// ---------- reply builders ----------

fn language_prompt() -> Reply {
    Reply::with_keyboard(
        LANGUAGE_PROMPT,
        vec![Language::ALL
            .iter()
            .map(|l| l.choice_label().to_string())
            .collect()],
    )
}

fn main_menu_reply(m: &Messages) -> Reply {
    Reply::with_keyboard(
        &m.menu,
        vec![vec![
            m.add_item.clone(),
            m.items.clone(),
            m.settings.clone(),
        ]],
    )
}

fn settings_reply(m: &Messages) -> Reply {
    Reply::with_options(
        &m.settings_menu,
        [
            m.change_language.clone(),
            m.contact.clone(),
            m.back.clone(),
        ],
    )
}

fn yes_no_reply(prompt: &str, m: &Messages) -> Reply {
    Reply::with_keyboard(prompt, vec![vec![m.yes.clone(), m.no.clone()]])
}

/// Option grids mirror the valid domain: the wildcard first, then the
/// taxonomy names in file order.
fn option_rows(wildcard: &str, names: impl Iterator<Item = String>) -> Vec<Vec<String>> {
    std::iter::once(wildcard.to_string())
        .chain(names)
        .map(|name| vec![name])
        .collect()
}

fn category_reply(locale: &LocaleData) -> Reply {
    let m = &locale.messages;
    Reply::with_keyboard(
        &m.select_category,
        option_rows(
            &m.all_categories,
            locale.categories.names().map(String::from),
        ),
    )
}

fn subcategory_reply(category: &str, locale: &LocaleData) -> Reply {
    let m = &locale.messages;
    let names: Vec<String> = locale
        .categories
        .category(category)
        .map(|c| c.subcategories.iter().map(|s| s.name.clone()).collect())
        .unwrap_or_else(Vec::new);
    Reply::with_keyboard(
        &m.select_subcategory,
        option_rows(&m.all_subcategories, names.into_iter()),
    )
}

fn product_type_reply(category: &str, subcategory: &str, locale: &LocaleData) -> Reply {
    let m = &locale.messages;
    let names: Vec<String> = locale
        .categories
        .category(category)
        .and_then(|c| c.subcategory(subcategory))
        .map(|s| s.product_types.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_else(Vec::new);
    Reply::with_keyboard(
        &m.select_product_type,
        option_rows(&m.all_product_types, names.into_iter()),
    )
}

fn region_reply(locale: &LocaleData) -> Reply {
    let m = &locale.messages;
    Reply::with_keyboard(
        &m.select_region,
        option_rows(&m.whole_country, locale.locations.names().map(String::from)),
    )
}

fn city_reply(region: &str, locale: &LocaleData) -> Reply {
    let m = &locale.messages;
    let names: Vec<String> = locale
        .locations
        .region(region)
        .map(|r| r.cities.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_else(Vec::new);
    Reply::with_keyboard(&m.select_city, option_rows(&m.all_cities, names.into_iter()))
}

fn area_reply(region: &str, city: &str, locale: &LocaleData) -> Reply {
    let m = &locale.messages;
    let names: Vec<String> = locale
        .locations
        .region(region)
        .and_then(|r| r.city(city))
        .map(|c| c.areas.iter().map(|a| a.name.clone()).collect())
        .unwrap_or_else(Vec::new);
    Reply::with_keyboard(&m.select_area, option_rows(&m.all_areas, names.into_iter()))
}

/// One saved item rendered for the items list and the save confirmation.
fn item_card_text(item: &TrackedItem, m: &Messages) -> String {
    let mut text = compile::render_summary(&item.name, &item.categories, &item.locations, m);
    text.push_str(
        &m.added_time
            .replace("{time}", &item.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    text
}
