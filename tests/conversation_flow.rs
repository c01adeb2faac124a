//! End-to-end conversation exercises against the real locale data files,
//! with an in-memory database and no network.

use std::path::PathBuf;

use torivahti::channel::{Incoming, Reply};
use torivahti::db::Database;
use torivahti::dialogue::Dialogue;
use torivahti::selection::{CategorySelection, LocationSelection, Pick};
use torivahti::taxonomy::{self, Language, Messages};

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

fn engine() -> Dialogue {
    Dialogue::new(Database::open_in_memory().unwrap(), data_dir())
}

fn msgs(language: Language) -> Messages {
    taxonomy::load_messages(&data_dir(), language).unwrap()
}

fn say(d: &mut Dialogue, owner: i64, text: &str) -> Vec<Reply> {
    d.handle(owner, &Incoming::Text(text.to_string())).unwrap()
}

#[test]
fn full_add_list_remove_flow() {
    let mut d = engine();
    let m = msgs(Language::English);
    let owner = 100;

    // first contact: welcome, then the language picker
    let replies = say(&mut d, owner, "/start");
    assert_eq!(replies.len(), 2);
    assert!(replies[1].keyboard.is_some());

    // pick English, land in the main menu
    let replies = say(&mut d, owner, Language::English.choice_label());
    assert_eq!(replies[0].text, m.menu);

    // add an item
    let replies = say(&mut d, owner, &m.add_item);
    assert_eq!(replies[1].text, m.enter_item);
    let replies = say(&mut d, owner, "Bicycle");

    // category keyboard: wildcard first, then the taxonomy in file order
    let keyboard = replies[0].keyboard.as_ref().unwrap();
    assert_eq!(keyboard[0], vec![m.all_categories.clone()]);
    assert!(keyboard.iter().any(|row| row[0] == "Vehicles and parts"));

    say(&mut d, owner, "Vehicles and parts");
    say(&mut d, owner, "Bicycles");
    let replies = say(&mut d, owner, &m.all_product_types);
    // yes/no prompt for more categories
    assert_eq!(replies[0].text, m.add_more_categories);

    let replies = say(&mut d, owner, &m.no);
    assert_eq!(replies[0].text, m.select_region);

    say(&mut d, owner, "Uusimaa");
    say(&mut d, owner, "Helsinki");
    let replies = say(&mut d, owner, &m.all_areas);
    assert_eq!(replies[0].text, m.add_more_locations);

    // finish: confirmation summary plus the menu
    let replies = say(&mut d, owner, &m.no);
    assert!(replies[0].text.contains("Bicycle"));
    assert!(replies[0].text.contains("Vehicles and parts > Bicycles"));
    assert!(replies[0].text.contains("Uusimaa, Helsinki"));
    assert_eq!(replies[1].text, m.menu);

    // the compiled link carries the most specific codes
    let items = d.db().list_items_by_owner(owner).unwrap();
    assert_eq!(items.len(), 1);
    let link = &items[0].link;
    assert!(link.contains("q=bicycle"));
    assert!(link.contains("sub_category=2100"));
    assert!(!link.contains("product_category="));
    assert!(link.contains("location=20004"));
    assert!(link.ends_with("sort=PUBLISHED_DESC"));

    // list the items: one card with a remove action
    let replies = say(&mut d, owner, &m.items);
    assert_eq!(replies[0].text, m.items_list);
    let card = &replies[1];
    assert!(card.text.contains("Bicycle"));
    let remove = card.remove.as_ref().unwrap();
    assert_eq!(remove.label, m.remove_item);

    // remove it through the inline action
    let item_id = remove.item_id.clone();
    let replies = d.handle(owner, &Incoming::RemoveItem(item_id)).unwrap();
    assert!(replies[0].text.contains("Bicycle"));
    assert!(d.db().list_items_by_owner(owner).unwrap().is_empty());

    let replies = say(&mut d, owner, &m.items);
    assert_eq!(replies[0].text, m.no_items);
}

#[test]
fn category_wildcard_with_city_location() {
    let mut d = engine();
    let m = msgs(Language::English);
    let owner = 104;

    say(&mut d, owner, "/start");
    say(&mut d, owner, Language::English.choice_label());
    say(&mut d, owner, &m.add_item);
    say(&mut d, owner, "bicycle");

    say(&mut d, owner, &m.all_categories);
    say(&mut d, owner, &m.no);
    say(&mut d, owner, "Uusimaa");
    say(&mut d, owner, "Helsinki");
    say(&mut d, owner, &m.all_areas);
    say(&mut d, owner, &m.no);

    let items = d.db().list_items_by_owner(owner).unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.categories, vec![CategorySelection::any()]);
    assert_eq!(
        item.locations,
        vec![LocationSelection {
            region: Pick::named("Uusimaa"),
            city: Pick::named("Helsinki"),
            area: Pick::Any,
        }]
    );
    assert!(item.link.contains("q=bicycle"));
    // city code only, no category filter of any kind
    assert!(item.link.contains("location=20004"));
    assert!(!item.link.contains("category"));
}

#[test]
fn wildcard_subsumes_earlier_selections() {
    let mut d = engine();
    let m = msgs(Language::English);
    let owner = 101;

    say(&mut d, owner, "/start");
    say(&mut d, owner, Language::English.choice_label());
    say(&mut d, owner, &m.add_item);
    say(&mut d, owner, "old camera");

    // a fully concrete category first
    say(&mut d, owner, "Electronics");
    say(&mut d, owner, "Phones and accessories");
    say(&mut d, owner, "Smartphones");
    // then the top-level wildcard, which swallows it
    say(&mut d, owner, &m.yes);
    say(&mut d, owner, &m.all_categories);
    say(&mut d, owner, &m.no);

    // one concrete city, then the whole country
    say(&mut d, owner, "Pirkanmaa");
    say(&mut d, owner, "Tampere");
    say(&mut d, owner, &m.yes);
    say(&mut d, owner, &m.whole_country);
    let replies = say(&mut d, owner, &m.no);

    // the summary shows only the wildcard lines
    assert!(replies[0].text.contains(&m.all_categories));
    assert!(replies[0].text.contains(&m.whole_country));
    assert!(!replies[0].text.contains("Smartphones"));
    assert!(!replies[0].text.contains("Tampere"));

    // and the link has no category or location filters at all
    let items = d.db().list_items_by_owner(owner).unwrap();
    let link = &items[0].link;
    assert!(link.contains("q=old%20camera") || link.contains("q=old+camera"));
    assert!(!link.contains("category"));
    assert!(!link.contains("location="));
}

#[test]
fn invalid_choices_and_childless_levels() {
    let mut d = engine();
    let m = msgs(Language::English);
    let owner = 102;

    say(&mut d, owner, "/start");
    say(&mut d, owner, Language::English.choice_label());
    say(&mut d, owner, &m.add_item);
    say(&mut d, owner, "guitar amp");

    // answer something invalid at the category step, then a category with
    // no product types (two-level branch)
    let replies = say(&mut d, owner, "No such category");
    assert_eq!(replies[0].text, m.invalid_choice);
    say(&mut d, owner, "Hobbies and sports");
    let replies = say(&mut d, owner, "Musical instruments");
    // childless subcategory skips the product type prompt
    assert_eq!(replies[0].text, m.add_more_categories);
    say(&mut d, owner, &m.no);

    let replies = say(&mut d, owner, "Lappi");
    assert_eq!(replies[0].text, m.select_city);
    let replies = say(&mut d, owner, "Rovaniemi");
    // city without areas skips the area prompt
    assert_eq!(replies[0].text, m.add_more_locations);
    let replies = say(&mut d, owner, &m.no);
    assert!(replies[0].text.contains("guitar amp"));

    let items = d.db().list_items_by_owner(owner).unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].link.contains("sub_category=6200"));
    assert!(items[0].link.contains("location=20061"));
}

#[test]
fn finnish_conversation_uses_finnish_taxonomy() {
    let mut d = engine();
    let m = msgs(Language::Finnish);
    let owner = 103;

    say(&mut d, owner, "/start");
    say(&mut d, owner, Language::Finnish.choice_label());
    say(&mut d, owner, &m.add_item);
    say(&mut d, owner, "polkupyörä");

    say(&mut d, owner, "Ajoneuvot ja osat");
    say(&mut d, owner, "Polkupyörät");
    say(&mut d, owner, "Sähköpyörät");
    say(&mut d, owner, &m.no);
    say(&mut d, owner, "Uusimaa");
    say(&mut d, owner, "Espoo");
    let replies = say(&mut d, owner, &m.no);
    assert!(replies[0].text.contains("Ajoneuvot ja osat > Polkupyörät > Sähköpyörät"));

    // same codes as the English taxonomy, most specific level wins
    let items = d.db().list_items_by_owner(owner).unwrap();
    assert!(items[0].link.contains("product_category=2103"));
    assert!(items[0].link.contains("location=20005"));
}
