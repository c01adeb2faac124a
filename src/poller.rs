//! Recurring poll cycle: fetch each tracked item's search link, diff against
//! the item's watermark, push a notification per fresh listing, then advance
//! the watermark. Failures are isolated per item so one broken search or one
//! unreachable recipient never stalls the cycle.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use colored::Colorize;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::channel::{escape_html, ChatChannel, DeliveryError, Reply};
use crate::db::Database;
use crate::error::Result;
use crate::taxonomy::{self, Language, Messages};

/// Default HTTP request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Shared HTTP agent for connection pooling
static HTTP_AGENT: Lazy<ureq::Agent> = Lazy::new(|| {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
        .build()
        .into()
});

/// One marketplace listing, already reduced to what notifications need.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub published: DateTime<Utc>,
    pub heading: String,
    pub location: String,
    pub url: String,
    pub price: Option<i64>,
    pub image_url: Option<String>,
}

// Wire shape of the search endpoint. Every field is optional; a document
// without a timestamp cannot be diffed and is dropped.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<Doc>,
}

#[derive(Debug, Deserialize)]
struct Doc {
    timestamp: Option<i64>,
    heading: Option<String>,
    location: Option<String>,
    canonical_url: Option<String>,
    price: Option<Price>,
    image: Option<Image>,
}

#[derive(Debug, Deserialize)]
struct Price {
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: Option<String>,
}

fn doc_to_listing(doc: Doc) -> Option<Listing> {
    let millis = doc.timestamp?;
    let published = Utc.timestamp_millis_opt(millis).single()?;
    Some(Listing {
        published,
        heading: doc.heading.unwrap_or_default(),
        location: doc.location.unwrap_or_default(),
        url: doc.canonical_url.unwrap_or_default(),
        price: doc.price.and_then(|p| p.amount),
        image_url: doc.image.and_then(|i| i.url),
    })
}

/// Where listings come from. Injected into the cycle so tests can script
/// results without a network.
pub trait ListingSource {
    fn fetch(&self, link: &str) -> Result<Vec<Listing>>;
}

/// The real source: GET the compiled search link, parse the `docs` array.
pub struct HttpSource;

impl ListingSource for HttpSource {
    fn fetch(&self, link: &str) -> Result<Vec<Listing>> {
        let response = HTTP_AGENT.get(link).call()?;
        let body: SearchResponse = response.into_body().read_json()?;
        Ok(body.docs.into_iter().filter_map(doc_to_listing).collect())
    }
}

/// Render one fresh listing with the owner's message catalog.
fn render_listing(item_name: &str, listing: &Listing, m: &Messages) -> Reply {
    let price = match listing.price {
        Some(amount) => format!("{amount} \u{20AC}"),
        None => String::new(),
    };
    let text = m
        .new_listing
        .replace("{item}", &escape_html(item_name))
        .replace("{heading}", &escape_html(&listing.heading))
        .replace("{price}", &price)
        .replace("{location}", &escape_html(&listing.location))
        .replace("{url}", &listing.url);

    match &listing.image_url {
        Some(url) => Reply::photo(url, text),
        None => Reply::text(text),
    }
}

/// One poll cycle over every tracked item. Never returns early because of a
/// single item; only a database failure on the initial listing aborts it.
pub fn run_cycle(
    db: &Database,
    source: &dyn ListingSource,
    channel: &dyn ChatChannel,
    reference_dir: &Path,
) -> Result<()> {
    let items = db.list_items()?;
    let mut catalogs: HashMap<Language, Messages> = HashMap::new();
    let mut blocked: HashSet<i64> = HashSet::new();

    for item in items {
        if blocked.contains(&item.owner_id) {
            continue;
        }

        let language = db
            .get_language(item.owner_id)
            .unwrap_or(None)
            .unwrap_or(Language::English);
        let messages = match catalogs.entry(language) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                match taxonomy::load_messages(reference_dir, language) {
                    Ok(m) => e.insert(m),
                    Err(err) => {
                        eprintln!("  [ERROR] locale {}: {}", language.key(), err);
                        continue;
                    }
                }
            }
        };

        let mut listings = match source.fetch(&item.link) {
            Ok(listings) => listings,
            Err(err) => {
                eprintln!("  [ERROR] {}: {}", item.name, err);
                continue;
            }
        };

        // Strictly newer than the watermark; everything at or before it has
        // already been notified (or predates the item).
        let watermark = item.watermark();
        listings.retain(|l| l.published > watermark);
        listings.sort_by_key(|l| l.published);

        if listings.is_empty() {
            continue;
        }
        println!(
            "  {} {}: {} new listing(s)",
            "\u{2713}".green(),
            item.name,
            listings.len()
        );

        let mut seen_through: Option<DateTime<Utc>> = None;
        for listing in &listings {
            let reply = render_listing(&item.name, listing, messages);
            match channel.send(item.owner_id, &reply) {
                Ok(()) => {
                    seen_through = Some(listing.published);
                }
                Err(DeliveryError::Blocked) => {
                    blocked.insert(item.owner_id);
                    match db.delete_items_by_owner(item.owner_id) {
                        Ok(dropped) => println!(
                            "  {} owner {} unreachable, dropped {} item(s)",
                            "\u{2717}".red(),
                            item.owner_id,
                            dropped
                        ),
                        // rows survive; the next cycle hits Blocked again
                        Err(err) => eprintln!("  [ERROR] {}: {}", item.name, err),
                    }
                    seen_through = None;
                    break;
                }
                Err(DeliveryError::BadRequest(reason)) => {
                    // this one payload is unsendable, never retry it
                    eprintln!("  [ERROR] {}: rejected notification: {}", item.name, reason);
                    seen_through = Some(listing.published);
                }
                Err(DeliveryError::Other(reason)) => {
                    // not recorded, though a later send still advances past it
                    eprintln!("  [ERROR] {}: {}", item.name, reason);
                }
            }
        }

        if let Some(seen) = seen_through {
            if let Err(err) = db.update_watermark(&item.id, seen) {
                eprintln!("  [ERROR] {}: {}", item.name, err);
            }
        }
    }

    Ok(())
}

/// Ticker loop: one cycle, then wait out the interval. Cycles never overlap
/// because the next one is scheduled after the previous one finished. Polls
/// with its own database connection; the chat transport runs elsewhere.
pub fn run_scheduler(
    db: &Database,
    source: &dyn ListingSource,
    channel: &dyn ChatChannel,
    reference_dir: &Path,
    interval: Duration,
    running: &Arc<AtomicBool>,
) {
    let mut next_cycle = Instant::now();
    while running.load(Ordering::SeqCst) {
        if Instant::now() >= next_cycle {
            if let Err(e) = run_cycle(db, source, channel, reference_dir) {
                eprintln!("  [ERROR] poll cycle: {}", e);
            }
            next_cycle = Instant::now() + interval;
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}
