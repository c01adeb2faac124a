//! Compiles a finished item (name + normalized selections) into the external
//! search URL and the localized confirmation summary.

use url::Url;

use crate::channel::escape_html;
use crate::error::{Result, VahtiError};
use crate::selection::{CategorySelection, LocationSelection, Pick};
use crate::taxonomy::{CategoryTree, Language, LocationTree, Messages};

/// Fixed search endpoint of the marketplace API.
pub const SEARCH_ENDPOINT: &str =
    "https://beta.tori.fi/recommerce-search-page/api/search/SEARCH_ID_BAP_COMMON";

/// Newest-first sort parameter, always appended last.
const SORT_PARAM: (&str, &str) = ("sort", "PUBLISHED_DESC");

/// Build the search link. Inputs must already be normalized and sorted with
/// `sort_for_output` (wildcard entries last), so "is there a top-level
/// wildcard" can be answered before emitting any parameter. A selection name
/// missing from the taxonomy is an error; a malformed link must never be
/// produced silently.
pub fn build_link(
    name: &str,
    categories: &[CategorySelection],
    locations: &[LocationSelection],
    category_tree: &CategoryTree,
    location_tree: &LocationTree,
    language: Language,
) -> Result<String> {
    let mut link = Url::parse(SEARCH_ENDPOINT)?;
    {
        let mut qs = link.query_pairs_mut();
        qs.append_pair("q", &name.to_lowercase());

        // A wildcard category subsumed everything: no category filtering.
        if !categories.iter().any(|c| c.category.is_any()) {
            for selection in categories {
                let Some(category_name) = selection.category.name() else {
                    continue;
                };
                let (key, code) = category_param(category_name, selection, category_tree, language)?;
                qs.append_pair(key, &code.to_string());
            }
        }

        // Same for whole-country locations.
        if !locations.iter().any(|l| l.region.is_any()) {
            for selection in locations {
                let Some(region_name) = selection.region.name() else {
                    continue;
                };
                let code = location_code(region_name, selection, location_tree, language)?;
                qs.append_pair("location", &code.to_string());
            }
        }

        qs.append_pair(SORT_PARAM.0, SORT_PARAM.1);
    }
    Ok(link.into())
}

fn lookup_err(level: &'static str, name: &str, language: Language) -> VahtiError {
    VahtiError::Lookup {
        level,
        name: name.to_string(),
        locale: language.key(),
    }
}

/// Pick the single most specific filter parameter for one category entry.
fn category_param(
    category_name: &str,
    selection: &CategorySelection,
    tree: &CategoryTree,
    language: Language,
) -> Result<(&'static str, i64)> {
    let category = tree
        .category(category_name)
        .ok_or_else(|| lookup_err("category", category_name, language))?;

    let Some(sub_name) = selection.subcategory.name() else {
        return Ok(("category", category.code));
    };
    let subcategory = category
        .subcategory(sub_name)
        .ok_or_else(|| lookup_err("subcategory", sub_name, language))?;

    let Some(product_name) = selection.product_type.name() else {
        return Ok(("sub_category", subcategory.code));
    };
    let product = subcategory
        .product_type(product_name)
        .ok_or_else(|| lookup_err("product type", product_name, language))?;
    Ok(("product_category", product.code))
}

/// Most specific location code for one location entry.
fn location_code(
    region_name: &str,
    selection: &LocationSelection,
    tree: &LocationTree,
    language: Language,
) -> Result<i64> {
    let region = tree
        .region(region_name)
        .ok_or_else(|| lookup_err("region", region_name, language))?;

    let Some(city_name) = selection.city.name() else {
        return Ok(region.code);
    };
    let city = region
        .city(city_name)
        .ok_or_else(|| lookup_err("city", city_name, language))?;

    let Some(area_name) = selection.area.name() else {
        return Ok(city.code);
    };
    let area = city
        .area(area_name)
        .ok_or_else(|| lookup_err("area", area_name, language))?;
    Ok(area.code)
}

/// "Electronics > Phones > Smartphones" with wildcard segments omitted.
pub fn category_path(selection: &CategorySelection) -> String {
    [
        &selection.category,
        &selection.subcategory,
        &selection.product_type,
    ]
    .into_iter()
    .filter_map(Pick::name)
    .collect::<Vec<_>>()
    .join(" > ")
}

/// "Uusimaa, Helsinki, Kallio" with wildcard segments omitted.
pub fn location_path(selection: &LocationSelection) -> String {
    [&selection.region, &selection.city, &selection.area]
        .into_iter()
        .filter_map(Pick::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Human-readable confirmation of a finished item. Inputs sorted as for
/// `build_link`. If a top-level wildcard is present, only its single line is
/// rendered instead of enumerating the subsumed entries.
pub fn render_summary(
    name: &str,
    categories: &[CategorySelection],
    locations: &[LocationSelection],
    messages: &Messages,
) -> String {
    let mut out = messages.item_line.replace("{item}", &escape_html(name));
    out.push('\n');

    if categories.iter().any(|c| c.category.is_any()) {
        out.push_str(
            &messages
                .category_line
                .replace("{path}", &messages.all_categories),
        );
        out.push('\n');
    } else {
        for selection in categories {
            out.push_str(
                &messages
                    .category_line
                    .replace("{path}", &category_path(selection)),
            );
            out.push('\n');
        }
    }

    out.push_str(&messages.locations_header);
    out.push('\n');
    if locations.iter().any(|l| l.region.is_any()) {
        out.push_str(
            &messages
                .location_line
                .replace("{path}", &messages.whole_country),
        );
        out.push('\n');
    } else {
        for selection in locations {
            out.push_str(
                &messages
                    .location_line
                    .replace("{path}", &location_path(selection)),
            );
            out.push('\n');
        }
    }

    out
}
