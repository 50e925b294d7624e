use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static LISTING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.decriptions-short").unwrap());
static PRICE_BOX_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.product-price-and-shipping.hidden-md-up").unwrap());
static PRICE_SPAN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.price").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

// Locale-formatted price: space (or nbsp) thousands separator, decimal comma,
// trailing currency glyph ("1 299,00 zł").
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\d \x{A0}]+)(?:,(\d+))?\s*(?:zł)?\s*$").unwrap());

/// Label spellings used by the source site. Several attributes appear under
/// two different labels depending on the listing.
const PROCESSOR_LABELS: &[&str] = &["Model procesora:", "Procesor:"];
const DISK_LABELS: &[&str] = &["Dysk:", "Pojemność dysku:"];
const RAM_LABELS: &[&str] = &["Pamięć: RAM:", "Ilość pamięci RAM:"];
const OS_LABELS: &[&str] = &["System operacyjny:"];
const CONDITION_LABELS: &[&str] = &["Stan:"];
const GRAPHIC_LABELS: &[&str] = &["Karta graficzna:"];

/// One scraped item. Any field may be absent when the label is missing from
/// the source markup; absence is a value, not an error. A record without a
/// price is invalid for training but still extractable for inspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub processor: Option<String>,
    pub disk: Option<String>,
    pub ram: Option<String>,
    pub os: Option<String>,
    pub condition: Option<String>,
    pub graphic_card: Option<String>,
    pub price: Option<f64>,
}

impl RawListing {
    /// Field access by canonical attribute name, matching the training column
    /// labels and the prediction input keys.
    pub fn field(&self, attribute: &str) -> Option<&str> {
        match attribute {
            "processor" => self.processor.as_deref(),
            "disk" => self.disk.as_deref(),
            "ram" => self.ram.as_deref(),
            "os" => self.os.as_deref(),
            "condition" => self.condition.as_deref(),
            "graphic_card" => self.graphic_card.as_deref(),
            _ => None,
        }
    }
}

/// Extract every listing on a catalog page, in listing order.
///
/// The page nests each item's price display outside its spec table, so the
/// walk tracks the nearest price container preceding the current spec block in
/// document order (scoped to this page) and pairs the two.
pub fn extract_listings(html: &str) -> Vec<RawListing> {
    let doc = Html::parse_document(html);
    let mut listings = Vec::new();
    let mut last_price: Option<f64> = None;

    for node in doc.tree.root().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if PRICE_BOX_SEL.matches(&el) {
            last_price = el
                .select(&PRICE_SPAN_SEL)
                .next()
                .and_then(|span| parse_price(&cell_text(span)));
        } else if LISTING_SEL.matches(&el) {
            listings.push(extract_block(el, last_price));
        }
    }
    listings
}

/// Extract one listing's spec table, with the price already resolved from the
/// surrounding page.
fn extract_block(block: ElementRef, price: Option<f64>) -> RawListing {
    let cells: Vec<Cell> = block
        .select(&CELL_SEL)
        .map(|td| Cell {
            is_label: has_class(td, "kp-tabela-tdleft"),
            is_value: has_class(td, "kp-tabela-tdright"),
            text: cell_text(td),
        })
        .collect();

    RawListing {
        processor: field_value(&cells, PROCESSOR_LABELS),
        disk: field_value(&cells, DISK_LABELS),
        ram: field_value(&cells, RAM_LABELS),
        // Collapse the vendor's two-token edition name so later substring
        // matching is not fooled by the space.
        os: field_value(&cells, OS_LABELS)
            .map(|v| v.replace("Windows 11 Pro", "Windows 11Pro")),
        condition: field_value(&cells, CONDITION_LABELS),
        graphic_card: field_value(&cells, GRAPHIC_LABELS),
        price,
    }
}

struct Cell {
    is_label: bool,
    is_value: bool,
    text: String,
}

/// Find a label cell matching one of the known spellings, then take the next
/// value cell after it in document order. Missing label => absent field.
fn field_value(cells: &[Cell], labels: &[&str]) -> Option<String> {
    let idx = cells
        .iter()
        .position(|c| c.is_label && labels.iter().any(|l| c.text.contains(l)))?;
    let value = cells[idx + 1..].iter().find(|c| c.is_value)?;
    if value.text.is_empty() {
        None
    } else {
        Some(value.text.clone())
    }
}

fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Concatenated text content, trimmed, with non-breaking-space artifacts
/// stripped the way the site embeds them.
fn cell_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().replace('\u{a0}', "")
}

pub fn parse_price(text: &str) -> Option<f64> {
    let caps = PRICE_RE.captures(text)?;
    let whole: String = caps[1].chars().filter(|c| c.is_ascii_digit()).collect();
    if whole.is_empty() {
        return None;
    }
    let frac = caps.get(2).map_or("0", |m| m.as_str());
    format!("{whole}.{frac}").parse::<f64>().ok()
}
