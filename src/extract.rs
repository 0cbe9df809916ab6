use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use url::Url;

/// Most comps returned for a single search.
pub const MAX_COMPS: usize = 5;

/// One comparable listing as shown on a search results card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub title: String,
    pub price: String,
    pub details: String,
    pub image: String,
    pub link: String,
}

// Create static selectors to avoid recompiling them each time
static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="property-card"]"#).expect("Failed to parse card selector")
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="property-card-title"]"#).expect("Failed to parse title selector")
});

static PRICE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="property-card-price"]"#).expect("Failed to parse price selector")
});

static META_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="property-card-meta"]"#).expect("Failed to parse meta selector")
});

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("img").expect("Failed to parse img selector")
});

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a").expect("Failed to parse link selector")
});

/// Reads up to [`MAX_COMPS`] property cards from a rendered results page,
/// in document order.
///
/// `page_url` is used to resolve relative `src`/`href` values the way a
/// browser reports them. Missing sub-elements yield empty strings.
pub fn extract_listings(html: &str, page_url: &str) -> Vec<Listing> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    document
        .select(&CARD_SELECTOR)
        .take(MAX_COMPS)
        .map(|card| Listing {
            title: first_text(card, &TITLE_SELECTOR),
            price: first_text(card, &PRICE_SELECTOR),
            details: first_text(card, &META_SELECTOR),
            image: first_url(card, &IMG_SELECTOR, "src", base.as_ref()),
            link: first_url(card, &LINK_SELECTOR, "href", base.as_ref()),
        })
        .collect()
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> String {
    card.select(selector)
        .next()
        .map(visible_text)
        .unwrap_or_default()
}

fn first_url(card: ElementRef<'_>, selector: &Selector, attr: &str, base: Option<&Url>) -> String {
    card.select(selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|raw| resolve(raw.trim(), base))
        .unwrap_or_default()
}

/// Approximates `innerText`: adjacent inline text is concatenated as-is,
/// block elements and `<br>` start a new line, whitespace runs inside a line
/// collapse to one space, and non-rendered subtrees are skipped.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    let mut current = String::new();
    collect_text(element, &mut lines, &mut current);
    flush_line(&mut lines, &mut current);
    lines.join("\n")
}

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary",
    "table", "tr", "ul",
];

fn collect_text(element: ElementRef<'_>, lines: &mut Vec<String>, current: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if HIDDEN_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    flush_line(lines, current);
                    continue;
                }
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };
                let is_block = BLOCK_TAGS.contains(&name);
                if is_block {
                    flush_line(lines, current);
                }
                collect_text(child_element, lines, current);
                if is_block {
                    flush_line(lines, current);
                }
            }
            _ => {}
        }
    }
}

fn flush_line(lines: &mut Vec<String>, current: &mut String) {
    let line = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

fn resolve(raw: &str, base: Option<&Url>) -> String {
    if raw.is_empty() {
        return String::new();
    }
    match base.and_then(|base| base.join(raw).ok()) {
        Some(url) => url.to_string(),
        None => raw.to_string(),
    }
}
