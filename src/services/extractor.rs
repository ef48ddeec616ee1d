//! Price extraction from fetched page content.
//!
//! Marketplace strategies run first, in order, for URLs whose domain they
//! claim. The generic heuristic (strip markup, take the first plausible
//! currency-like number) is always the fallback.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use url::Url;

/// Generic candidates at or below this value are treated as noise
/// (ratings, quantities, stray digits).
pub const MIN_PLAUSIBLE_PRICE: f64 = 10.0;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("static pattern")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static pattern"));

// group 1: optional currency marker, group 2: the number. Whether the
// number stands on its own is checked in `is_standalone`.
static CANDIDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(₹|\$|€|£|rs\.?|inr|usd)?\s*(\d{1,3}(?:,\d{2,3})+(?:\.\d+)?|\d+(?:\.\d+)?)")
        .expect("static pattern")
});

// currency words allowed directly after a number, as in "1299INR"
const TRAILING_MARKERS: &[&str] = &["inr", "usd", "rs"];

// productTitle element, og:title in both attribute orders, then <title>
static TITLE_RES: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r#"(?is)<[a-z][a-z0-9]*\b[^>]*\bid\s*=\s*"productTitle"[^>]*>(.*?)</[a-z]"#),
        Regex::new(r#"(?is)<meta\b[^>]*?property\s*=\s*"og:title"[^>]*?content\s*=\s*"([^"]*)""#),
        Regex::new(r#"(?is)<meta\b[^>]*?content\s*=\s*"([^"]*)"[^>]*?property\s*=\s*"og:title""#),
        Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>"),
    ]
    .map(|r| r.expect("static pattern"))
});

const MAX_TITLE_CHARS: usize = 200;

/// A price pulled out of a page, with the text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatch {
    pub value: f64,
    pub raw: String,
    pub source: &'static str,
}

pub trait PriceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches_domain(&self, url: &str) -> bool;

    fn extract(&self, content: &str) -> Option<PriceMatch>;
}

#[derive(Clone)]
pub struct PriceExtractor {
    strategies: Vec<Arc<dyn PriceStrategy>>,
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(AmazonStrategy),
            Arc::new(FlipkartStrategy),
            Arc::new(MetaTagStrategy),
        ])
    }
}

impl PriceExtractor {
    pub fn new(strategies: Vec<Arc<dyn PriceStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, url: &str, content: &str) -> Option<f64> {
        self.extract_match(url, content).map(|m| m.value)
    }

    pub fn extract_match(&self, url: &str, content: &str) -> Option<PriceMatch> {
        for strategy in &self.strategies {
            if !strategy.matches_domain(url) {
                continue;
            }
            if let Some(m) = strategy.extract(content) {
                tracing::debug!(strategy = strategy.name(), price = m.value, "strategy matched");
                return Some(m);
            }
        }

        extract_generic(content)
    }
}

/// Strip markup, then take the first currency-like token above
/// [`MIN_PLAUSIBLE_PRICE`].
pub fn extract_generic(content: &str) -> Option<PriceMatch> {
    let text = strip_markup(content);

    CANDIDATE_RE.captures_iter(&text).find_map(|caps| {
        let number = caps.get(2)?;
        if !is_standalone(&text, number.start(), number.end(), caps.get(1).is_some()) {
            return None;
        }
        let value = parse_price_text(number.as_str())?;
        if value <= MIN_PLAUSIBLE_PRICE {
            return None;
        }
        Some(PriceMatch {
            value,
            raw: caps.get(0)?.as_str().trim().to_string(),
            source: "generic",
        })
    })
}

/// A number glued to letters (`B0C123XYZ`) is part of a code, not a price,
/// unless the letters are a currency marker (`Rs749`, `1299INR`).
fn is_standalone(text: &str, start: usize, end: usize, has_marker: bool) -> bool {
    let before_ok = has_marker
        || text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());

    let rest = &text[end..];
    let after_ok = match rest.chars().next() {
        None => true,
        Some(c) if !c.is_alphanumeric() => true,
        Some(_) => {
            let head: String = rest.chars().take(3).collect::<String>().to_ascii_lowercase();
            TRAILING_MARKERS.iter().any(|m| head.starts_with(m))
        }
    };

    before_ok && after_ok
}

/// Product title from `#productTitle`, `og:title` or `<title>`, whichever
/// comes first in that order. Markup and extra whitespace are removed.
pub fn extract_title(content: &str) -> Option<String> {
    TITLE_RES.iter().find_map(|re| {
        let raw = re.captures(content)?.get(1)?.as_str();
        clean_title(raw)
    })
}

fn clean_title(raw: &str) -> Option<String> {
    let text = strip_markup(raw)
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let title: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    (!title.is_empty()).then_some(title)
}

pub fn strip_markup(content: &str) -> String {
    let without_code = SCRIPT_STYLE_RE.replace_all(content, " ");
    let text = TAG_RE.replace_all(&without_code, " ");

    text.replace("&nbsp;", " ")
        .replace("&#8377;", "₹")
        .replace("&#x20b9;", "₹")
        .replace("&#x20B9;", "₹")
        .replace("&amp;", "&")
}

/// Parse a displayed price such as `"₹ 1,234.50"`.
///
/// Commas are always thousands separators; a period, if any, is the decimal
/// point. Returns `None` for anything that does not end up a finite number.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

fn first_capture(patterns: &[&Regex], content: &str, source: &'static str) -> Option<PriceMatch> {
    patterns.iter().find_map(|re| {
        re.captures_iter(content).find_map(|caps| {
            let raw = caps.get(1)?.as_str().trim();
            let value = parse_price_text(raw)?;
            (value > 0.0).then(|| PriceMatch {
                value,
                raw: raw.to_string(),
                source,
            })
        })
    })
}

pub struct AmazonStrategy;

static AMAZON_RES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r#"(?is)id="priceblock_(?:ourprice|dealprice)"[^>]*>\s*([^<]+)<"#),
        Regex::new(r#"(?is)class="[^"]*\ba-offscreen\b[^"]*"[^>]*>\s*([^<]+)<"#),
        Regex::new(r#"(?is)class="[^"]*\ba-price-whole\b[^"]*"[^>]*>\s*([^<]+)<"#),
    ]
    .map(|r| r.expect("static pattern"))
});

impl PriceStrategy for AmazonStrategy {
    fn name(&self) -> &'static str {
        "amazon"
    }

    fn matches_domain(&self, url: &str) -> bool {
        host_of(url).is_some_and(|h| h.contains("amazon."))
    }

    fn extract(&self, content: &str) -> Option<PriceMatch> {
        let [ourprice, offscreen, whole] = &*AMAZON_RES;
        first_capture(&[ourprice, offscreen, whole], content, "amazon")
    }
}

pub struct FlipkartStrategy;

static FLIPKART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)class="[^"]*\b(?:Nx9bqj|_30jeq3)\b[^"]*"[^>]*>\s*([^<]+)<"#)
        .expect("static pattern")
});

impl PriceStrategy for FlipkartStrategy {
    fn name(&self) -> &'static str {
        "flipkart"
    }

    fn matches_domain(&self, url: &str) -> bool {
        host_of(url).is_some_and(|h| h.contains("flipkart."))
    }

    fn extract(&self, content: &str) -> Option<PriceMatch> {
        first_capture(&[&*FLIPKART_RE], content, "flipkart")
    }
}

/// `product:price:amount` / `itemprop="price"` meta tags, which many shops
/// emit regardless of platform.
pub struct MetaTagStrategy;

static META_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(
            r#"(?is)<meta\b[^>]*?(?:property|itemprop)\s*=\s*"(?:product:price:amount|og:price:amount|price)"[^>]*?content\s*=\s*"([^"]+)""#,
        ),
        Regex::new(
            r#"(?is)<meta\b[^>]*?content\s*=\s*"([^"]+)"[^>]*?(?:property|itemprop)\s*=\s*"(?:product:price:amount|og:price:amount|price)""#,
        ),
    ]
    .map(|r| r.expect("static pattern"))
});

impl PriceStrategy for MetaTagStrategy {
    fn name(&self) -> &'static str {
        "meta"
    }

    fn matches_domain(&self, url: &str) -> bool {
        matches!(Url::parse(url), Ok(u) if u.scheme() == "http" || u.scheme() == "https")
    }

    fn extract(&self, content: &str) -> Option<PriceMatch> {
        let [forward, reversed] = &*META_RES;
        first_capture(&[forward, reversed], content, "meta")
    }
}
