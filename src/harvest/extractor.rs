//! Structural extractor for search-result pages
//!
//! Every product on a results page sits in an item container that carries a
//! stable marker attribute. The markup inside a container varies between page
//! variants, so each field is resolved through its own ordered
//! [`StrategyChain`]: strategies are tried in order and the first one that
//! yields a value wins.
//!
//! Extraction is pure. It performs no I/O, keeps no state between calls and
//! never fails on malformed markup; the worst case is an empty result.

use crate::harvest::record::Listing;
use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};

/// Marker shared by all item containers on a results page
pub const ITEM_CONTAINER: &str = r#"[data-component-type="s-search-result"]"#;

type Matcher<T> = Box<dyn Fn(ElementRef<'_>) -> Option<T> + Send + Sync>;

/// One way of resolving a field from an item container
pub struct Strategy<T> {
    label: String,
    matcher: Matcher<T>,
}

impl<T> Strategy<T> {
    /// Creates a strategy from an arbitrary matcher function
    pub fn new<F>(label: impl Into<String>, matcher: F) -> Self
    where
        F: Fn(ElementRef<'_>) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            matcher: Box::new(matcher),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn apply(&self, item: ElementRef<'_>) -> Option<T> {
        (self.matcher)(item)
    }
}

impl<T> std::fmt::Debug for Strategy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("label", &self.label).finish()
    }
}

/// Ordered fallback chain for a single field
#[derive(Debug)]
pub struct StrategyChain<T> {
    strategies: Vec<Strategy<T>>,
}

impl<T> Default for StrategyChain<T> {
    fn default() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }
}

impl<T> StrategyChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strategy with the lowest priority so far
    pub fn then(mut self, strategy: Strategy<T>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Appends a strategy to an existing chain
    pub fn push(&mut self, strategy: Strategy<T>) {
        self.strategies.push(strategy);
    }

    /// Inserts a strategy ahead of all existing ones
    pub fn prepend(&mut self, strategy: Strategy<T>) {
        self.strategies.insert(0, strategy);
    }

    /// Returns the first value produced by the chain, trying strategies in order
    pub fn resolve(&self, item: ElementRef<'_>) -> Option<T> {
        self.strategies.iter().find_map(|s| s.apply(item))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.label()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Resolves product listings from rendered search-result markup
#[derive(Debug)]
pub struct Extractor {
    origin: String,
    container: Selector,
    pub names: StrategyChain<String>,
    pub urls: StrategyChain<String>,
    pub prices: StrategyChain<String>,
    pub ratings: StrategyChain<f64>,
    pub review_counts: StrategyChain<u64>,
}

impl Extractor {
    /// Builds an extractor with the known layout variants of the site
    ///
    /// # Arguments
    ///
    /// * `origin` - Site origin prefixed to site-relative links (e.g. "https://www.amazon.in")
    ///
    /// # Returns
    ///
    /// * `Ok(Extractor)` - Extractor with the default strategy chains
    /// * `Err(HarvestError)` - A built-in selector failed to parse
    ///
    /// # Example
    ///
    /// ```
    /// use shelf_harvester::harvest::Extractor;
    ///
    /// let extractor = Extractor::for_site("https://www.amazon.in").unwrap();
    /// let html = r#"<div data-component-type="s-search-result">
    ///     <h2><a href="/dp/B01"><span>Laptop Stand</span></a></h2>
    /// </div>"#;
    /// let listings = extractor.extract(html);
    /// assert_eq!(listings[0].url, "https://www.amazon.in/dp/B01");
    /// ```
    pub fn for_site(origin: &str) -> Result<Self, HarvestError> {
        let names = StrategyChain::new()
            .then(text_at("h2 a span")?)
            .then(text_at("h2 span")?)
            .then(text_at("h2 a")?)
            .then(text_at(r#"[data-cy="title-recipe-title"]"#)?);

        let urls = StrategyChain::new()
            .then(attr_at("h2 a", "href")?)
            .then(attr_at(r#"a[href*="/dp/"]"#, "href")?);

        let prices = StrategyChain::new()
            .then(text_at(".a-price .a-offscreen")?)
            .then(text_at(".a-price-range .a-offscreen")?)
            .then(whole_and_fraction(".a-price-whole", ".a-price-fraction")?)
            .then(whole_only(".a-price-whole")?);

        let ratings = StrategyChain::new()
            .then(rating_text_at(".a-icon-alt")?)
            .then(rating_attr_at(r#"[aria-label*="out of"]"#, "aria-label")?);

        let review_counts = StrategyChain::new()
            .then(digits_at(r#"[aria-label*="ratings"]"#)?)
            .then(digits_at(r#"[aria-label*="rating"]"#)?)
            .then(digits_at(".a-size-base")?);

        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            container: parse_selector(ITEM_CONTAINER)?,
            names,
            urls,
            prices,
            ratings,
            review_counts,
        })
    }

    /// Replaces the item container signature
    pub fn with_container(mut self, css: &str) -> Result<Self, HarvestError> {
        self.container = parse_selector(css)?;
        Ok(self)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Extracts listings from page markup, in document order
    ///
    /// Containers for which no name or no URL can be resolved are skipped
    /// silently.
    pub fn extract(&self, markup: &str) -> Vec<Listing> {
        let document = Html::parse_document(markup);

        document
            .select(&self.container)
            .filter_map(|item| self.resolve(item))
            .collect()
    }

    /// Counts item containers without resolving any field
    pub fn count_containers(&self, markup: &str) -> usize {
        Html::parse_document(markup).select(&self.container).count()
    }

    fn resolve(&self, item: ElementRef<'_>) -> Option<Listing> {
        let name = self.names.resolve(item)?;
        let href = self.urls.resolve(item)?;
        let url = normalize_href(&href, &self.origin)?;

        Some(Listing {
            name,
            url,
            price: self.prices.resolve(item),
            rating: self.ratings.resolve(item),
            review_count: self.review_counts.resolve(item),
        })
    }
}

/// Parses a CSS selector, keeping the offending text in the error
pub fn parse_selector(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css).map_err(|e| HarvestError::Selector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

/// Strategy: whitespace-normalized text of the first match
pub fn text_at(css: &str) -> Result<Strategy<String>, HarvestError> {
    let selector = parse_selector(css)?;
    Ok(Strategy::new(format!("text({})", css), move |item| {
        first_text(item, &selector)
    }))
}

/// Strategy: trimmed attribute value of the first match
pub fn attr_at(css: &str, attr: &'static str) -> Result<Strategy<String>, HarvestError> {
    let selector = parse_selector(css)?;
    Ok(Strategy::new(format!("attr({}, {})", css, attr), move |item| {
        first_attr(item, &selector, attr)
    }))
}

fn whole_and_fraction(whole_css: &str, fraction_css: &str) -> Result<Strategy<String>, HarvestError> {
    let whole = parse_selector(whole_css)?;
    let fraction = parse_selector(fraction_css)?;
    Ok(Strategy::new(
        format!("pair({}, {})", whole_css, fraction_css),
        move |item| {
            let whole = first_text(item, &whole)?;
            let fraction = first_text(item, &fraction)?;
            Some(format!("{}.{}", strip_decimal_point(&whole), fraction))
        },
    ))
}

fn whole_only(css: &str) -> Result<Strategy<String>, HarvestError> {
    let selector = parse_selector(css)?;
    Ok(Strategy::new(format!("whole({})", css), move |item| {
        first_text(item, &selector)
            .map(|whole| strip_decimal_point(&whole).to_string())
            .filter(|whole| !whole.is_empty())
    }))
}

fn rating_text_at(css: &str) -> Result<Strategy<f64>, HarvestError> {
    let selector = parse_selector(css)?;
    Ok(Strategy::new(format!("rating-text({})", css), move |item| {
        first_text(item, &selector).and_then(|text| parse_rating(&text))
    }))
}

fn rating_attr_at(css: &str, attr: &'static str) -> Result<Strategy<f64>, HarvestError> {
    let selector = parse_selector(css)?;
    Ok(Strategy::new(format!("rating-attr({}, {})", css, attr), move |item| {
        first_attr(item, &selector, attr).and_then(|text| parse_rating(&text))
    }))
}

fn digits_at(css: &str) -> Result<Strategy<u64>, HarvestError> {
    let selector = parse_selector(css)?;
    Ok(Strategy::new(format!("digits({})", css), move |item| {
        first_text(item, &selector)
            .and_then(|text| digits_only(&text))
            .and_then(|digits| digits.parse().ok())
    }))
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = item.select(selector).next()?;
    let text = element.text().collect::<String>();
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn first_attr(item: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    item.select(selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Whole-part price text often carries its own trailing decimal point
fn strip_decimal_point(whole: &str) -> &str {
    whole.trim_end_matches('.').trim_end()
}

/// Rewrites a site-relative link to an absolute one
///
/// Anything starting with `/` is appended to the origin, so `/dp/X`
/// becomes `<origin>/dp/X`. Every other href is returned unchanged.
pub fn normalize_href(href: &str, origin: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    if href.starts_with('/') {
        return Some(format!("{}{}", origin.trim_end_matches('/'), href));
    }

    Some(href.to_string())
}

/// Parses "`<number> out of <max>`" labels, keeping the leading number
pub fn parse_rating(text: &str) -> Option<f64> {
    if !text.contains("out of") {
        return None;
    }

    text.split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Concatenates every ASCII digit in the text, in order
pub fn digits_only(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
