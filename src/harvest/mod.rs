//! Harvesting: extraction, fetching, proxies and the per-job session
//!
//! A [`HarvestSession`] drives one job page by page. It asks a
//! [`PageFetcher`] for rendered markup (retrying through the [`ProxyPool`]
//! when asked to), turns the markup into [`Listing`]s with the
//! [`Extractor`], and stores each page's records as soon as they exist.

mod direct;
mod extractor;
mod fetcher;
mod proxy;
mod record;
mod session;
mod state;

pub use direct::{harvest_categories, DirectRun};
pub use extractor::{
    attr_at, digits_only, normalize_href, parse_rating, parse_selector, text_at, Extractor,
    Strategy, StrategyChain, ITEM_CONTAINER,
};
pub use fetcher::{BrowserFetcher, FailureKind, FetchFailure, FetchOutcome, PageFetcher};
pub use proxy::{HttpProxyProbe, ProxyEndpoint, ProxyPool, ProxyProbe, ProxyStatus};
pub use record::{Listing, Record};
pub use session::{
    page_url, DelayRange, FetchAttempt, HarvestContext, HarvestSession, HarvestSettings,
    PageOutcome, PageResult, SessionReport,
};
pub use state::SessionState;
