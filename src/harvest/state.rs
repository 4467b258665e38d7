/// Harvest session states
///
/// A session moves strictly forward through its pages:
/// `Idle → FetchingPage(n) → Extracting(n) → {FetchingPage(n+1) | Done | Aborted}`.
/// A page whose retries are exhausted goes straight from `FetchingPage(n)`
/// to `FetchingPage(n+1)` (or `Done` on the last page).
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, no page requested yet
    Idle,

    /// Fetch attempts for the given page are in progress
    FetchingPage(u32),

    /// Markup for the given page is being turned into records
    Extracting(u32),

    /// Every configured page was attempted
    Done,

    /// Shutdown was requested before all pages were attempted
    Aborted,
}

impl SessionState {
    /// Returns true if the session can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Page number the session is working on, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::FetchingPage(n) | Self::Extracting(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns true if moving to `next` keeps pages in increasing order
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (_, Aborted) => !self.is_terminal(),
            (Idle, FetchingPage(1)) => true,
            (Idle, Done) => true,
            (FetchingPage(n), Extracting(m)) => n == m,
            (FetchingPage(n), FetchingPage(m)) => m == n + 1,
            (FetchingPage(_), Done) => true,
            (Extracting(n), FetchingPage(m)) => m == n + 1,
            (Extracting(_), Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingPage(n) => write!(f, "fetching_page({})", n),
            Self::Extracting(n) => write!(f, "extracting({})", n),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
