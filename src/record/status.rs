/// Crawl status definitions
///
/// This module defines every status a URL can hold in the crawl-state store.
use std::fmt;

/// Represents the lifecycle status of a URL in the crawl-state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// Discovered but never fetched
    Unfetched,

    /// Fetched successfully at least once
    Fetched,

    /// Permanently gone (e.g. HTTP 404/410)
    Gone,

    /// Temporarily redirected
    RedirTemp,

    /// Permanently redirected
    RedirPerm,

    /// Last fetch failed transiently and should be retried
    Retry,
}

impl CrawlStatus {
    /// Returns true if records in this status may ever be selected again
    ///
    /// Gone and permanently redirected URLs are never retried.
    pub fn is_selectable(&self) -> bool {
        !matches!(self, Self::Gone | Self::RedirPerm)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unfetched => "unfetched",
            Self::Fetched => "fetched",
            Self::Gone => "gone",
            Self::RedirTemp => "redir_temp",
            Self::RedirPerm => "redir_perm",
            Self::Retry => "retry",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unfetched" => Some(Self::Unfetched),
            "fetched" => Some(Self::Fetched),
            "gone" => Some(Self::Gone),
            "redir_temp" => Some(Self::RedirTemp),
            "redir_perm" => Some(Self::RedirPerm),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 6] {
        [
            Self::Unfetched,
            Self::Fetched,
            Self::Gone,
            Self::RedirTemp,
            Self::RedirPerm,
            Self::Retry,
        ]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
