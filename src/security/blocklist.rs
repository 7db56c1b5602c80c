//! Domain admission control.
//!
//! A process-wide, runtime-mutable block-list of hostnames. A host is blocked
//! when it equals an entry or is a subdomain of one (`*.entry`). Entries live
//! in memory only and reset to the configured seed on restart.

use std::sync::{LazyLock, PoisonError, RwLock};

use axum::http::StatusCode;
use regex::Regex;
use thiserror::Error;
use url::{Host, Url};

/// `None` only if the pattern fails to compile, in which case no domain validates.
static DOMAIN_SYNTAX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$").ok()
});

/// Misuse of the block-list mutation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlocklistError {
    #[error("Invalid domain format")]
    InvalidDomain(String),

    #[error("Domain already blocked")]
    AlreadyBlocked(String),

    #[error("Domain not in blocked list")]
    NotBlocked(String),
}

impl BlocklistError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidDomain(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyBlocked(_) => StatusCode::CONFLICT,
            Self::NotBlocked(_) => StatusCode::NOT_FOUND,
        }
    }

    /// The domain the failed operation was called with.
    pub fn domain(&self) -> &str {
        match self {
            Self::InvalidDomain(d) | Self::AlreadyBlocked(d) | Self::NotBlocked(d) => d,
        }
    }
}

/// Ordered set of blocked hostnames, guarded by a single lock.
#[derive(Debug, Default)]
pub struct DomainBlockList {
    entries: RwLock<Vec<String>>,
}

impl DomainBlockList {
    /// Seed the list from configuration. Entries are trimmed, lowercased and deduplicated.
    pub fn new<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<String> = Vec::new();
        for domain in seed {
            let domain = normalize(domain.as_ref());
            if !domain.is_empty() && !entries.contains(&domain) {
                entries.push(domain);
            }
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Current entries in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true if the host of `url` is blocked.
    ///
    /// An unparsable URL or a URL without a host is not blocked; callers
    /// validate the target first.
    pub fn is_blocked(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.host_str().is_some_and(|host| self.is_host_blocked(host)),
            Err(_) => false,
        }
    }

    /// Returns true if `host` equals an entry or ends with `"." + entry`.
    ///
    /// A fully-qualified host (`blocked.example.`) names the same DNS host as
    /// its relative form and is matched without the root dot.
    pub fn is_host_blocked(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let host = host.strip_suffix('.').unwrap_or(&host);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().any(|entry| {
            host == entry.as_str()
                || host
                    .strip_suffix(entry.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Block a new domain and return the updated list.
    pub fn add_domain(&self, domain: &str) -> Result<Vec<String>, BlocklistError> {
        let normalized = normalize(domain);
        if !is_valid_domain(&normalized) {
            return Err(BlocklistError::InvalidDomain(domain.to_string()));
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains(&normalized) {
            return Err(BlocklistError::AlreadyBlocked(normalized));
        }
        entries.push(normalized);
        Ok(entries.clone())
    }

    /// Unblock a domain and return the updated list.
    pub fn remove_domain(&self, domain: &str) -> Result<Vec<String>, BlocklistError> {
        let normalized = normalize(domain);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter().position(|entry| *entry == normalized) {
            Some(index) => {
                entries.remove(index);
                Ok(entries.clone())
            }
            None => Err(BlocklistError::NotBlocked(normalized)),
        }
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

/// DNS-label syntax with a two-letter-or-longer alphabetic TLD, parseable as a bare hostname.
pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253
        && DOMAIN_SYNTAX.as_ref().is_some_and(|re| re.is_match(domain))
        && matches!(Host::parse(domain), Ok(Host::Domain(_)))
}
