use crate::config::{ScopeConfig, ScopeMode};
use crate::url::domain::{registrable_domain, url_registrable_domain};
use crate::url::matcher::matches_wildcard;
use crate::{UrlError, UrlResult};
use std::collections::HashSet;
use url::Url;

/// Domain-scope predicate applied to every URL before it enters the frontier
#[derive(Debug, Clone)]
pub enum DomainScope {
    /// Every http(s) URL is in scope
    Unrestricted,
    /// In scope when the registrable domain equals one of the seeds'
    SameDomainAs(HashSet<String>),
    /// In scope when the host matches one of the patterns
    AllowList(Vec<String>),
}

impl DomainScope {
    /// Builds the scope predicate from configuration and the seed list
    pub fn from_config(scope: &ScopeConfig, seeds: &[String]) -> UrlResult<Self> {
        match scope.mode {
            ScopeMode::Unrestricted => Ok(Self::Unrestricted),
            ScopeMode::AllowList => Ok(Self::AllowList(
                scope.allow.iter().map(|p| p.to_lowercase()).collect(),
            )),
            ScopeMode::SameDomainAsSeed => {
                let mut domains = HashSet::new();
                for seed in seeds {
                    let url = Url::parse(seed).map_err(|e| UrlError::Parse(e.to_string()))?;
                    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
                    domains.insert(registrable_domain(host));
                }
                Ok(Self::SameDomainAs(domains))
            }
        }
    }

    /// Returns true if the URL may be queued
    pub fn allows(&self, url: &Url) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::SameDomainAs(domains) => url_registrable_domain(url)
                .map(|d| domains.contains(&d))
                .unwrap_or(false),
            Self::AllowList(patterns) => match url.host_str() {
                Some(host) => {
                    let host = host.to_lowercase();
                    patterns.iter().any(|p| matches_wildcard(p, &host))
                }
                None => false,
            },
        }
    }
}
