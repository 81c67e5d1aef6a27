use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a cached response may satisfy a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Leave caching to the protocol (no directive sent)
    #[default]
    UseProtocol,
    ReloadIgnoringCache,
    ReloadRevalidatingCache,
    ReturnCacheElseLoad,
    ReturnCacheOnly,
}

impl CachePolicy {
    pub const ALL: [CachePolicy; 5] = [
        CachePolicy::UseProtocol,
        CachePolicy::ReloadIgnoringCache,
        CachePolicy::ReloadRevalidatingCache,
        CachePolicy::ReturnCacheElseLoad,
        CachePolicy::ReturnCacheOnly,
    ];

    /// `Cache-Control` value for this policy
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CachePolicy::UseProtocol => None,
            CachePolicy::ReloadIgnoringCache => Some("no-cache"),
            CachePolicy::ReloadRevalidatingCache => Some("max-age=0"),
            CachePolicy::ReturnCacheElseLoad => Some("max-stale"),
            CachePolicy::ReturnCacheOnly => Some("only-if-cached"),
        }
    }

    /// HTTP/1.0 caches only understand `Pragma`
    pub fn pragma(&self) -> Option<&'static str> {
        match self {
            CachePolicy::ReloadIgnoringCache => Some("no-cache"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::UseProtocol => "use_protocol",
            CachePolicy::ReloadIgnoringCache => "reload_ignoring_cache",
            CachePolicy::ReloadRevalidatingCache => "reload_revalidating_cache",
            CachePolicy::ReturnCacheElseLoad => "return_cache_else_load",
            CachePolicy::ReturnCacheOnly => "return_cache_only",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CachePolicy::ALL
            .into_iter()
            .find(|policy| policy.as_str() == normalized)
            .ok_or_else(|| format!("unknown cache policy: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_kebab_case() {
        assert_eq!(
            "reload-ignoring-cache".parse::<CachePolicy>().unwrap(),
            CachePolicy::ReloadIgnoringCache
        );
        assert!("sometimes".parse::<CachePolicy>().is_err());
    }

    #[test]
    fn test_only_reload_ignoring_sets_pragma() {
        for policy in CachePolicy::ALL {
            assert_eq!(
                policy.pragma().is_some(),
                policy == CachePolicy::ReloadIgnoringCache
            );
        }
        assert_eq!(CachePolicy::UseProtocol.cache_control(), None);
    }
}
