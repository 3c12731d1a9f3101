use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::debug;

use crate::config::EligibilityConfig;

/// Result of the proxy's cache lookup for a transaction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CacheLookup {
    Miss,
    HitStale,
    HitFresh,
    Skipped,
}

/// The parts of a response that admission looks at.
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the lookup status could not be obtained.
    pub cache_lookup: Option<CacheLookup>,
}

impl ResponseMetadata {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            cache_lookup: None,
        }
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self
    }

    pub fn with_cache_lookup(mut self, lookup: CacheLookup) -> Self {
        self.cache_lookup = Some(lookup);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// Points in the host's response lifecycle where admission can run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HookPoint {
    /// Response headers arrived from the origin.
    ReadResponseHeaders,
    /// The cache lookup finished.
    CacheLookupComplete,
    /// Response headers are about to be sent to the client.
    SendResponseHeaders,
}

impl HookPoint {
    pub const DEFAULTS: [HookPoint; 2] = [
        HookPoint::ReadResponseHeaders,
        HookPoint::SendResponseHeaders,
    ];

    /// Whether the response at this point comes from the cache rather than
    /// the origin.
    pub fn serves_cached(self) -> bool {
        !matches!(self, HookPoint::ReadResponseHeaders)
    }
}

/// Caching directives attached to an admitted response.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Admission {
    pub cache_untransformed: bool,
    pub cache_transformed: bool,
}

impl Default for Admission {
    fn default() -> Self {
        Self {
            cache_untransformed: false,
            cache_transformed: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Eligibility {
    config: EligibilityConfig,
}

impl Eligibility {
    pub fn new(config: EligibilityConfig) -> Self {
        Self { config }
    }

    /// Status and content-type check.
    pub fn should_transform(&self, response: &ResponseMetadata) -> bool {
        let status = response.status.as_u16();
        if !self.config.statuses.contains(&status) {
            debug!(status, "status not eligible for rewriting");
            return false;
        }
        let Some(content_type) = response.content_type() else {
            debug!("no usable Content-Type; not rewriting");
            return false;
        };
        let content_type = content_type.trim_start().as_bytes();
        let matched = self.config.content_types.iter().any(|wanted| {
            content_type
                .get(..wanted.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(wanted.as_bytes()))
        });
        if !matched {
            debug!(
                content_type = %String::from_utf8_lossy(content_type),
                "content type not eligible for rewriting"
            );
        }
        matched
    }

    /// Only fresh cache hits are rewritten; stale hits get revalidated and
    /// arrive again through the origin path.
    pub fn cache_is_fresh(response: &ResponseMetadata) -> bool {
        match response.cache_lookup {
            Some(CacheLookup::HitFresh) => true,
            other => {
                debug!(lookup = ?other, "cached response not fresh; not rewriting");
                false
            }
        }
    }

    pub fn admits_at(&self, point: HookPoint, response: &ResponseMetadata) -> bool {
        if point.serves_cached() && !Self::cache_is_fresh(response) {
            return false;
        }
        self.should_transform(response)
    }
}
