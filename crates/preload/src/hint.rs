//! Resource hint types shared by the registry, the primitives and the plans.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;

use crate::error::PreloadError;

/// Kind of browser resource hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintKind {
    /// Warm the cache for a resource used later
    Preload,
    /// Fetch and immediately apply a script or stylesheet
    Preinit,
    /// Resolve DNS for an origin
    DnsPrefetch,
    /// Resolve DNS and open TCP + TLS for an origin
    Preconnect,
}

impl HintKind {
    /// Whether hints of this kind are keyed by origin instead of full URL
    pub fn is_origin_scoped(&self) -> bool {
        matches!(self, HintKind::DnsPrefetch | HintKind::Preconnect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HintKind::Preload => "preload",
            HintKind::Preinit => "preinit",
            HintKind::DnsPrefetch => "dns-prefetch",
            HintKind::Preconnect => "preconnect",
        }
    }
}

impl fmt::Display for HintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the hinted resource will be used as (the `as` attribute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAs {
    Script,
    Style,
    Image,
    Font,
    Fetch,
}

impl ResourceAs {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAs::Script => "script",
            ResourceAs::Style => "style",
            ResourceAs::Image => "image",
            ResourceAs::Font => "font",
            ResourceAs::Fetch => "fetch",
        }
    }
}

/// Fetch priority hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchPriority {
    High,
    Low,
    #[default]
    Auto,
}

impl FetchPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchPriority::High => "high",
            FetchPriority::Low => "low",
            FetchPriority::Auto => "auto",
        }
    }
}

/// CORS mode for the hinted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossOrigin {
    Anonymous,
    UseCredentials,
}

impl CrossOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossOrigin::Anonymous => "anonymous",
            CrossOrigin::UseCredentials => "use-credentials",
        }
    }
}

/// Stylesheet precedence for preinitialized styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    Reset,
    Low,
    Medium,
    High,
}

impl Precedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precedence::Reset => "reset",
            Precedence::Low => "low",
            Precedence::Medium => "medium",
            Precedence::High => "high",
        }
    }
}

/// Options for [`Preloader::preload`](crate::Preloader::preload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadOptions {
    /// Request destination
    #[serde(rename = "as")]
    pub destination: ResourceAs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<CrossOrigin>,
    /// Subresource integrity digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    /// MIME type, lets the browser skip formats it cannot decode
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Media query the resource applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_priority: Option<FetchPriority>,
    /// Legacy `importance` attribute, emitted alongside `fetchpriority`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<FetchPriority>,
}

impl PreloadOptions {
    /// Create options for the given destination with everything else unset
    pub fn new(destination: ResourceAs) -> Self {
        Self {
            destination,
            cross_origin: None,
            integrity: None,
            mime_type: None,
            media: None,
            fetch_priority: None,
            importance: None,
        }
    }

    /// Shorthand for an image preload
    pub fn image() -> Self {
        Self::new(ResourceAs::Image)
    }

    pub fn with_fetch_priority(mut self, priority: FetchPriority) -> Self {
        self.fetch_priority = Some(priority);
        self
    }

    pub fn with_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    pub fn with_cross_origin(mut self, cross_origin: CrossOrigin) -> Self {
        self.cross_origin = Some(cross_origin);
        self
    }

    pub fn with_integrity(mut self, integrity: &str) -> Self {
        self.integrity = Some(integrity.to_string());
        self
    }

    pub fn with_media(mut self, media: &str) -> Self {
        self.media = Some(media.to_string());
        self
    }

    /// Effective priority recorded in the registry
    pub fn effective_priority(&self) -> FetchPriority {
        self.fetch_priority
            .or(self.importance)
            .unwrap_or_default()
    }
}

/// Destination of a preinitialized resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreinitAs {
    Script,
    Style,
}

impl From<PreinitAs> for ResourceAs {
    fn from(value: PreinitAs) -> Self {
        match value {
            PreinitAs::Script => ResourceAs::Script,
            PreinitAs::Style => ResourceAs::Style,
        }
    }
}

/// Options for [`Preloader::preinit`](crate::Preloader::preinit)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreinitOptions {
    #[serde(rename = "as")]
    pub destination: PreinitAs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<CrossOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    /// Only meaningful for stylesheets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<Precedence>,
}

impl PreinitOptions {
    pub fn script() -> Self {
        Self {
            destination: PreinitAs::Script,
            cross_origin: None,
            integrity: None,
            precedence: None,
        }
    }

    pub fn style(precedence: Precedence) -> Self {
        Self {
            destination: PreinitAs::Style,
            cross_origin: None,
            integrity: None,
            precedence: Some(precedence),
        }
    }

    pub fn with_cross_origin(mut self, cross_origin: CrossOrigin) -> Self {
        self.cross_origin = Some(cross_origin);
        self
    }

    pub fn with_integrity(mut self, integrity: &str) -> Self {
        self.integrity = Some(integrity.to_string());
        self
    }
}

/// Options for DNS prefetch and preconnect hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<CrossOrigin>,
}

impl ConnectOptions {
    pub fn anonymous() -> Self {
        Self {
            cross_origin: Some(CrossOrigin::Anonymous),
        }
    }
}

/// Completion state of a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintOutcome {
    Pending,
    Success,
    Failure,
}

/// Registry key: one hint per canonical URL (or origin) and kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HintKey {
    pub url: String,
    pub kind: HintKind,
}

impl HintKey {
    /// Canonicalize `href` for `kind`, resolving relative hrefs against `base`.
    ///
    /// Preload and preinit hints keep the full URL; DNS prefetch and preconnect
    /// hints are reduced to the ASCII origin.
    pub fn resolve(href: &str, kind: HintKind, base: Option<&Url>) -> Result<Self, PreloadError> {
        let url = canonicalize(href, base)?;
        let url = if kind.is_origin_scoped() {
            url.origin().ascii_serialization()
        } else {
            url.to_string()
        };
        Ok(Self { url, kind })
    }
}

impl fmt::Display for HintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.url)
    }
}

/// Parse `href` relative to `base` and accept only http(s) URLs
pub fn canonicalize(href: &str, base: Option<&Url>) -> Result<Url, PreloadError> {
    let url = Url::options()
        .base_url(base)
        .parse(href.trim())
        .map_err(|err| PreloadError::InvalidUrl {
            href: href.to_string(),
            reason: err.to_string(),
        })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(PreloadError::UnsupportedScheme {
            href: href.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// One outstanding or completed resource hint
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceHint {
    /// Canonical URL, or origin for DNS prefetch / preconnect
    pub url: String,
    pub kind: HintKind,
    /// Destination, for preload and preinit only
    pub sub_kind: Option<ResourceAs>,
    pub priority: FetchPriority,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
    pub outcome: HintOutcome,
    pub error_detail: Option<String>,
}

impl ResourceHint {
    pub(crate) fn pending(
        key: HintKey,
        sub_kind: Option<ResourceAs>,
        priority: FetchPriority,
    ) -> Self {
        Self {
            url: key.url,
            kind: key.kind,
            sub_kind,
            priority,
            started_at: Instant::now(),
            completed_at: None,
            outcome: HintOutcome::Pending,
            error_detail: None,
        }
    }

    pub fn key(&self) -> HintKey {
        HintKey {
            url: self.url.clone(),
            kind: self.kind,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == HintOutcome::Pending
    }

    /// Time from issue to completion, if completed
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .map(|completed| completed.saturating_duration_since(self.started_at))
    }
}
