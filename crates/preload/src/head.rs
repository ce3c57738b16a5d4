//! Document head abstraction.
//!
//! The preloader never touches a real DOM. It describes the element it wants
//! appended and hands it to a [`DocumentHead`] together with a callback for the
//! element's load/error event.

use std::fmt::Write as _;

use parking_lot::Mutex;

use crate::error::PreloadError;

/// Tag of an appended hint element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementTag {
    Link,
    Script,
}

/// Description of a `<link>` or `<script>` element to append to the document head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintElement {
    pub tag: ElementTag,
    /// `rel` attribute, links only
    pub rel: Option<String>,
    /// `href` for links, `src` for scripts
    pub href: String,
    /// Remaining attributes in insertion order
    pub attributes: Vec<(String, String)>,
}

impl HintElement {
    pub fn link(rel: &str, href: &str) -> Self {
        Self {
            tag: ElementTag::Link,
            rel: Some(rel.to_string()),
            href: href.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn script(src: &str) -> Self {
        Self {
            tag: ElementTag::Script,
            rel: None,
            href: src.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// Add an attribute only when `value` is set
    pub fn with_optional_attr(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value),
            None => self,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Render the element as markup (diagnostics and server-side head injection)
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        match self.tag {
            ElementTag::Link => {
                html.push_str("<link");
                if let Some(rel) = &self.rel {
                    let _ = write!(html, " rel=\"{}\"", escape_attr(rel));
                }
                let _ = write!(html, " href=\"{}\"", escape_attr(&self.href));
            }
            ElementTag::Script => {
                let _ = write!(html, "<script src=\"{}\"", escape_attr(&self.href));
            }
        }

        for (name, value) in &self.attributes {
            if value.is_empty() {
                let _ = write!(html, " {}", name);
            } else {
                let _ = write!(html, " {}=\"{}\"", name, escape_attr(value));
            }
        }

        match self.tag {
            ElementTag::Link => html.push('>'),
            ElementTag::Script => html.push_str("></script>"),
        }
        html
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Called once with the element's load (`Ok`) or error (`Err(detail)`) event
pub type SettleCallback = Box<dyn FnOnce(Result<(), String>) + Send>;

/// Host capable of appending hint elements to the document head
pub trait DocumentHead: Send + Sync {
    /// Append `element`. The host must call `on_settle` at most once, when the
    /// element loads or errors. It may call it before returning.
    fn append(&self, element: HintElement, on_settle: SettleCallback) -> Result<(), PreloadError>;
}

/// How [`InMemoryHead`] settles appended elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AutoSettle {
    /// Elements stay pending until settled explicitly
    #[default]
    Manual,
    /// Every element loads as soon as it is appended
    Success,
    /// Every element errors as soon as it is appended
    Failure(String),
}

#[derive(Default)]
struct HeadState {
    elements: Vec<HintElement>,
    pending: Vec<(String, SettleCallback)>,
    reject_with: Option<String>,
}

/// Recording document head used by tests and the simulated site session
#[derive(Default)]
pub struct InMemoryHead {
    state: Mutex<HeadState>,
    auto_settle: AutoSettle,
}

impl InMemoryHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_settle(auto_settle: AutoSettle) -> Self {
        Self {
            state: Mutex::new(HeadState::default()),
            auto_settle,
        }
    }

    /// Make every following append fail with `reason`; `None` accepts again
    pub fn reject_appends(&self, reason: Option<&str>) {
        self.state.lock().reject_with = reason.map(str::to_string);
    }

    /// Every element appended so far
    pub fn elements(&self) -> Vec<HintElement> {
        self.state.lock().elements.clone()
    }

    pub fn elements_with_rel(&self, rel: &str) -> Vec<HintElement> {
        self.state
            .lock()
            .elements
            .iter()
            .filter(|element| element.rel.as_deref() == Some(rel))
            .cloned()
            .collect()
    }

    /// Number of appended elements pointing at `href`
    pub fn count_for_href(&self, href: &str) -> usize {
        self.state
            .lock()
            .elements
            .iter()
            .filter(|element| element.href == href)
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Settle every pending element for `href`; returns how many were settled
    pub fn settle(&self, href: &str, result: Result<(), String>) -> usize {
        let callbacks: Vec<SettleCallback> = {
            let mut state = self.state.lock();
            let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|(pending_href, _)| pending_href == href);
            state.pending = rest;
            matching.into_iter().map(|(_, callback)| callback).collect()
        };

        let settled = callbacks.len();
        for callback in callbacks {
            callback(result.clone());
        }
        settled
    }

    pub fn settle_success(&self, href: &str) -> usize {
        self.settle(href, Ok(()))
    }

    pub fn settle_failure(&self, href: &str, detail: &str) -> usize {
        self.settle(href, Err(detail.to_string()))
    }

    /// Load every pending element
    pub fn settle_all_success(&self) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending);
        let settled = pending.len();
        for (_, callback) in pending {
            callback(Ok(()));
        }
        settled
    }
}

impl DocumentHead for InMemoryHead {
    fn append(&self, element: HintElement, on_settle: SettleCallback) -> Result<(), PreloadError> {
        {
            let mut state = self.state.lock();
            if let Some(reason) = &state.reject_with {
                return Err(PreloadError::HostRejected(reason.clone()));
            }

            state.elements.push(element.clone());
            if self.auto_settle == AutoSettle::Manual {
                state.pending.push((element.href, on_settle));
                return Ok(());
            }
        }

        match &self.auto_settle {
            AutoSettle::Failure(detail) => on_settle(Err(detail.clone())),
            _ => on_settle(Ok(())),
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryHead")
            .field("elements", &state.elements.len())
            .field("pending", &state.pending.len())
            .field("auto_settle", &self.auto_settle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_link_markup() {
        let element = HintElement::link("preload", "https://datawise.bet/a\"b.webp")
            .with_attr("as", "image")
            .with_optional_attr("type", None)
            .with_attr("fetchpriority", "high");
        assert_eq!(
            element.to_html(),
            "<link rel=\"preload\" href=\"https://datawise.bet/a&quot;b.webp\" as=\"image\" fetchpriority=\"high\">"
        );
        assert_eq!(element.attr("as"), Some("image"));
        assert_eq!(element.attr("type"), None);
    }

    #[test]
    fn test_script_markup_with_boolean_attribute() {
        let element = HintElement::script("https://datawise.bet/app.js").with_attr("async", "");
        assert_eq!(element.to_html(), "<script src=\"https://datawise.bet/app.js\" async></script>");
    }

    #[test]
    fn test_manual_settle_runs_callback_once() {
        let head = InMemoryHead::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        head.append(
            HintElement::link("preload", "https://datawise.bet/a.webp"),
            Box::new(move |result| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ).unwrap();

        assert_eq!(head.pending_count(), 1);
        assert_eq!(head.settle_success("https://datawise.bet/a.webp"), 1);
        assert_eq!(head.settle_success("https://datawise.bet/a.webp"), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_append_is_not_recorded() {
        let head = InMemoryHead::new();
        head.reject_appends(Some("head detached"));
        let result = head.append(HintElement::link("preconnect", "https://x.test"), Box::new(|_| {}));
        assert_eq!(result, Err(PreloadError::HostRejected("head detached".into())));
        assert!(head.elements().is_empty());
    }
}
