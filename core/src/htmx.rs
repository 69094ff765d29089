//! htmx request and response headers.
//!
//! See <https://htmx.org/reference/#headers>. Partials are the usual answer to a request
//! for which [`HtmxContext::is_htmx`] is true.

use crate::context::Context;
use crate::error::ContextError;

pub trait HtmxContext: Context {
    /// `HX-Request: true`
    fn is_htmx(&self) -> bool {
        self.header("hx-request") == Some("true")
    }

    /// `HX-Boosted: true`
    fn is_boosted(&self) -> bool {
        self.header("hx-boosted") == Some("true")
    }

    fn hx_target(&self) -> Option<&str> {
        self.header("hx-target")
    }

    fn hx_trigger(&self) -> Option<&str> {
        self.header("hx-trigger")
    }

    fn hx_current_url(&self) -> Option<&str> {
        self.header("hx-current-url")
    }

    /// Client-side redirect without a full page load.
    fn hx_redirect(&mut self, location: &str) -> Result<(), ContextError> {
        self.set_header("hx-redirect", location)
    }

    fn hx_push_url(&mut self, url: &str) -> Result<(), ContextError> {
        self.set_header("hx-push-url", url)
    }

    fn hx_retarget(&mut self, selector: &str) -> Result<(), ContextError> {
        self.set_header("hx-retarget", selector)
    }

    fn hx_reswap(&mut self, strategy: &str) -> Result<(), ContextError> {
        self.set_header("hx-reswap", strategy)
    }

    fn hx_trigger_event(&mut self, event: &str) -> Result<(), ContextError> {
        self.set_header("hx-trigger", event)
    }

    fn hx_refresh(&mut self) -> Result<(), ContextError> {
        self.set_header("hx-refresh", "true")
    }
}

impl<C: Context> HtmxContext for C {}
