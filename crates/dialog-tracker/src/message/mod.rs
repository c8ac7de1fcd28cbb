//! Message access for dialog tracking
//!
//! The tracker never parses SIP itself. It reads the handful of fields it
//! needs through [`SipMessage`], implemented by whatever parser the proxy
//! uses, and writes exactly one thing back: the dialog route parameter on
//! the Record-Route header this server inserted.
//!
//! [`SimpleMessage`] is a plain-field implementation for embedders that
//! already hold the values and for tests.

pub mod method;
pub mod simple;

use std::net::SocketAddr;

pub use method::Method;
pub use simple::SimpleMessage;

/// Read access to a parsed SIP message plus the route-parameter helper
///
/// Implementations are expected to cache parsed headers so repeated calls
/// are cheap.
pub trait SipMessage: Send + Sync {
    /// Process-unique id of this message, stable while it is being handled
    fn message_id(&self) -> u64;

    /// Request method, `None` for responses
    fn method(&self) -> Option<Method>;

    /// Response status code, `None` for requests
    fn status_code(&self) -> Option<u16>;

    fn call_id(&self) -> Option<&str>;

    fn from_uri(&self) -> Option<&str>;

    fn from_tag(&self) -> Option<&str>;

    fn to_uri(&self) -> Option<&str>;

    fn to_tag(&self) -> Option<&str>;

    /// CSeq sequence number
    fn cseq(&self) -> Option<u32>;

    /// URI of the first Contact header
    fn contact(&self) -> Option<&str>;

    /// Record-Route header values in message order
    fn record_route(&self) -> &[String];

    fn request_uri(&self) -> Option<&str>;

    /// Branch parameter of the top Via
    fn branch(&self) -> Option<&str>;

    /// Local socket the message arrived on
    fn received_on(&self) -> Option<SocketAddr>;

    /// Value of a parameter on the Route header addressed to this server
    fn route_param(&self, name: &str) -> Option<&str>;

    /// Add a parameter to the Record-Route header this server inserts
    fn add_route_param(&mut self, name: &str, value: &str) -> anyhow::Result<()>;

    fn is_request(&self) -> bool {
        self.method().is_some()
    }
}

/// Treat an empty header value the same as a missing one
pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
