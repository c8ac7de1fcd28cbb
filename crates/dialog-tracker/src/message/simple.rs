//! Plain-field message implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Method, SipMessage};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A message whose fields are set directly rather than parsed
///
/// ```
/// use rvoip_dialog_tracker::message::{Method, SimpleMessage, SipMessage};
///
/// let invite = SimpleMessage::request(Method::Invite, "abc")
///     .with_from("sip:alice@example.com", Some("f1"))
///     .with_to("sip:bob@example.com", None)
///     .with_cseq(1)
///     .with_contact("sip:alice@10.0.0.1");
///
/// assert_eq!(invite.call_id(), Some("abc"));
/// assert!(invite.to_tag().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SimpleMessage {
    id: u64,
    method: Option<Method>,
    status_code: Option<u16>,
    call_id: Option<String>,
    from_uri: Option<String>,
    from_tag: Option<String>,
    to_uri: Option<String>,
    to_tag: Option<String>,
    cseq: Option<u32>,
    contact: Option<String>,
    record_route: Vec<String>,
    request_uri: Option<String>,
    branch: Option<String>,
    received_on: Option<SocketAddr>,
    route_params: Vec<(String, String)>,
    added_route_params: Vec<(String, String)>,
}

impl SimpleMessage {
    fn empty() -> Self {
        Self {
            id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed),
            method: None,
            status_code: None,
            call_id: None,
            from_uri: None,
            from_tag: None,
            to_uri: None,
            to_tag: None,
            cseq: None,
            contact: None,
            record_route: Vec::new(),
            request_uri: None,
            branch: None,
            received_on: None,
            route_params: Vec::new(),
            added_route_params: Vec::new(),
        }
    }

    /// New request with the given Call-ID
    pub fn request(method: Method, call_id: &str) -> Self {
        let mut msg = Self::empty();
        msg.method = Some(method);
        msg.call_id = Some(call_id.to_string());
        msg
    }

    /// New response with the given Call-ID
    pub fn response(status_code: u16, call_id: &str) -> Self {
        let mut msg = Self::empty();
        msg.status_code = Some(status_code);
        msg.call_id = Some(call_id.to_string());
        msg
    }

    pub fn without_call_id(mut self) -> Self {
        self.call_id = None;
        self
    }

    pub fn with_from(mut self, uri: &str, tag: Option<&str>) -> Self {
        self.from_uri = Some(uri.to_string());
        self.from_tag = tag.map(str::to_string);
        self
    }

    pub fn with_to(mut self, uri: &str, tag: Option<&str>) -> Self {
        self.to_uri = Some(uri.to_string());
        self.to_tag = tag.map(str::to_string);
        self
    }

    pub fn with_cseq(mut self, cseq: u32) -> Self {
        self.cseq = Some(cseq);
        self
    }

    pub fn with_contact(mut self, contact: &str) -> Self {
        self.contact = Some(contact.to_string());
        self
    }

    /// Append a Record-Route value
    pub fn with_record_route(mut self, route: &str) -> Self {
        self.record_route.push(route.to_string());
        self
    }

    pub fn with_request_uri(mut self, uri: &str) -> Self {
        self.request_uri = Some(uri.to_string());
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    pub fn with_received_on(mut self, addr: SocketAddr) -> Self {
        self.received_on = Some(addr);
        self
    }

    /// Add a parameter to the Route header addressed to this server
    pub fn with_route_param(mut self, name: &str, value: &str) -> Self {
        self.route_params.push((name.to_string(), value.to_string()));
        self
    }

    /// Parameters added to this server's Record-Route while processing
    pub fn added_route_params(&self) -> &[(String, String)] {
        &self.added_route_params
    }
}

impl SipMessage for SimpleMessage {
    fn message_id(&self) -> u64 {
        self.id
    }

    fn method(&self) -> Option<Method> {
        self.method.clone()
    }

    fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    fn from_uri(&self) -> Option<&str> {
        self.from_uri.as_deref()
    }

    fn from_tag(&self) -> Option<&str> {
        self.from_tag.as_deref()
    }

    fn to_uri(&self) -> Option<&str> {
        self.to_uri.as_deref()
    }

    fn to_tag(&self) -> Option<&str> {
        self.to_tag.as_deref()
    }

    fn cseq(&self) -> Option<u32> {
        self.cseq
    }

    fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }

    fn record_route(&self) -> &[String] {
        &self.record_route
    }

    fn request_uri(&self) -> Option<&str> {
        self.request_uri.as_deref()
    }

    fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    fn received_on(&self) -> Option<SocketAddr> {
        self.received_on
    }

    fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value.as_str())
    }

    fn add_route_param(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        if name.is_empty() {
            anyhow::bail!("route parameter name must not be empty");
        }
        self.added_route_params.push((name.to_string(), value.to_string()));
        Ok(())
    }
}
