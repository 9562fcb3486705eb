//! Call-control events: the typed messages crossing the boundary
//! between the UA and the application call controller, in both
//! directions.

use crate::body::MsgBody;
use crate::monotime::MonoTime;
use rsip::Header;
use std::fmt;

/// Fields every call-control event carries: when the triggering message
/// hit the wire, which entity produced the event, and any opaque SIP
/// headers to copy onto messages sent on its behalf.
#[derive(Debug, Clone)]
pub struct EventInfo {
    pub rtime: MonoTime,
    pub origin: String,
    pub extra_headers: Vec<Header>,
}

impl EventInfo {
    pub fn new(rtime: MonoTime, origin: impl Into<String>) -> Self {
        EventInfo {
            rtime,
            origin: origin.into(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_extra_headers(mut self, extra_headers: Vec<Header>) -> Self {
        self.extra_headers = extra_headers;
        self
    }
}

/// A call-control event.
///
/// Events are not mutated after emission; the UA clones whatever it has
/// to retain past the handler.
#[derive(Debug, Clone)]
pub enum CcEvent {
    /// A new dialog-forming INVITE reached the UAS side.
    Try {
        info: EventInfo,
        scode: u16,
        call_id: String,
        caller: rsip::typed::From,
        callee: rsip::typed::To,
        body: Option<MsgBody>,
    },
    Ring {
        info: EventInfo,
        scode: u16,
        reason: String,
        body: Option<MsgBody>,
    },
    /// 2xx without a final answer body yet (late media).
    PreConnect {
        info: EventInfo,
        scode: u16,
        reason: String,
        body: Option<MsgBody>,
    },
    Connect {
        info: EventInfo,
        scode: u16,
        reason: String,
        body: Option<MsgBody>,
    },
    Redirect {
        info: EventInfo,
        scode: u16,
        reason: String,
        body: Option<MsgBody>,
        contacts: Vec<rsip::typed::Contact>,
    },
    Fail {
        info: EventInfo,
        scode: u16,
        reason: String,
        /// WWW-/Proxy-Authenticate copied off a 401/407 when the UA is
        /// configured to pass challenges through.
        challenge: Option<Header>,
        /// RFC 3326 Reason header value, verbatim.
        sip_reason: Option<String>,
    },
    Disconnect {
        info: EventInfo,
        /// SIP Also target for blind transfer.
        also: Option<rsip::typed::Contact>,
        sip_reason: Option<String>,
    },
    /// In-dialog media renegotiation.
    Update {
        info: EventInfo,
        body: Option<MsgBody>,
    },
}

impl CcEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CcEvent::Try { .. } => "Try",
            CcEvent::Ring { .. } => "Ring",
            CcEvent::PreConnect { .. } => "PreConnect",
            CcEvent::Connect { .. } => "Connect",
            CcEvent::Redirect { .. } => "Redirect",
            CcEvent::Fail { .. } => "Fail",
            CcEvent::Disconnect { .. } => "Disconnect",
            CcEvent::Update { .. } => "Update",
        }
    }

    pub fn info(&self) -> &EventInfo {
        match self {
            CcEvent::Try { info, .. }
            | CcEvent::Ring { info, .. }
            | CcEvent::PreConnect { info, .. }
            | CcEvent::Connect { info, .. }
            | CcEvent::Redirect { info, .. }
            | CcEvent::Fail { info, .. }
            | CcEvent::Disconnect { info, .. }
            | CcEvent::Update { info, .. } => info,
        }
    }

    pub fn rtime(&self) -> MonoTime {
        self.info().rtime
    }

    pub fn origin(&self) -> &str {
        &self.info().origin
    }

    pub fn extra_headers(&self) -> &[Header] {
        &self.info().extra_headers
    }

    pub fn body(&self) -> Option<&MsgBody> {
        match self {
            CcEvent::Try { body, .. }
            | CcEvent::Ring { body, .. }
            | CcEvent::PreConnect { body, .. }
            | CcEvent::Connect { body, .. }
            | CcEvent::Redirect { body, .. }
            | CcEvent::Update { body, .. } => body.as_ref(),
            CcEvent::Fail { .. } | CcEvent::Disconnect { .. } => None,
        }
    }

    /// Replace the carried body; used by the SDP-rewrite continuations
    /// to re-inject an event whose body the controller has rewritten.
    pub fn set_body(&mut self, new_body: Option<MsgBody>) {
        match self {
            CcEvent::Try { body, .. }
            | CcEvent::Ring { body, .. }
            | CcEvent::PreConnect { body, .. }
            | CcEvent::Connect { body, .. }
            | CcEvent::Redirect { body, .. }
            | CcEvent::Update { body, .. } => *body = new_body,
            CcEvent::Fail { .. } | CcEvent::Disconnect { .. } => {}
        }
    }

    /// Final or provisional status code the event reports, if it has one.
    pub fn scode(&self) -> Option<u16> {
        match self {
            CcEvent::Try { scode, .. }
            | CcEvent::Ring { scode, .. }
            | CcEvent::PreConnect { scode, .. }
            | CcEvent::Connect { scode, .. }
            | CcEvent::Redirect { scode, .. }
            | CcEvent::Fail { scode, .. } => Some(*scode),
            CcEvent::Disconnect { .. } | CcEvent::Update { .. } => None,
        }
    }
}

impl fmt::Display for CcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scode() {
            Some(scode) => write!(f, "CCEvent{}({})", self.kind(), scode),
            None => write!(f, "CCEvent{}", self.kind()),
        }
    }
}
