//! The UA dialog context and its public entry points.
//!
//! One [`Ua`] holds one SIP dialog from setup to release. Inbound
//! requests and responses arrive from the transaction manager,
//! call-control events arrive from the application controller, and
//! timer expiries arrive from spawned timer tasks; all three enter
//! through the session lock and are handled by the current state, which
//! may atomically replace itself.

pub mod state;

mod connected;
mod terminal;
mod uac;
mod uas;

pub use state::UaState;

use crate::body::MsgBody;
use crate::event::{CcEvent, EventInfo};
use crate::monotime::MonoTime;
use crate::rsip_ext::{
    extract_uri_from_contact, make_branch, make_call_id, make_tag, make_via, record_route_set,
    status_code, status_code_value,
};
use crate::timer::{self, TimerHandle};
use crate::transaction::{
    ClientTransaction, ResponseConsumer, ServerTransaction, SipTransactionManager,
};
use crate::{Error, Result};
use rand::Rng;
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};
use rsip::{Header, Param, Request, Response, SipMessage};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

pub type CcEventSender = UnboundedSender<CcEvent>;
pub type CcEventReceiver = UnboundedReceiver<CcEvent>;

/// Continuation handed to the SDP-rewrite hooks; invoking it with the
/// rewritten body resumes the suspended transition.
pub type SdpUpdateContinuation = Box<dyn FnOnce(MsgBody) + Send>;

pub type OnLocalSdpChange = Arc<dyn Fn(MsgBody, &CcEvent, SdpUpdateContinuation) + Send + Sync>;
pub type OnRemoteSdpChange = Arc<dyn Fn(MsgBody, &SipMessage, SdpUpdateContinuation) + Send + Sync>;
pub type RingCb = Arc<dyn Fn(MonoTime, &str, u16) + Send + Sync>;
pub type DisconnectCb = Arc<dyn Fn(Option<MonoTime>, &str, u16, Option<&Request>) + Send + Sync>;
pub type BeforeRequestSent = Arc<dyn Fn(&mut Request) + Send + Sync>;

/// Controller callbacks held by the UA. All optional.
///
/// The SDP-change hooks may complete their continuation synchronously
/// or from another thread; either way the continuation re-enters the
/// UA through the session lock. The hooks themselves run outside the
/// lock and must not call back into the UA directly.
#[derive(Default, Clone)]
pub struct UaCallbacks {
    pub on_local_sdp_change: Option<OnLocalSdpChange>,
    pub on_remote_sdp_change: Option<OnRemoteSdpChange>,
    pub ring_cb: Option<RingCb>,
    pub disconnect_cb: Option<DisconnectCb>,
    pub before_request_sent: Option<BeforeRequestSent>,
}

/// Per-dialog configuration.
#[derive(Clone)]
pub struct UaConfig {
    /// Value of the User-Agent / Server header on outbound messages.
    pub user_agent: String,
    /// Producer name stamped on emitted events.
    pub origin: String,
    /// host:port placed into the Via sent-by of locally built requests.
    pub via_host: String,
    /// Local Contact URI.
    pub contact: rsip::Uri,
    /// No-reply window after the INVITE leaves.
    pub nr_time: Option<Duration>,
    /// No-progress window after a 100.
    pub np_time: Option<Duration>,
    /// Expiry window while ringing.
    pub ex_time: Option<Duration>,
    /// Maximum connected time; the call is torn down when it runs out.
    pub credit_time: Option<Duration>,
    /// How long a late-media 2xx may wait for its ACK.
    pub ack_wait_time: Duration,
    /// Settle delay between Disconnected/Failed and Dead.
    pub dead_time: Duration,
    /// Copy 401/407 challenges into CCEventFail.
    pub pass_auth: bool,
    /// Offer late-media negotiation on the UAC side.
    pub late_media: bool,
}

impl UaConfig {
    pub fn new(via_host: impl Into<String>, contact: rsip::Uri) -> Self {
        UaConfig {
            user_agent: concat!("rsipua/", env!("CARGO_PKG_VERSION")).to_string(),
            origin: "ua".to_string(),
            via_host: via_host.into(),
            contact,
            nr_time: Some(Duration::from_secs(32)),
            np_time: None,
            ex_time: None,
            credit_time: None,
            ack_wait_time: Duration::from_secs(32),
            dead_time: Duration::from_secs(32),
            pass_auth: false,
            late_media: false,
        }
    }
}

/// Parameters of an outbound call.
pub struct InviteOption {
    pub caller: rsip::Uri,
    pub callee: rsip::Uri,
    pub call_id: Option<String>,
    pub body: Option<MsgBody>,
    pub headers: Option<Vec<Header>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    NoReply,
    NoProgress,
    Expire,
    Credit,
    AckWait,
    Dead,
}

#[derive(Default)]
struct Timers {
    no_reply: Option<TimerHandle>,
    no_progress: Option<TimerHandle>,
    expire: Option<TimerHandle>,
    credit: Option<TimerHandle>,
    ack_wait: Option<TimerHandle>,
    dead: Option<TimerHandle>,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<TimerHandle> {
        match kind {
            TimerKind::NoReply => &mut self.no_reply,
            TimerKind::NoProgress => &mut self.no_progress,
            TimerKind::Expire => &mut self.expire,
            TimerKind::Credit => &mut self.credit,
            TimerKind::AckWait => &mut self.ack_wait,
            TimerKind::Dead => &mut self.dead,
        }
    }
}

/// Work recorded during a handler and executed after the session lock
/// is released: SDP-rewrite hook invocations whose continuations
/// re-enter the UA.
enum Deferred {
    /// Outbound body rewrite; the continuation re-injects `event`.
    LocalSdp { body: MsgBody, event: CcEvent },
    /// Outbound body rewrite gating the initial INVITE; the
    /// continuation stores the body and re-runs activation.
    LocalSdpActivate { body: MsgBody, event: CcEvent },
    /// Inbound body rewrite; the continuation lands in
    /// `delayed_remote_sdp_update`.
    RemoteSdp {
        body: MsgBody,
        msg: SipMessage,
        event: CcEvent,
    },
}

/// The dialog context proper, always accessed under the session lock.
pub struct UaCore {
    pub(crate) config: UaConfig,
    pub(crate) cbs: UaCallbacks,
    tm: Arc<dyn SipTransactionManager>,
    event_tx: CcEventSender,
    this: Weak<Mutex<UaCore>>,

    pub(crate) state: UaState,

    // identity
    pub(crate) call_id: String,
    pub(crate) local_addr: rsip::typed::From,
    pub(crate) remote_addr: rsip::typed::To,
    pub(crate) local_cseq: u32,
    pub(crate) remote_cseq: Option<u32>,
    pub(crate) invite_cseq: u32,

    // routing
    pub(crate) remote_target: rsip::Uri,
    pub(crate) route_set: Vec<rsip::headers::Route>,
    pub(crate) invite_headers: Vec<Header>,

    // timestamps
    pub(crate) setup_ts: Option<MonoTime>,
    pub(crate) p100_ts: Option<MonoTime>,
    pub(crate) p1xx_ts: Option<MonoTime>,
    pub(crate) connect_ts: Option<MonoTime>,
    pub(crate) disconnect_ts: Option<MonoTime>,
    pub(crate) last_scode: u16,

    // negotiated bodies
    pub(crate) lsdp: Option<MsgBody>,
    pub(crate) rsdp: Option<MsgBody>,
    pub(crate) late_media: bool,

    // transaction handles
    pub(crate) client_tr: Option<Arc<dyn ClientTransaction>>,
    pub(crate) pending_tr: Option<Arc<dyn ClientTransaction>>,
    pub(crate) server_tr: Option<Arc<dyn ServerTransaction>>,
    pub(crate) uas_request: Option<Request>,

    timers: Timers,
    deferred: Vec<Deferred>,
}

/// Clonable handle to one dialog.
#[derive(Clone)]
pub struct Ua {
    inner: Arc<Mutex<UaCore>>,
}

impl Ua {
    /// Create the caller side of a new dialog. Nothing is sent until
    /// [`Ua::activate`].
    pub fn new_uac(
        config: UaConfig,
        cbs: UaCallbacks,
        tm: Arc<dyn SipTransactionManager>,
        event_tx: CcEventSender,
        opt: InviteOption,
    ) -> Ua {
        let local_addr = rsip::typed::From {
            display_name: None,
            uri: opt.caller,
            params: vec![Param::Tag(make_tag().into())],
        };
        let remote_addr = rsip::typed::To {
            display_name: None,
            uri: opt.callee.clone(),
            params: vec![],
        };
        let late_media = config.late_media;
        let core = UaCore {
            config,
            cbs,
            tm,
            event_tx,
            this: Weak::new(),
            state: UaState::UacIdle,
            call_id: opt.call_id.unwrap_or_else(make_call_id),
            local_addr,
            remote_addr,
            local_cseq: 0,
            remote_cseq: None,
            invite_cseq: 0,
            remote_target: opt.callee,
            route_set: Vec::new(),
            invite_headers: opt.headers.unwrap_or_default(),
            setup_ts: Some(MonoTime::now()),
            p100_ts: None,
            p1xx_ts: None,
            connect_ts: None,
            disconnect_ts: None,
            last_scode: 0,
            lsdp: opt.body,
            rsdp: None,
            late_media,
            client_tr: None,
            pending_tr: None,
            server_tr: None,
            uas_request: None,
            timers: Timers::default(),
            deferred: Vec::new(),
        };
        Self::wrap(core)
    }

    /// Create the acceptor side for a dialog-forming INVITE delivered
    /// by the transaction manager. Nothing is sent until
    /// [`Ua::activate`].
    pub fn new_uas(
        config: UaConfig,
        cbs: UaCallbacks,
        tm: Arc<dyn SipTransactionManager>,
        event_tx: CcEventSender,
        req: Request,
        rtime: MonoTime,
        tx: Arc<dyn ServerTransaction>,
    ) -> Result<Ua> {
        let call_id = req.call_id_header()?.value().to_string();
        let from = req.from_header()?.clone().typed()?;
        let to = req.to_header()?.clone().typed()?;
        let remote_cseq = req.cseq_header()?.seq()?;
        let remote_target = extract_uri_from_contact(req.contact_header()?.value())?;
        // UAS keeps the Record-Route order of the INVITE as-is
        let route_set = record_route_set(&req.headers);
        let local_addr = rsip::typed::From {
            display_name: to.display_name.clone(),
            uri: to.uri.clone(),
            params: vec![Param::Tag(make_tag().into())],
        };
        let remote_addr = rsip::typed::To {
            display_name: from.display_name.clone(),
            uri: from.uri.clone(),
            params: from.params.clone(),
        };
        let late_media = config.late_media;
        let core = UaCore {
            config,
            cbs,
            tm,
            event_tx,
            this: Weak::new(),
            state: UaState::UasIdle,
            call_id,
            local_addr,
            remote_addr,
            local_cseq: rand::rng().random_range(1..1_000_000),
            remote_cseq: Some(remote_cseq),
            invite_cseq: remote_cseq,
            remote_target,
            route_set,
            invite_headers: Vec::new(),
            setup_ts: Some(rtime),
            p100_ts: None,
            p1xx_ts: None,
            connect_ts: None,
            disconnect_ts: None,
            last_scode: 0,
            lsdp: None,
            rsdp: None,
            late_media,
            client_tr: None,
            pending_tr: None,
            server_tr: Some(tx),
            uas_request: Some(req),
            timers: Timers::default(),
            deferred: Vec::new(),
        };
        Ok(Self::wrap(core))
    }

    fn wrap(core: UaCore) -> Ua {
        let inner = Arc::new(Mutex::new(core));
        inner.lock().unwrap().this = Arc::downgrade(&inner);
        Ua { inner }
    }

    /// Run the initial state's activation: the UAC sends its INVITE,
    /// the UAS answers 100 and surfaces CCEventTry.
    pub fn activate(&self) {
        self.with_core(|core| {
            match state::on_activation(core) {
                Ok(Some(next)) => core.change_state(next),
                Ok(None) => {}
                Err(e) => error!("{}: OnActivation: {}", core.state, e),
            };
        });
    }

    /// Inbound request from the transaction manager.
    pub fn recv_request(&self, req: Request, rtime: MonoTime, tx: Arc<dyn ServerTransaction>) {
        self.with_core(|core| {
            match state::recv_request(core, req, rtime, tx) {
                Ok(Some(next)) => core.change_state(next),
                Ok(None) => {}
                Err(e) => error!("{}: RecvRequest: {}", core.state, e),
            };
        });
    }

    /// Call-control event from the application controller.
    pub fn recv_event(&self, event: CcEvent) {
        self.with_core(|core| {
            match state::recv_event(core, event) {
                Ok(Some(next)) => core.change_state(next),
                Ok(None) => {}
                Err(e) => error!("{}: RecvEvent: {}", core.state, e),
            };
        });
    }

    /// Local or transaction-manager-routed cancellation. Valid in any
    /// non-terminal state: emits CCEventDisconnect, stamps the
    /// disconnect time, and moves to Disconnected.
    pub fn cancel(&self, rtime: MonoTime, req: Option<Request>) {
        self.with_core(|core| {
            if core.state.is_terminal() {
                return;
            }
            if let Some(tr) = core.client_tr.take() {
                tr.cancel(Vec::new());
            }
            let sip_reason = req
                .as_ref()
                .and_then(|r| crate::rsip_ext::extension_header_value(&r.headers, "Reason"));
            let event = CcEvent::Disconnect {
                info: core.event_info(rtime),
                also: None,
                sip_reason,
            };
            core.set_disconnect_ts(rtime);
            core.change_state(UaState::Disconnected {
                req: req.map(Box::new),
            });
            core.emit(event);
        });
    }

    /// Continuation target of the remote-SDP rewrite protocol: store
    /// the (possibly rewritten) remote body and surface the suspended
    /// event to the controller.
    pub fn delayed_remote_sdp_update(&self, mut event: CcEvent, body: MsgBody) {
        self.with_core(|core| {
            core.rsdp = Some(body.clone_body());
            event.set_body(Some(body));
            core.emit(event);
        });
    }

    fn on_timer(&self, kind: TimerKind) {
        self.with_core(|core| {
            // a timer that lost the cancel race fires with its slot
            // already cleared
            if core.timers.slot(kind).take().is_none() {
                return;
            }
            match state::timer_expired(core, kind) {
                Ok(Some(next)) => core.change_state(next),
                Ok(None) => {}
                Err(e) => error!("{}: timer {:?}: {}", core.state, kind, e),
            };
        });
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut UaCore) -> R) -> R {
        let (r, deferred) = {
            let mut core = self.inner.lock().unwrap();
            let r = f(&mut core);
            (r, std::mem::take(&mut core.deferred))
        };
        self.run_deferred(deferred);
        r
    }

    fn run_deferred(&self, deferred: Vec<Deferred>) {
        if deferred.is_empty() {
            return;
        }
        let (local_hook, remote_hook) = {
            let core = self.inner.lock().unwrap();
            (
                core.cbs.on_local_sdp_change.clone(),
                core.cbs.on_remote_sdp_change.clone(),
            )
        };
        for d in deferred {
            match d {
                Deferred::LocalSdp { body, event } => {
                    if let Some(hook) = &local_hook {
                        let ua = self.clone();
                        let resume = event.clone();
                        hook(
                            body,
                            &event,
                            Box::new(move |rewritten| {
                                let mut resume = resume;
                                resume.set_body(Some(rewritten));
                                ua.recv_event(resume);
                            }),
                        );
                    }
                }
                Deferred::LocalSdpActivate { body, event } => {
                    if let Some(hook) = &local_hook {
                        let ua = self.clone();
                        hook(
                            body,
                            &event,
                            Box::new(move |rewritten| {
                                ua.with_core(|core| core.lsdp = Some(rewritten));
                                ua.activate();
                            }),
                        );
                    }
                }
                Deferred::RemoteSdp { body, msg, event } => {
                    if let Some(hook) = &remote_hook {
                        let ua = self.clone();
                        hook(
                            body,
                            &msg,
                            Box::new(move |rewritten| {
                                ua.delayed_remote_sdp_update(event, rewritten);
                            }),
                        );
                    }
                }
            }
        }
    }

    // ---- observers ----

    pub fn state_name(&self) -> String {
        self.inner.lock().unwrap().state.to_string()
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.lock().unwrap().state.is_terminal()
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, UaState::Dead)
    }

    pub fn call_id(&self) -> String {
        self.inner.lock().unwrap().call_id.clone()
    }

    pub fn last_scode(&self) -> u16 {
        self.inner.lock().unwrap().last_scode
    }

    pub fn setup_ts(&self) -> Option<MonoTime> {
        self.inner.lock().unwrap().setup_ts
    }

    pub fn p100_ts(&self) -> Option<MonoTime> {
        self.inner.lock().unwrap().p100_ts
    }

    pub fn p1xx_ts(&self) -> Option<MonoTime> {
        self.inner.lock().unwrap().p1xx_ts
    }

    pub fn connect_ts(&self) -> Option<MonoTime> {
        self.inner.lock().unwrap().connect_ts
    }

    pub fn disconnect_ts(&self) -> Option<MonoTime> {
        self.inner.lock().unwrap().disconnect_ts
    }

    pub fn local_sdp(&self) -> Option<MsgBody> {
        self.inner.lock().unwrap().lsdp.clone()
    }

    pub fn remote_sdp(&self) -> Option<MsgBody> {
        self.inner.lock().unwrap().rsdp.clone()
    }

    pub fn remote_target(&self) -> rsip::Uri {
        self.inner.lock().unwrap().remote_target.clone()
    }

    pub fn remote_tag(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .remote_addr
            .params
            .iter()
            .find_map(|p| match p {
                Param::Tag(tag) => Some(tag.value().to_string()),
                _ => None,
            })
    }
}

impl ResponseConsumer for Ua {
    fn recv_response(&self, resp: Response, rtime: MonoTime, tx: Arc<dyn ClientTransaction>) {
        self.with_core(|core| {
            match state::recv_response(core, resp, rtime, tx) {
                Ok(Some(next)) => core.change_state(next),
                Ok(None) => {}
                Err(e) => error!("{}: RecvResponse: {}", core.state, e),
            };
        });
    }
}

impl UaCore {
    pub(crate) fn change_state(&mut self, next: UaState) {
        let mut next = next;
        loop {
            info!("{}: {} -> {}", self.call_id, self.state, next);
            self.state = next;
            match state::on_activation(self) {
                Ok(Some(n)) => next = n,
                Ok(None) => break,
                Err(e) => {
                    error!("{}: OnActivation: {}", self.state, e);
                    break;
                }
            }
        }
    }

    pub(crate) fn emit(&mut self, event: CcEvent) {
        debug!("{}: emitting {}", self.call_id, event);
        if self.event_tx.send(event).is_err() {
            debug!("event receiver dropped, discarding");
        }
    }

    pub(crate) fn event_info(&self, rtime: MonoTime) -> EventInfo {
        EventInfo::new(rtime, self.config.origin.clone())
    }

    pub(crate) fn self_handle(&self) -> Option<Ua> {
        self.this.upgrade().map(|inner| Ua { inner })
    }

    // ---- hooks ----

    pub(crate) fn has_on_local_sdp_change(&self) -> bool {
        self.cbs.on_local_sdp_change.is_some()
    }

    pub(crate) fn has_on_remote_sdp_change(&self) -> bool {
        self.cbs.on_remote_sdp_change.is_some()
    }

    pub(crate) fn run_ring_cb(&self, rtime: MonoTime, origin: &str, scode: u16) {
        if let Some(cb) = &self.cbs.ring_cb {
            cb(rtime, origin, scode);
        }
    }

    pub(crate) fn run_disconnect_cb(&self, req: Option<&Request>) {
        if let Some(cb) = &self.cbs.disconnect_cb {
            cb(self.disconnect_ts, &self.config.origin, self.last_scode, req);
        }
    }

    pub(crate) fn defer_local_sdp(&mut self, body: MsgBody, event: CcEvent) {
        self.deferred.push(Deferred::LocalSdp { body, event });
    }

    pub(crate) fn defer_local_sdp_activation(&mut self, body: MsgBody, event: CcEvent) {
        self.deferred.push(Deferred::LocalSdpActivate { body, event });
    }

    pub(crate) fn defer_remote_sdp(&mut self, body: MsgBody, msg: SipMessage, event: CcEvent) {
        self.deferred.push(Deferred::RemoteSdp { body, msg, event });
    }

    // ---- timestamps ----

    /// Stamp the disconnect time, once. A transaction-manager clock
    /// ahead of ours must not produce a negative call duration: when
    /// `rtime` precedes the setup time the current monotime is used.
    pub(crate) fn set_disconnect_ts(&mut self, rtime: MonoTime) {
        if self.disconnect_ts.is_some() {
            return;
        }
        self.disconnect_ts = match self.setup_ts {
            Some(setup) if !setup.after(&rtime) => Some(rtime),
            _ => Some(MonoTime::now()),
        };
    }

    // ---- message building ----

    /// Build an in-dialog request in this dialog's context.
    ///
    /// `cseq` overrides the sequence number (the ACK reuses the INVITE
    /// CSeq); otherwise the local counter is bumped.
    pub(crate) fn gen_request(
        &mut self,
        method: rsip::Method,
        body: Option<MsgBody>,
        cseq: Option<u32>,
        extra_headers: &[Header],
    ) -> Request {
        let seq = cseq.unwrap_or_else(|| {
            self.local_cseq += 1;
            self.local_cseq
        });
        let mut headers: Vec<Header> = Vec::new();
        headers.push(Header::Via(make_via(&self.config.via_host, &make_branch())));
        headers.push(Header::CallId(self.call_id.clone().into()));
        headers.push(Header::From(self.local_addr.clone().into()));
        headers.push(Header::To(self.remote_addr.clone().into()));
        headers.push(Header::CSeq(rsip::typed::CSeq { seq, method }.into()));
        headers.push(Header::UserAgent(self.config.user_agent.clone().into()));
        headers.push(Header::Contact(
            rsip::typed::Contact {
                display_name: None,
                uri: self.config.contact.clone(),
                params: vec![],
            }
            .into(),
        ));
        for route in &self.route_set {
            headers.push(Header::Route(route.clone()));
        }
        headers.push(Header::MaxForwards(70.into()));
        for h in extra_headers {
            headers.push(h.clone());
        }
        let body_bytes = match body {
            Some(mut b) => {
                headers.push(Header::ContentType(b.mtype().to_string().into()));
                b.as_string().into_bytes()
            }
            None => Vec::new(),
        };
        headers.push(Header::ContentLength((body_bytes.len() as u32).into()));
        Request {
            method,
            uri: self.remote_target.clone(),
            headers: headers.into(),
            version: rsip::Version::V2,
            body: body_bytes,
        }
    }

    /// Hand a request to the transaction manager, running the
    /// before-send hook first.
    pub(crate) fn send_request(
        &mut self,
        mut req: Request,
        consumer: Option<Arc<dyn ResponseConsumer>>,
    ) -> Result<Arc<dyn ClientTransaction>> {
        if let Some(hook) = &self.cbs.before_request_sent {
            hook(&mut req);
        }
        self.tm.begin_client_transaction(req, None, consumer)
    }

    /// Build a response to `req` in this dialog's context. Any
    /// non-100 response carries the local tag in To.
    pub(crate) fn make_response(
        &mut self,
        req: &Request,
        code: u16,
        body: Option<MsgBody>,
        contacts: Option<Vec<rsip::typed::Contact>>,
        extra_headers: &[Header],
    ) -> Result<Response> {
        let mut headers: Vec<Header> = Vec::new();
        for h in req.headers.iter() {
            match h {
                Header::Via(_)
                | Header::From(_)
                | Header::CSeq(_)
                | Header::CallId(_)
                | Header::RecordRoute(_) => headers.push(h.clone()),
                Header::To(to) => {
                    let mut to = to.clone().typed()?;
                    if code > 100 && !to.params.iter().any(|p| matches!(p, Param::Tag(_))) {
                        to.params.push(Param::Tag(self.local_tag().into()));
                    }
                    headers.push(Header::To(to.into()));
                }
                _ => {}
            }
        }
        if let Some(contacts) = contacts {
            for c in contacts {
                headers.push(Header::Contact(c.into()));
            }
        }
        headers.push(Header::Server(self.config.user_agent.clone().into()));
        for h in extra_headers {
            headers.push(h.clone());
        }
        let body_bytes = match body {
            Some(mut b) => {
                headers.push(Header::ContentType(b.mtype().to_string().into()));
                b.as_string().into_bytes()
            }
            None => Vec::new(),
        };
        headers.push(Header::ContentLength((body_bytes.len() as u32).into()));
        Ok(Response {
            status_code: status_code(code),
            version: req.version.clone(),
            headers: headers.into(),
            body: body_bytes,
        })
    }

    /// Send a response on the INVITE server transaction.
    pub(crate) fn send_uas_response(
        &mut self,
        code: u16,
        body: Option<MsgBody>,
        contacts: Option<Vec<rsip::typed::Contact>>,
        ack_wait: bool,
        extra_headers: &[Header],
    ) -> Result<()> {
        let req = self
            .uas_request
            .clone()
            .ok_or_else(|| Error::Internal("no UAS request to respond to".to_string()))?;
        let resp = self.make_response(&req, code, body, contacts, extra_headers)?;
        if code >= 200 {
            self.last_scode = code;
        }
        let tx = self
            .server_tr
            .clone()
            .ok_or_else(|| Error::Internal("no server transaction".to_string()))?;
        tx.send_response(resp, ack_wait)
    }

    pub(crate) fn local_tag(&self) -> String {
        self.local_addr
            .params
            .iter()
            .find_map(|p| match p {
                Param::Tag(tag) => Some(tag.value().to_string()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub(crate) fn local_contacts(&self) -> Vec<rsip::typed::Contact> {
        vec![rsip::typed::Contact {
            display_name: None,
            uri: self.config.contact.clone(),
            params: vec![],
        }]
    }

    /// Adopt routing from a 2xx: route set is the reversed
    /// Record-Route order, remote target comes from Contact.
    pub(crate) fn update_routing(&mut self, resp: &Response) {
        let mut routes = record_route_set(&resp.headers);
        routes.reverse();
        self.route_set = routes;
        if let Ok(contact) = resp.contact_header() {
            match extract_uri_from_contact(contact.value()) {
                Ok(uri) => self.remote_target = uri,
                Err(e) => debug!("unusable Contact on {}: {}", status_code_value(&resp.status_code), e),
            }
        }
    }

    pub(crate) fn set_remote_tag(&mut self, tag: &str) {
        self.remote_addr
            .params
            .retain(|p| !matches!(p, Param::Tag(_)));
        self.remote_addr
            .params
            .push(Param::Tag(tag.to_string().into()));
    }

    // ---- timers ----

    fn spawn_timer(&self, at: MonoTime, kind: TimerKind) -> TimerHandle {
        let weak = self.this.clone();
        timer::schedule_at(at, move || {
            if let Some(inner) = weak.upgrade() {
                Ua { inner }.on_timer(kind);
            }
        })
    }

    fn start_timer(&mut self, kind: TimerKind, at: MonoTime) {
        let handle = self.spawn_timer(at, kind);
        *self.timers.slot(kind) = Some(handle);
    }

    pub(crate) fn cancel_timer(&mut self, kind: TimerKind) {
        if let Some(t) = self.timers.slot(kind).take() {
            t.cancel();
        }
    }

    pub(crate) fn timer_armed(&mut self, kind: TimerKind) -> bool {
        self.timers.slot(kind).is_some()
    }

    pub(crate) fn start_no_reply_timer(&mut self) {
        if let Some(d) = self.config.nr_time {
            self.start_timer(TimerKind::NoReply, MonoTime::now() + d);
        }
    }

    pub(crate) fn start_no_progress_timer(&mut self) {
        if let Some(d) = self.config.np_time {
            self.start_timer(TimerKind::NoProgress, MonoTime::now() + d);
        }
    }

    pub(crate) fn start_expire_timer(&mut self) {
        if let Some(d) = self.config.ex_time {
            self.start_timer(TimerKind::Expire, MonoTime::now() + d);
        }
    }

    /// Credit runs from the connect time, not from now.
    pub(crate) fn start_credit_timer(&mut self, rtime: MonoTime) {
        if let Some(d) = self.config.credit_time {
            self.start_timer(TimerKind::Credit, rtime + d);
        }
    }

    pub(crate) fn start_ack_wait_timer(&mut self) {
        let d = self.config.ack_wait_time;
        self.start_timer(TimerKind::AckWait, MonoTime::now() + d);
    }

    pub(crate) fn start_dead_timer(&mut self) {
        let d = self.config.dead_time;
        self.start_timer(TimerKind::Dead, MonoTime::now() + d);
    }

    pub(crate) fn cancel_all_timers(&mut self) {
        for kind in [
            TimerKind::NoReply,
            TimerKind::NoProgress,
            TimerKind::Expire,
            TimerKind::Credit,
            TimerKind::AckWait,
        ] {
            self.cancel_timer(kind);
        }
    }
}
