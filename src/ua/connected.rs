//! The established-dialog state, shared by both sides: in-dialog
//! requests, renegotiation, late-media completion, and teardown.

use super::state::UaState;
use super::{TimerKind, UaCore};
use crate::body::MsgBody;
use crate::event::CcEvent;
use crate::monotime::MonoTime;
use crate::rsip_ext::{extension_header_value, reason_phrase, status_code_value};
use rsip::headers::UntypedHeader;
use crate::transaction::{ClientTransaction, ResponseConsumer, ServerTransaction};
use crate::Result;
use rsip::prelude::{HeadersExt, ToTypedHeader};
use rsip::{Header, Request, Response, SipMessage};
use std::sync::Arc;
use tracing::{debug, error};

pub(crate) fn recv_request(
    core: &mut UaCore,
    req: Request,
    rtime: MonoTime,
    tx: Arc<dyn ServerTransaction>,
) -> Result<Option<UaState>> {
    // the ACK shares the INVITE CSeq; everything else must move forward
    if req.method != rsip::Method::Ack {
        let cseq = req.cseq_header()?.seq()?;
        if matches!(core.remote_cseq, Some(prev) if cseq <= prev) {
            let resp = core.make_response(&req, 500, None, None, &[])?;
            tx.send_response(resp, false)?;
            return Ok(None);
        }
        core.remote_cseq = Some(cseq);
    }
    match req.method {
        rsip::Method::Bye => {
            let ok = core.make_response(&req, 200, None, None, &[])?;
            tx.send_response(ok, false)?;
            let also = match extension_header_value(&req.headers, "Also") {
                Some(v) => Some(rsip::headers::Contact::new(v).typed()?),
                None => None,
            };
            let event = CcEvent::Disconnect {
                info: core.event_info(rtime),
                also,
                sip_reason: extension_header_value(&req.headers, "Reason"),
            };
            core.emit(event);
            core.cancel_timer(TimerKind::Credit);
            core.cancel_timer(TimerKind::AckWait);
            core.set_disconnect_ts(rtime);
            Ok(Some(UaState::Disconnected {
                req: Some(Box::new(req)),
            }))
        }
        rsip::Method::Ack => {
            // only expected while a late-media 2xx is waiting for it
            if !core.timer_armed(TimerKind::AckWait) {
                debug!("unexpected ACK in the {} state", core.state);
                return Ok(None);
            }
            core.cancel_timer(TimerKind::AckWait);
            if core.connect_ts.is_none() {
                core.connect_ts = Some(rtime);
                core.start_credit_timer(rtime);
            }
            let body = MsgBody::from_parts(&req.headers, &req.body);
            let event = CcEvent::Connect {
                info: core.event_info(rtime),
                scode: 200,
                reason: reason_phrase(200).to_string(),
                body: body.clone(),
            };
            if let Some(b) = body {
                if core.has_on_remote_sdp_change() {
                    core.defer_remote_sdp(b, SipMessage::Request(req), event);
                    return Ok(None);
                }
                core.rsdp = Some(b.clone_body());
            }
            core.emit(event);
            Ok(None)
        }
        rsip::Method::Invite | rsip::Method::Update => {
            // in-dialog renegotiation; answer with the current local SDP
            let body = MsgBody::from_parts(&req.headers, &req.body);
            let lsdp = core.lsdp.clone();
            let contacts = core.local_contacts();
            let ok = core.make_response(&req, 200, lsdp, Some(contacts), &[])?;
            tx.send_response(ok, false)?;
            let event = CcEvent::Update {
                info: core.event_info(rtime),
                body: body.clone(),
            };
            if let Some(b) = body {
                if core.has_on_remote_sdp_change() {
                    core.defer_remote_sdp(b, SipMessage::Request(req), event);
                    return Ok(None);
                }
                core.rsdp = Some(b.clone_body());
            }
            core.emit(event);
            Ok(None)
        }
        _ => {
            debug!("wrong request {} in the {} state", req.method, core.state);
            Ok(None)
        }
    }
}

pub(crate) fn recv_event(core: &mut UaCore, event: CcEvent) -> Result<Option<UaState>> {
    let eh = event.extra_headers().to_vec();
    match event.clone() {
        CcEvent::Disconnect { also, .. } => Ok(Some(teardown(core, event.rtime(), also, eh))),
        CcEvent::Fail { .. } | CcEvent::Redirect { .. } => {
            Ok(Some(teardown(core, event.rtime(), None, eh)))
        }
        CcEvent::Connect { body, .. } if core.pending_tr.is_some() => {
            // late media: this carries the answer for the ACK we owe
            if matches!(&body, Some(b) if b.needs_update() && core.has_on_local_sdp_change()) {
                core.defer_local_sdp(body.unwrap(), event);
                return Ok(None);
            }
            core.lsdp = body.clone();
            let ack = core.gen_request(rsip::Method::Ack, body, Some(core.invite_cseq), &eh);
            let pending = core.pending_tr.take();
            if let Some(tr) = pending {
                tr.send_ack(ack)?;
            }
            core.cancel_timer(TimerKind::AckWait);
            if core.connect_ts.is_none() {
                core.connect_ts = Some(event.rtime());
                core.start_credit_timer(event.rtime());
            }
            Ok(None)
        }
        CcEvent::Update { body, .. } => {
            if matches!(&body, Some(b) if b.needs_update() && core.has_on_local_sdp_change()) {
                core.defer_local_sdp(body.unwrap(), event);
                return Ok(None);
            }
            core.lsdp = body.clone();
            let reinvite = core.gen_request(rsip::Method::Invite, body, None, &eh);
            let consumer = core
                .self_handle()
                .map(|ua| Arc::new(ua) as Arc<dyn ResponseConsumer>);
            let tr = core.send_request(reinvite, consumer)?;
            core.client_tr = Some(tr);
            Ok(None)
        }
        _ => {
            debug!("wrong event {} in the {} state", event, core.state);
            Ok(None)
        }
    }
}

/// Responses to in-dialog requests we originated (re-INVITE).
pub(crate) fn recv_response(
    core: &mut UaCore,
    resp: Response,
    rtime: MonoTime,
    _tx: Arc<dyn ClientTransaction>,
) -> Result<Option<UaState>> {
    let code = status_code_value(&resp.status_code);
    if code < 200 {
        return Ok(None);
    }
    if (200..300).contains(&code) {
        let body = MsgBody::from_parts(&resp.headers, &resp.body);
        let event = CcEvent::Update {
            info: core.event_info(rtime),
            body: body.clone(),
        };
        if let Some(b) = body {
            if core.has_on_remote_sdp_change() {
                core.defer_remote_sdp(b, SipMessage::Response(resp), event);
                return Ok(None);
            }
            core.rsdp = Some(b.clone_body());
        }
        core.emit(event);
        return Ok(None);
    }
    debug!(
        "in-dialog request rejected with {} in the {} state",
        code, core.state
    );
    Ok(None)
}

/// Local teardown: send the BYE and move to Disconnected.
fn teardown(
    core: &mut UaCore,
    rtime: MonoTime,
    also: Option<rsip::typed::Contact>,
    mut eh: Vec<Header>,
) -> UaState {
    core.cancel_timer(TimerKind::Credit);
    core.cancel_timer(TimerKind::AckWait);
    if let Some(also) = also {
        eh.push(Header::Other("Also".to_string(), also.to_string()));
    }
    let bye = core.gen_request(rsip::Method::Bye, None, None, &eh);
    if let Err(e) = core.send_request(bye, None) {
        error!("{}: failed to send BYE: {}", core.state, e);
    }
    core.set_disconnect_ts(rtime);
    UaState::Disconnected { req: None }
}

/// The call ran out of credit.
pub(crate) fn credit_timeout(core: &mut UaCore) -> Result<Option<UaState>> {
    let now = MonoTime::now();
    let event = CcEvent::Disconnect {
        info: core.event_info(now),
        also: None,
        sip_reason: None,
    };
    core.emit(event);
    Ok(Some(teardown(core, now, None, Vec::new())))
}

/// A late-media 2xx never got its ACK.
pub(crate) fn ack_wait_timeout(core: &mut UaCore) -> Result<Option<UaState>> {
    let now = MonoTime::now();
    core.pending_tr = None;
    core.cancel_all_timers();
    core.last_scode = 408;
    let event = CcEvent::Fail {
        info: core.event_info(now),
        scode: 408,
        reason: reason_phrase(408).to_string(),
        challenge: None,
        sip_reason: None,
    };
    core.emit(event);
    core.set_disconnect_ts(now);
    Ok(Some(UaState::Failed { scode: 408 }))
}
