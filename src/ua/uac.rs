//! UAC side: Idle, Trying, Ringing, and Cancelling handlers.

use super::state::UaState;
use super::{TimerKind, UaCore};
use crate::body::MsgBody;
use crate::event::CcEvent;
use crate::monotime::MonoTime;
use crate::rsip_ext::{
    challenge_header, extension_header_value, reason_phrase, response_contacts, status_code_value,
    to_tag,
};
use crate::transaction::{ClientTransaction, ResponseConsumer};
use crate::Result;
use rsip::{Response, SipMessage};
use std::sync::Arc;
use tracing::{debug, error};

/// Freshly created caller: ship the INVITE and wait in Trying. When
/// the offer still needs its endpoints rewritten, activation defers to
/// the controller and runs again once the rewrite lands.
pub(crate) fn idle_on_activation(core: &mut UaCore) -> Result<Option<UaState>> {
    if let Some(body) = core.lsdp.clone() {
        if body.needs_update() && core.has_on_local_sdp_change() {
            let event = CcEvent::Try {
                info: core.event_info(MonoTime::now()),
                scode: 0,
                call_id: core.call_id.clone(),
                caller: core.local_addr.clone(),
                callee: core.remote_addr.clone(),
                body: Some(body.clone()),
            };
            core.defer_local_sdp_activation(body, event);
            return Ok(None);
        }
    }
    let body = core.lsdp.clone();
    let extra = core.invite_headers.clone();
    let invite = core.gen_request(rsip::Method::Invite, body, None, &extra);
    core.invite_cseq = core.local_cseq;
    let consumer = core
        .self_handle()
        .map(|ua| Arc::new(ua) as Arc<dyn ResponseConsumer>);
    let tx = core.send_request(invite, consumer)?;
    core.client_tr = Some(tx);
    core.start_no_reply_timer();
    Ok(Some(UaState::UacTrying))
}

pub(crate) fn trying_recv_response(
    core: &mut UaCore,
    resp: Response,
    rtime: MonoTime,
    tx: Arc<dyn ClientTransaction>,
) -> Result<Option<UaState>> {
    let code = status_code_value(&resp.status_code);
    core.last_scode = code;

    if core.timer_armed(TimerKind::NoReply) {
        core.cancel_timer(TimerKind::NoReply);
        if code == 100 && core.config.np_time.is_some() {
            core.start_no_progress_timer();
        } else if code < 200 && core.config.ex_time.is_some() {
            core.start_expire_timer();
        }
    }
    let body = MsgBody::from_parts(&resp.headers, &resp.body);
    if code == 100 {
        core.p100_ts = Some(rtime);
        let event = CcEvent::Ring {
            info: core.event_info(rtime),
            scode: code,
            reason: reason_phrase(code).to_string(),
            body,
        };
        core.emit(event);
        return Ok(None);
    }
    if core.timer_armed(TimerKind::NoProgress) {
        core.cancel_timer(TimerKind::NoProgress);
        if code < 200 && core.config.ex_time.is_some() {
            core.start_expire_timer();
        }
    }
    if code < 200 {
        let event = CcEvent::Ring {
            info: core.event_info(rtime),
            scode: code,
            reason: reason_phrase(code).to_string(),
            body: body.clone(),
        };
        let next = UaState::UacRinging {
            rtime,
            origin: core.config.origin.clone(),
            scode: code,
        };
        if let Some(b) = body {
            if core.has_on_remote_sdp_change() {
                core.defer_remote_sdp(b, SipMessage::Response(resp), event);
                core.p1xx_ts = Some(rtime);
                return Ok(Some(next));
            }
            core.rsdp = Some(b.clone_body());
        } else {
            core.rsdp = None;
        }
        core.emit(event);
        core.p1xx_ts = Some(rtime);
        return Ok(Some(next));
    }
    final_response(core, resp, rtime, tx, code, body)
}

pub(crate) fn ringing_recv_response(
    core: &mut UaCore,
    resp: Response,
    rtime: MonoTime,
    tx: Arc<dyn ClientTransaction>,
) -> Result<Option<UaState>> {
    let code = status_code_value(&resp.status_code);
    if code == 100 {
        return Ok(None);
    }
    core.last_scode = code;
    let body = MsgBody::from_parts(&resp.headers, &resp.body);
    if code < 200 {
        // further provisional: surface it, stay put
        let event = CcEvent::Ring {
            info: core.event_info(rtime),
            scode: code,
            reason: reason_phrase(code).to_string(),
            body: body.clone(),
        };
        if let Some(b) = body {
            if core.has_on_remote_sdp_change() {
                core.defer_remote_sdp(b, SipMessage::Response(resp), event);
            } else {
                core.rsdp = Some(b.clone_body());
                core.emit(event);
            }
        } else {
            core.rsdp = None;
            core.emit(event);
        }
        if core.p1xx_ts.is_none() {
            core.p1xx_ts = Some(rtime);
        }
        core.run_ring_cb(rtime, &core.config.origin.clone(), code);
        return Ok(None);
    }
    final_response(core, resp, rtime, tx, code, body)
}

/// Final-response handling shared by Trying and Ringing.
fn final_response(
    core: &mut UaCore,
    resp: Response,
    rtime: MonoTime,
    tx: Arc<dyn ClientTransaction>,
    code: u16,
    body: Option<MsgBody>,
) -> Result<Option<UaState>> {
    core.cancel_timer(TimerKind::Expire);
    if (200..300).contains(&code) {
        core.update_routing(&resp);
        let tag = match to_tag(&resp)? {
            Some(tag) => tag,
            None => {
                // tag-less 2xx: the dialog cannot be addressed, repair
                // with a BYE and give up
                let event = CcEvent::Fail {
                    info: core.event_info(rtime),
                    scode: 502,
                    reason: "Bad Gateway".to_string(),
                    challenge: None,
                    sip_reason: None,
                };
                core.emit(event);
                let bye = core.gen_request(rsip::Method::Bye, None, None, &[]);
                if let Err(e) = core.send_request(bye, None) {
                    error!("{}: failed to send BYE: {}", core.state, e);
                }
                core.set_disconnect_ts(rtime);
                return Ok(Some(UaState::Failed { scode: code }));
            }
        };
        core.set_remote_tag(&tag);
        let reason = reason_phrase(code).to_string();
        let event;
        let next = UaState::Connected;
        if core.late_media && body.is_none() {
            // late media: no answer yet, it travels with the ACK we owe
            event = CcEvent::PreConnect {
                info: core.event_info(rtime),
                scode: code,
                reason,
                body: None,
            };
            tx.set_uack(true);
            core.pending_tr = Some(tx.clone());
            core.start_ack_wait_timer();
        } else {
            core.late_media = false;
            event = CcEvent::Connect {
                info: core.event_info(rtime),
                scode: code,
                reason,
                body: body.clone(),
            };
            core.start_credit_timer(rtime);
            core.connect_ts = Some(rtime);
        }
        if let Some(b) = body {
            if core.has_on_remote_sdp_change() {
                core.defer_remote_sdp(b, SipMessage::Response(resp), event);
                core.connect_ts = Some(rtime);
                return Ok(Some(next));
            }
            core.rsdp = Some(b.clone_body());
        } else {
            core.rsdp = None;
        }
        core.emit(event);
        return Ok(Some(next));
    }
    let contacts = response_contacts(&resp)?;
    let reason = reason_phrase(code).to_string();
    let event = if (code == 301 || code == 302) && !contacts.is_empty() {
        CcEvent::Redirect {
            info: core.event_info(rtime),
            scode: code,
            reason,
            body,
            contacts: vec![contacts[0].clone()],
        }
    } else if code == 300 && !contacts.is_empty() {
        CcEvent::Redirect {
            info: core.event_info(rtime),
            scode: code,
            reason,
            body,
            contacts,
        }
    } else {
        let challenge = if core.config.pass_auth {
            challenge_header(&resp, code)
        } else {
            None
        };
        CcEvent::Fail {
            info: core.event_info(rtime),
            scode: code,
            reason,
            challenge,
            sip_reason: extension_header_value(&resp.headers, "Reason"),
        }
    };
    core.emit(event);
    core.set_disconnect_ts(rtime);
    Ok(Some(UaState::Failed { scode: code }))
}

/// Fail/Redirect/Disconnect from the controller while the INVITE is
/// still pending: CANCEL it and collect the final in Cancelling.
pub(crate) fn provisional_recv_event(
    core: &mut UaCore,
    event: CcEvent,
) -> Result<Option<UaState>> {
    match &event {
        CcEvent::Fail { .. } | CcEvent::Redirect { .. } | CcEvent::Disconnect { .. } => {
            if let Some(tr) = core.client_tr.clone() {
                tr.cancel(event.extra_headers().to_vec());
            }
            core.cancel_timer(TimerKind::Expire);
            core.cancel_timer(TimerKind::NoProgress);
            core.cancel_timer(TimerKind::NoReply);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::UacCancelling))
        }
        _ => {
            debug!("wrong event {} in the {} state", event, core.state);
            Ok(None)
        }
    }
}

pub(crate) fn cancelling_recv_response(
    core: &mut UaCore,
    resp: Response,
    rtime: MonoTime,
    _tx: Arc<dyn ClientTransaction>,
) -> Result<Option<UaState>> {
    let code = status_code_value(&resp.status_code);
    if code < 200 {
        return Ok(None);
    }
    core.last_scode = code;
    if (200..300).contains(&code) {
        // the CANCEL lost the race and the call connected remotely;
        // take the established dialog down with a BYE
        core.update_routing(&resp);
        if let Ok(Some(tag)) = to_tag(&resp) {
            core.set_remote_tag(&tag);
        }
        let bye = core.gen_request(rsip::Method::Bye, None, None, &[]);
        if let Err(e) = core.send_request(bye, None) {
            error!("{}: failed to send BYE: {}", core.state, e);
        }
        core.set_disconnect_ts(rtime);
        return Ok(Some(UaState::Disconnected { req: None }));
    }
    Ok(Some(UaState::Failed { scode: code }))
}

/// NoReply or NoProgress ran out while waiting for the first response.
pub(crate) fn reply_timeout(core: &mut UaCore) -> Result<Option<UaState>> {
    let now = MonoTime::now();
    if let Some(tr) = core.client_tr.clone() {
        tr.cancel(Vec::new());
    }
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

/// The ringing phase outlived its expiry window: CANCEL and collect
/// the final in Cancelling.
pub(crate) fn expire_timeout(core: &mut UaCore) -> Result<Option<UaState>> {
    let now = MonoTime::now();
    if let Some(tr) = core.client_tr.clone() {
        tr.cancel(Vec::new());
    }
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
    Ok(Some(UaState::UacCancelling))
}
