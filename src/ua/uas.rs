//! UAS side: Idle, Trying, and Ringing handlers.

use super::state::UaState;
use super::{TimerKind, UaCore};
use crate::body::MsgBody;
use crate::event::CcEvent;
use crate::monotime::MonoTime;
use crate::rsip_ext::{extension_header_value, reason_phrase};
use crate::transaction::ServerTransaction;
use rsip::headers::UntypedHeader;
use crate::{Error, Result};
use rsip::prelude::{HeadersExt, ToTypedHeader};
use rsip::{Request, SipMessage};
use std::sync::Arc;
use tracing::debug;

/// A dialog-forming INVITE arrived: answer 100, surface CCEventTry,
/// and wait for the controller in Trying.
pub(crate) fn idle_on_activation(core: &mut UaCore) -> Result<Option<UaState>> {
    let req = core
        .uas_request
        .clone()
        .ok_or_else(|| Error::Internal("UAS activation without an INVITE".to_string()))?;
    core.send_uas_response(100, None, None, false, &[])?;
    if core.config.np_time.is_some() {
        core.start_no_progress_timer();
    } else if core.config.ex_time.is_some() {
        core.start_expire_timer();
    }
    let rtime = core.setup_ts.unwrap_or_else(MonoTime::now);
    let caller = req.from_header()?.clone().typed()?;
    let callee = req.to_header()?.clone().typed()?;
    let body = MsgBody::from_parts(&req.headers, &req.body);
    let event = CcEvent::Try {
        info: core.event_info(rtime),
        scode: 100,
        call_id: core.call_id.clone(),
        caller,
        callee,
        body: body.clone(),
    };
    if let Some(b) = body {
        if core.has_on_remote_sdp_change() {
            core.defer_remote_sdp(b, SipMessage::Request(req), event);
            return Ok(Some(UaState::UasTrying));
        }
        core.rsdp = Some(b.clone_body());
    }
    core.emit(event);
    Ok(Some(UaState::UasTrying))
}

pub(crate) fn trying_recv_event(core: &mut UaCore, event: CcEvent) -> Result<Option<UaState>> {
    let eh = event.extra_headers().to_vec();
    match event.clone() {
        CcEvent::Ring {
            scode, mut body, ..
        } => {
            let code;
            if scode == 0 {
                code = 180;
                body = None;
            } else {
                if scode == 100 {
                    return Ok(None);
                }
                code = scode;
                if needs_local_rewrite(core, &body) {
                    core.defer_local_sdp(body.unwrap(), event);
                    return Ok(None);
                }
            }
            core.lsdp = body.clone();
            core.send_uas_response(code, body, None, false, &eh)?;
            if core.timer_armed(TimerKind::NoProgress) {
                core.cancel_timer(TimerKind::NoProgress);
                if core.config.ex_time.is_some() {
                    core.start_expire_timer();
                }
            }
            if core.p1xx_ts.is_none() {
                core.p1xx_ts = Some(event.rtime());
            }
            Ok(Some(UaState::UasRinging {
                rtime: event.rtime(),
                origin: event.origin().to_string(),
                scode: code,
            }))
        }
        CcEvent::PreConnect { scode, body, .. } => pre_connect(core, event, scode, body, eh),
        CcEvent::Connect { scode, body, .. } => connect(core, event, scode, body, eh),
        CcEvent::Redirect {
            scode,
            body,
            contacts,
            ..
        } => {
            core.send_uas_response(scode, body, Some(contacts), false, &eh)?;
            core.cancel_timer(TimerKind::Expire);
            core.cancel_timer(TimerKind::NoProgress);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::Failed { scode }))
        }
        CcEvent::Fail { scode, .. } => {
            let code = if scode == 0 { 500 } else { scode };
            core.send_uas_response(code, None, None, false, &eh)?;
            core.cancel_timer(TimerKind::Expire);
            core.cancel_timer(TimerKind::NoProgress);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::Failed { scode: code }))
        }
        CcEvent::Disconnect { .. } => {
            core.send_uas_response(500, None, None, false, &eh)?;
            core.cancel_timer(TimerKind::Expire);
            core.cancel_timer(TimerKind::NoProgress);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::Disconnected { req: None }))
        }
        _ => {
            debug!("wrong event {} in the {} state", event, core.state);
            Ok(None)
        }
    }
}

pub(crate) fn ringing_recv_event(core: &mut UaCore, event: CcEvent) -> Result<Option<UaState>> {
    let eh = event.extra_headers().to_vec();
    match event.clone() {
        CcEvent::Ring {
            scode, mut body, ..
        } => {
            let code;
            if scode == 0 {
                code = 180;
                body = None;
            } else {
                if scode == 100 {
                    return Ok(None);
                }
                code = scode;
                if needs_local_rewrite(core, &body) {
                    core.defer_local_sdp(body.unwrap(), event);
                    return Ok(None);
                }
            }
            core.lsdp = body.clone();
            if core.p1xx_ts.is_none() {
                core.p1xx_ts = Some(event.rtime());
            }
            core.send_uas_response(code, body, None, false, &eh)?;
            core.run_ring_cb(event.rtime(), event.origin(), code);
            Ok(None)
        }
        CcEvent::Connect { scode, body, .. } => connect(core, event, scode, body, eh),
        CcEvent::PreConnect { scode, body, .. } => pre_connect(core, event, scode, body, eh),
        CcEvent::Redirect {
            scode,
            body,
            contacts,
            ..
        } => {
            core.send_uas_response(scode, body, Some(contacts), false, &eh)?;
            core.cancel_timer(TimerKind::Expire);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::Failed { scode }))
        }
        CcEvent::Fail { scode, .. } => {
            let code = if scode == 0 { 500 } else { scode };
            core.send_uas_response(code, None, None, false, &eh)?;
            core.cancel_timer(TimerKind::Expire);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::Failed { scode: code }))
        }
        CcEvent::Disconnect { .. } => {
            core.send_uas_response(500, None, None, false, &eh)?;
            core.cancel_timer(TimerKind::Expire);
            core.set_disconnect_ts(event.rtime());
            Ok(Some(UaState::Disconnected { req: None }))
        }
        _ => {
            debug!("wrong event {} in the {} state", event, core.state);
            Ok(None)
        }
    }
}

/// Send the 2xx answer and move to Connected.
fn connect(
    core: &mut UaCore,
    event: CcEvent,
    scode: u16,
    body: Option<MsgBody>,
    eh: Vec<rsip::Header>,
) -> Result<Option<UaState>> {
    if needs_local_rewrite(core, &body) {
        core.defer_local_sdp(body.unwrap(), event);
        return Ok(None);
    }
    let code = if scode == 0 { 200 } else { scode };
    core.lsdp = body.clone();
    let contacts = core.local_contacts();
    core.send_uas_response(code, body, Some(contacts), false, &eh)?;
    core.cancel_timer(TimerKind::Expire);
    core.cancel_timer(TimerKind::NoProgress);
    core.start_credit_timer(event.rtime());
    core.connect_ts = Some(event.rtime());
    Ok(Some(UaState::Connected))
}

/// Late media: send the 2xx without waiting for the answer and keep
/// the transaction open until the ACK brings it.
fn pre_connect(
    core: &mut UaCore,
    event: CcEvent,
    scode: u16,
    body: Option<MsgBody>,
    eh: Vec<rsip::Header>,
) -> Result<Option<UaState>> {
    if needs_local_rewrite(core, &body) {
        core.defer_local_sdp(body.unwrap(), event);
        return Ok(None);
    }
    let code = if scode == 0 { 200 } else { scode };
    core.lsdp = body.clone();
    core.cancel_timer(TimerKind::NoProgress);
    let contacts = core.local_contacts();
    core.send_uas_response(code, body, Some(contacts), true, &eh)?;
    core.start_ack_wait_timer();
    Ok(Some(UaState::Connected))
}

fn needs_local_rewrite(core: &UaCore, body: &Option<MsgBody>) -> bool {
    matches!(body, Some(b) if b.needs_update() && core.has_on_local_sdp_change())
}

/// BYE while still ringing: 487 the INVITE, 200 the BYE, and let the
/// controller know the call is gone.
pub(crate) fn ringing_recv_request(
    core: &mut UaCore,
    req: Request,
    rtime: MonoTime,
    tx: Arc<dyn ServerTransaction>,
) -> Result<Option<UaState>> {
    if req.method != rsip::Method::Bye {
        debug!("wrong request {} in the {} state", req.method, core.state);
        return Ok(None);
    }
    core.send_uas_response(487, None, None, false, &[])?;
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
    core.cancel_timer(TimerKind::Expire);
    core.set_disconnect_ts(rtime);
    Ok(Some(UaState::Disconnected {
        req: Some(Box::new(req)),
    }))
}

/// The provisional phase outlived its expiry window: 408 the INVITE.
pub(crate) fn expire_timeout(core: &mut UaCore) -> Result<Option<UaState>> {
    let now = MonoTime::now();
    core.cancel_all_timers();
    core.last_scode = 408;
    core.send_uas_response(408, None, None, false, &[])?;
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
