//! The UA state set and dispatch plumbing.
//!
//! Exactly one state is current per UA. Handlers return
//! `Ok(Some(next))` to transition; the UA applies the transition
//! atomically and runs the new state's activation exactly once before
//! any further event is consumed. `Ok(None)` keeps the current state;
//! `Err` is logged with the originating state and swallowed (the event
//! is dropped, nothing transitions).

use super::{connected, terminal, uac, uas, TimerKind, UaCore};
use crate::event::CcEvent;
use crate::monotime::MonoTime;
use crate::transaction::{ClientTransaction, ServerTransaction};
use crate::Result;
use rsip::{Request, Response};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum UaState {
    UacIdle,
    UacTrying,
    UacRinging {
        rtime: MonoTime,
        origin: String,
        scode: u16,
    },
    UacCancelling,
    UasIdle,
    UasTrying,
    UasRinging {
        rtime: MonoTime,
        origin: String,
        scode: u16,
    },
    Connected,
    Failed {
        scode: u16,
    },
    Disconnected {
        /// The request that tore the dialog down, when there was one;
        /// handed to the disconnect callback on settle.
        req: Option<Box<Request>>,
    },
    Dead,
}

impl UaState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UaState::Failed { .. } | UaState::Disconnected { .. } | UaState::Dead
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, UaState::Connected)
    }
}

impl fmt::Display for UaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UaState::UacIdle => "Idle(UAC)",
            UaState::UacTrying => "Trying(UAC)",
            UaState::UacRinging { .. } => "Ringing(UAC)",
            UaState::UacCancelling => "Cancelling(UAC)",
            UaState::UasIdle => "Idle(UAS)",
            UaState::UasTrying => "Trying(UAS)",
            UaState::UasRinging { .. } => "Ringing(UAS)",
            UaState::Connected => "Connected",
            UaState::Failed { .. } => "Failed",
            UaState::Disconnected { .. } => "Disconnected",
            UaState::Dead => "Dead",
        };
        f.write_str(name)
    }
}

pub(crate) fn on_activation(core: &mut UaCore) -> Result<Option<UaState>> {
    match core.state.clone() {
        UaState::UacIdle => uac::idle_on_activation(core),
        UaState::UacRinging {
            rtime,
            origin,
            scode,
        } => {
            core.run_ring_cb(rtime, &origin, scode);
            Ok(None)
        }
        UaState::UasIdle => uas::idle_on_activation(core),
        UaState::UasRinging {
            rtime,
            origin,
            scode,
        } => {
            core.run_ring_cb(rtime, &origin, scode);
            Ok(None)
        }
        UaState::Failed { .. } | UaState::Disconnected { .. } => terminal::on_activation(core),
        UaState::Dead => terminal::dead_on_activation(core),
        _ => Ok(None),
    }
}

pub(crate) fn recv_request(
    core: &mut UaCore,
    req: Request,
    rtime: MonoTime,
    tx: Arc<dyn ServerTransaction>,
) -> Result<Option<UaState>> {
    match core.state.clone() {
        UaState::UasRinging { .. } => uas::ringing_recv_request(core, req, rtime, tx),
        UaState::Connected => connected::recv_request(core, req, rtime, tx),
        UaState::Disconnected { .. } => terminal::disconnected_recv_request(core, req, rtime, tx),
        state => {
            debug!("wrong request {} in the {} state", req.method, state);
            Ok(None)
        }
    }
}

pub(crate) fn recv_response(
    core: &mut UaCore,
    resp: Response,
    rtime: MonoTime,
    tx: Arc<dyn ClientTransaction>,
) -> Result<Option<UaState>> {
    match core.state.clone() {
        UaState::UacTrying => uac::trying_recv_response(core, resp, rtime, tx),
        UaState::UacRinging { .. } => uac::ringing_recv_response(core, resp, rtime, tx),
        UaState::UacCancelling => uac::cancelling_recv_response(core, resp, rtime, tx),
        UaState::Connected => connected::recv_response(core, resp, rtime, tx),
        state => {
            debug!(
                "unexpected response {} in the {} state",
                crate::rsip_ext::status_code_value(&resp.status_code),
                state
            );
            Ok(None)
        }
    }
}

pub(crate) fn recv_event(core: &mut UaCore, event: CcEvent) -> Result<Option<UaState>> {
    match core.state.clone() {
        UaState::UacTrying | UaState::UacRinging { .. } => uac::provisional_recv_event(core, event),
        UaState::UasTrying => uas::trying_recv_event(core, event),
        UaState::UasRinging { .. } => uas::ringing_recv_event(core, event),
        UaState::Connected => connected::recv_event(core, event),
        state => {
            // a stricter implementation might warn here
            debug!("wrong event {} in the {} state", event, state);
            Ok(None)
        }
    }
}

pub(crate) fn timer_expired(core: &mut UaCore, kind: TimerKind) -> Result<Option<UaState>> {
    match (core.state.clone(), kind) {
        (UaState::UacTrying, TimerKind::NoReply)
        | (UaState::UacTrying, TimerKind::NoProgress) => uac::reply_timeout(core),
        (UaState::UacTrying, TimerKind::Expire)
        | (UaState::UacRinging { .. }, TimerKind::Expire) => uac::expire_timeout(core),
        (UaState::UasTrying, TimerKind::Expire)
        | (UaState::UasTrying, TimerKind::NoProgress)
        | (UaState::UasRinging { .. }, TimerKind::Expire) => uas::expire_timeout(core),
        (UaState::Connected, TimerKind::Credit) => connected::credit_timeout(core),
        (UaState::Connected, TimerKind::AckWait) => connected::ack_wait_timeout(core),
        (UaState::Failed { .. }, TimerKind::Dead) => terminal::settle(core, None),
        (UaState::Disconnected { req }, TimerKind::Dead) => terminal::settle(core, req),
        (state, kind) => {
            debug!("stale {:?} timer in the {} state", kind, state);
            Ok(None)
        }
    }
}
