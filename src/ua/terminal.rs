//! Terminal states: Failed, Disconnected, and the absorbing Dead.

use super::state::UaState;
use super::UaCore;
use crate::monotime::MonoTime;
use crate::transaction::ServerTransaction;
use crate::Result;
use rsip::Request;
use std::sync::Arc;
use tracing::debug;

/// Entering Failed or Disconnected: stop the live timers and start the
/// settle delay towards Dead.
pub(crate) fn on_activation(core: &mut UaCore) -> Result<Option<UaState>> {
    core.cancel_all_timers();
    core.start_dead_timer();
    Ok(None)
}

/// The settle delay ran out: run the disconnect callback and go Dead.
pub(crate) fn settle(core: &mut UaCore, req: Option<Box<Request>>) -> Result<Option<UaState>> {
    core.run_disconnect_cb(req.as_deref());
    Ok(Some(UaState::Dead))
}

/// Dead is absorbing: release everything that could keep the dialog,
/// the controller, or the transaction manager alive.
pub(crate) fn dead_on_activation(core: &mut UaCore) -> Result<Option<UaState>> {
    core.cancel_all_timers();
    core.cbs = Default::default();
    core.client_tr = None;
    core.pending_tr = None;
    core.server_tr = None;
    core.uas_request = None;
    Ok(None)
}

/// Retransmitted BYEs after teardown still deserve their 200.
pub(crate) fn disconnected_recv_request(
    core: &mut UaCore,
    req: Request,
    _rtime: MonoTime,
    tx: Arc<dyn ServerTransaction>,
) -> Result<Option<UaState>> {
    if req.method != rsip::Method::Bye {
        debug!("wrong request {} in the {} state", req.method, core.state);
        return Ok(None);
    }
    let ok = core.make_response(&req, 200, None, None, &[])?;
    tx.send_response(ok, false)?;
    Ok(None)
}
