//! Facade onto the transaction manager sitting below the dialog core.
//!
//! The manager owns RFC 3261 retransmission, matching, and the timers
//! of its layer; the UA and the stateful proxy only talk to it through
//! these traits. Contract points the dialog core relies on:
//!
//! * The manager stamps each inbound message with a receive-time
//!   [`MonoTime`] and delivers it to the consumer; deliveries to one
//!   consumer are serialized (the consumer's own lock provides the
//!   per-dialog ordering).
//! * A 2xx final on an INVITE client transaction is ACKed by the
//!   manager itself, unless [`ClientTransaction::set_uack`] was called,
//!   in which case the UA supplies the ACK via
//!   [`ClientTransaction::send_ack`].
//! * On an incoming CANCEL the manager answers the CANCEL with 200 and
//!   the matched INVITE server transaction with 487, then routes the
//!   cancellation to the UA's `cancel` entry point.
//! * Manager calls never block; the UA may invoke them while holding
//!   its session lock.

use crate::monotime::MonoTime;
use crate::Result;
use rsip::{Header, Request, Response};
use std::sync::Arc;

/// Receives responses for a client transaction started with
/// [`SipTransactionManager::begin_client_transaction`].
pub trait ResponseConsumer: Send + Sync {
    fn recv_response(&self, resp: Response, rtime: MonoTime, tx: Arc<dyn ClientTransaction>);
}

pub trait SipTransactionManager: Send + Sync {
    /// Begin a client transaction for `req`.
    ///
    /// `destination` overrides the next-hop derived from the request
    /// URI (loose routing, proxy forwarding). With no `consumer`,
    /// responses are consumed by the manager and dropped.
    fn begin_client_transaction(
        &self,
        req: Request,
        destination: Option<rsip::HostWithPort>,
        consumer: Option<Arc<dyn ResponseConsumer>>,
    ) -> Result<Arc<dyn ClientTransaction>>;

    /// Forward a response downstream outside of any local server
    /// transaction (the stateful proxy's return path).
    fn send_response(&self, resp: Response) -> Result<()>;
}

/// Handle to a pending client transaction.
pub trait ClientTransaction: Send + Sync {
    /// CANCEL the pending INVITE. `extra_headers` are copied onto the
    /// CANCEL request.
    fn cancel(&self, extra_headers: Vec<Header>);

    /// Defer the automatic ACK on a 2xx final to the UA (late media).
    fn set_uack(&self, uack: bool);

    /// Send a UA-built ACK on this transaction's dialog leg.
    fn send_ack(&self, ack: Request) -> Result<()>;
}

/// Handle to a server transaction an incoming request arrived on.
pub trait ServerTransaction: Send + Sync {
    /// Send a response upstream. `ack_wait` asks the manager to keep
    /// the transaction alive until the ACK for a 2xx arrives and to
    /// hand that ACK to the UA.
    fn send_response(&self, resp: Response, ack_wait: bool) -> Result<()>;
}
