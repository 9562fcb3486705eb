//! Stateful proxy: a minimal request forwarder sharing the transaction
//! manager with the UAs. No dialog state, no timers.

use crate::monotime::MonoTime;
use crate::rsip_ext::{insert_first_via, make_branch, make_via, remove_first_via};
use crate::transaction::{ClientTransaction, ResponseConsumer, SipTransactionManager};
use crate::Result;
use rsip::{Request, Response};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct StatefulProxy {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    tm: Arc<dyn SipTransactionManager>,
    destination: rsip::HostWithPort,
    via_host: String,
}

impl StatefulProxy {
    pub fn new(
        tm: Arc<dyn SipTransactionManager>,
        destination: rsip::HostWithPort,
        via_host: impl Into<String>,
    ) -> StatefulProxy {
        StatefulProxy {
            inner: Arc::new(ProxyInner {
                tm,
                destination,
                via_host: via_host.into(),
            }),
        }
    }

    /// Forward a request to the configured destination: prepend our Via
    /// with a fresh branch and open a client transaction. Response
    /// matching is the transaction manager's business.
    pub fn recv_request(&self, mut req: Request) -> Result<()> {
        let via = make_via(&self.inner.via_host, &make_branch());
        insert_first_via(&mut req, via);
        let consumer: Arc<dyn ResponseConsumer> = Arc::new(self.clone());
        self.inner.tm.begin_client_transaction(
            req,
            Some(self.inner.destination.clone()),
            Some(consumer),
        )?;
        Ok(())
    }
}

impl ResponseConsumer for StatefulProxy {
    /// Strip our Via off the response and pass it back downstream.
    fn recv_response(&self, mut resp: Response, _rtime: MonoTime, _tx: Arc<dyn ClientTransaction>) {
        remove_first_via(&mut resp);
        if let Err(e) = self.inner.tm.send_response(resp) {
            error!("proxy: failed to forward response: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::ServerTransaction;
    use rsip::headers::*;
    use rsip::prelude::UntypedHeader;
    use rsip::Header;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTm {
        forwarded: Mutex<Vec<(Request, Option<rsip::HostWithPort>)>>,
        responses: Mutex<Vec<Response>>,
    }

    struct NoopTx;

    impl ClientTransaction for NoopTx {
        fn cancel(&self, _extra_headers: Vec<Header>) {}
        fn set_uack(&self, _uack: bool) {}
        fn send_ack(&self, _ack: Request) -> Result<()> {
            Ok(())
        }
    }

    impl ServerTransaction for NoopTx {
        fn send_response(&self, _resp: Response, _ack_wait: bool) -> Result<()> {
            Ok(())
        }
    }

    impl SipTransactionManager for MockTm {
        fn begin_client_transaction(
            &self,
            req: Request,
            destination: Option<rsip::HostWithPort>,
            _consumer: Option<Arc<dyn ResponseConsumer>>,
        ) -> Result<Arc<dyn ClientTransaction>> {
            self.forwarded.lock().unwrap().push((req, destination));
            Ok(Arc::new(NoopTx))
        }

        fn send_response(&self, resp: Response) -> Result<()> {
            self.responses.lock().unwrap().push(resp);
            Ok(())
        }
    }

    fn invite() -> Request {
        Request {
            method: rsip::Method::Invite,
            uri: rsip::Uri::try_from("sip:bob@example.com").unwrap(),
            headers: vec![
                Via::new("SIP/2.0/UDP a.example.com:5060;branch=z9hG4bKaaa").into(),
                CSeq::new("1 INVITE").into(),
                From::new("<sip:alice@example.com>;tag=atag").into(),
                To::new("<sip:bob@example.com>").into(),
                CallId::new("px-1").into(),
            ]
            .into(),
            version: rsip::Version::V2,
            body: vec![],
        }
    }

    fn destination() -> rsip::HostWithPort {
        rsip::Uri::try_from("sip:next.example.com:5070")
            .unwrap()
            .host_with_port
    }

    #[test]
    fn forwards_with_fresh_via() {
        let tm = Arc::new(MockTm::default());
        let proxy = StatefulProxy::new(tm.clone(), destination(), "proxy.example.com:5060");
        proxy.recv_request(invite()).unwrap();

        let forwarded = tm.forwarded.lock().unwrap();
        let (req, dest) = &forwarded[0];
        assert_eq!(dest.as_ref(), Some(&destination()));
        let vias: Vec<_> = req
            .headers
            .iter()
            .filter_map(|h| match h {
                Header::Via(v) => Some(v.value().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(vias.len(), 2);
        assert!(vias[0].contains("proxy.example.com:5060"));
        assert!(vias[0].contains("z9hG4bK"));
        assert!(vias[1].contains("z9hG4bKaaa"));
    }

    #[test]
    fn strips_top_via_on_response() {
        let tm = Arc::new(MockTm::default());
        let proxy = StatefulProxy::new(tm.clone(), destination(), "proxy.example.com:5060");
        let resp = Response {
            status_code: rsip::StatusCode::OK,
            version: rsip::Version::V2,
            headers: vec![
                Via::new("SIP/2.0/UDP proxy.example.com:5060;branch=z9hG4bKbbb").into(),
                Via::new("SIP/2.0/UDP a.example.com:5060;branch=z9hG4bKaaa").into(),
            ]
            .into(),
            body: vec![],
        };
        proxy.recv_response(resp, MonoTime::now(), Arc::new(NoopTx));

        let sent = tm.responses.lock().unwrap();
        let vias: Vec<_> = sent[0]
            .headers
            .iter()
            .filter_map(|h| match h {
                Header::Via(v) => Some(v.value().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(vias, vec!["SIP/2.0/UDP a.example.com:5060;branch=z9hG4bKaaa"]);
    }
}
