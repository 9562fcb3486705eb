//! SIP User Agent dialog layer.
//!
//! This crate implements the half of a SIP stack that sits above the
//! transport/transaction layer: dialog setup, in-dialog signalling, and
//! teardown for interactive sessions. The centre piece is a pair of
//! symmetric UA state machines (UAC and UAS) translating between SIP
//! requests/responses arriving from a transaction manager and typed
//! call-control events exchanged with an application call controller,
//! with the timer ensemble (no-reply, no-progress, expire, credit,
//! ACK-wait, settle) driving the transitions the wire does not.
//!
//! Message parsing and serialization are the `rsip` crate's business,
//! SDP bodies are parsed through `sdp-rs`, and the transaction manager
//! is consumed through the traits in [`transaction`]; this crate never
//! touches the network itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use rsipua::ua::{InviteOption, Ua, UaCallbacks, UaConfig};
//! use rsipua::body::MsgBody;
//!
//! # fn example(tm: std::sync::Arc<dyn rsipua::transaction::SipTransactionManager>) -> rsipua::Result<()> {
//! let contact = rsip::Uri::try_from("sip:alice@192.0.2.10:5060")?;
//! let config = UaConfig::new("192.0.2.10:5060", contact);
//! let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let ua = Ua::new_uac(
//!     config,
//!     UaCallbacks::default(),
//!     tm,
//!     event_tx,
//!     InviteOption {
//!         caller: rsip::Uri::try_from("sip:alice@example.com")?,
//!         callee: rsip::Uri::try_from("sip:bob@example.com")?,
//!         call_id: None,
//!         body: Some(MsgBody::new_sdp("v=0\r\n...")),
//!         headers: None,
//!     },
//! );
//! ua.activate(); // sends the INVITE
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod error;
pub mod event;
pub mod logging;
pub mod monotime;
pub mod proxy;
pub mod rsip_ext;
pub mod sdp;
pub mod timer;
pub mod transaction;
pub mod ua;

pub use error::{Error, Result};
