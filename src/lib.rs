//! Multicast DNS service discovery client engine.
//!
//! A [`Daemon`] owns every outstanding query and is driven through a single
//! serialized queue. Callers register with [`Daemon::browse`] or
//! [`Daemon::query`] and get answers through callbacks until they cancel.

pub mod api;
pub mod cancel;
pub mod command;
pub mod daemon;
pub mod dns;
pub mod error;
pub mod matcher;
pub mod name;
pub mod socket;
pub mod timing;
pub mod transport;

pub use api::DEFAULT_DOMAIN;
pub use cancel::CancelHandle;
pub use command::{ErrCallback, QueryAnswered, Responder, ResponderTarget};
pub use daemon::{Daemon, DaemonState};
pub use error::{Error, Result, TransportError};
pub use name::{join_service_name, split_service_name, unescape_to_utf8, ServiceInstanceName};
pub use socket::MdnsSocket;
pub use transport::{DaemonConfig, Flags, QueryMode, Question, Transport};
