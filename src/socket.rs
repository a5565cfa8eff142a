use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::rr::Record;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::daemon::Daemon;
use crate::dns::{build_query, parse_response};
use crate::error::TransportError;
use crate::transport::{QueryMode, Question, Transport};

/// mDNS IPv4 multicast group
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_PORT: u16 = 5353;

/// Largest mDNS packet we accept (RFC 6762 section 17)
const MAX_PACKET: usize = 9000;

const RECV_RETRY_BASE: Duration = Duration::from_millis(50);
const RECV_RETRY_MAX: Duration = Duration::from_secs(5);
/// Consecutive receive failures after which the socket is treated as gone
const MAX_RECV_FAILURES: u32 = 10;

/// Delay before retrying after `failures` consecutive receive errors, or
/// `None` once the socket should be given up.
fn recv_retry_delay(failures: u32) -> Option<Duration> {
	if failures == 0 || failures >= MAX_RECV_FAILURES {
		return None;
	}
	let delay = RECV_RETRY_BASE.saturating_mul(1 << (failures - 1));
	Some(delay.min(RECV_RETRY_MAX))
}

/// IPv4 multicast transport on port 5353.
///
/// Clones share the same socket: one is handed to the daemon for sending,
/// another drives the receive loop.
#[derive(Clone)]
pub struct MdnsSocket {
	socket: Arc<UdpSocket>,
	group: SocketAddr,
}

impl MdnsSocket {
	/// Bind the mDNS port with address reuse and join the multicast group
	/// on `interface` (`0.0.0.0` lets the OS pick).
	///
	/// Must be called from within a tokio runtime.
	pub fn bind(interface: Ipv4Addr) -> Result<Self, TransportError> {
		let io = |e: std::io::Error| TransportError::Io(e.to_string());

		let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(io)?;
		socket.set_reuse_address(true).map_err(io)?;
		#[cfg(unix)]
		socket.set_reuse_port(true).map_err(io)?;

		let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT);
		socket.bind(&SockAddr::from(bind_addr)).map_err(io)?;
		socket.join_multicast_v4(&MDNS_GROUP_V4, &interface).map_err(io)?;
		socket.set_multicast_loop_v4(true).map_err(io)?;
		socket.set_multicast_ttl_v4(255).map_err(io)?;
		socket.set_nonblocking(true).map_err(io)?;

		let socket = UdpSocket::from_std(socket.into()).map_err(io)?;
		info!(%interface, "joined mDNS group {}:{}", MDNS_GROUP_V4, MDNS_PORT);

		Ok(Self {
			socket: Arc::new(socket),
			group: SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP_V4, MDNS_PORT)),
		})
	}

	/// Spawn the receive loop feeding `daemon`.
	///
	/// Packets that fail to parse are dropped. The first receive error of a
	/// run is reported to the daemon and retries back off; after
	/// `MAX_RECV_FAILURES` in a row the transport is reported closed and the
	/// loop stops. It also stops once the daemon shuts down.
	pub fn spawn_receiver(&self, daemon: Daemon) -> JoinHandle<()> {
		let socket = self.socket.clone();
		tokio::spawn(async move {
			let mut buf = vec![0u8; MAX_PACKET];
			let mut failures = 0u32;
			loop {
				let received = tokio::select! {
					_ = daemon.closed() => break,
					received = socket.recv_from(&mut buf) => received,
				};
				if received.is_ok() {
					failures = 0;
				}

				let result = match received {
					Ok((len, src)) => match parse_response(&buf[..len]) {
						Ok(records) if !records.is_empty() => {
							trace!(%src, records = records.len(), "mDNS response");
							daemon.inbound(0, records)
						}
						Ok(_) => Ok(()),
						Err(e) => {
							trace!(%src, error = %e, "dropping packet");
							Ok(())
						}
					},
					Err(e) => {
						failures += 1;
						warn!(error = %e, failures, "mDNS receive failed");
						let Some(delay) = recv_retry_delay(failures) else {
							let _ = daemon.transport_error(TransportError::Closed);
							break;
						};
						let reported = if failures == 1 {
							daemon.transport_error(TransportError::Io(e.to_string()))
						} else {
							Ok(())
						};
						tokio::select! {
							_ = daemon.closed() => break,
							_ = tokio::time::sleep(delay) => {}
						}
						reported
					}
				};
				if result.is_err() {
					break;
				}
			}
			debug!("mDNS receiver stopped");
		})
	}
}

impl Transport for MdnsSocket {
	fn send(
		&mut self,
		question: &Question,
		mode: QueryMode,
		known_answers: &[Record],
	) -> Result<(), TransportError> {
		let bytes = build_query(question, mode, known_answers)?;
		self.socket
			.try_send_to(&bytes, self.group)
			.map_err(|e| TransportError::Io(e.to_string()))?;
		trace!(%question, ?mode, bytes = bytes.len(), "mDNS query sent");
		Ok(())
	}
}
