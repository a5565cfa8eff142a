use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::time::Duration;

use hickory_proto::op::Query;
use hickory_proto::rr::{DNSClass, Name, Record, RecordType};

use crate::error::TransportError;

/// A single DNS question: name, record type and class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
	pub name: Name,
	pub record_type: RecordType,
	pub dns_class: DNSClass,
}

impl Question {
	pub fn new(name: Name, record_type: RecordType, dns_class: DNSClass) -> Self {
		Self { name, record_type, dns_class }
	}

	/// Convert into the wire codec's query type.
	pub fn to_query(&self) -> Query {
		let mut query = Query::query(self.name.clone(), self.record_type);
		query.set_query_class(self.dns_class);
		query
	}
}

impl fmt::Display for Question {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {}", self.name, self.dns_class, self.record_type)
	}
}

/// How a question goes out on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
	/// Ordinary query
	Query,
	/// Probe before claiming a name; conflict detection is up to the caller
	Probe,
}

/// Response flags passed to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u32);

impl Flags {
	pub const NONE: Flags = Flags(0);
	/// More results for this event batch follow immediately
	pub const MORE_COMING: Flags = Flags(1);
	/// The record was added (as opposed to removed)
	pub const RECORD_ADDED: Flags = Flags(8);

	pub fn contains(self, other: Flags) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn bits(self) -> u32 {
		self.0
	}
}

impl BitOr for Flags {
	type Output = Flags;

	fn bitor(self, rhs: Flags) -> Flags {
		Flags(self.0 | rhs.0)
	}
}

impl BitOrAssign for Flags {
	fn bitor_assign(&mut self, rhs: Flags) {
		self.0 |= rhs.0;
	}
}

impl BitAnd for Flags {
	type Output = Flags;

	fn bitand(self, rhs: Flags) -> Flags {
		Flags(self.0 & rhs.0)
	}
}

/// Outbound half of the network transport.
///
/// Implementations must not block: the daemon calls `send` from inside its
/// serialized loop. Inbound records are pushed into the daemon with
/// [`crate::Daemon::inbound`].
pub trait Transport: Send + 'static {
	fn send(
		&mut self,
		question: &Question,
		mode: QueryMode,
		known_answers: &[Record],
	) -> Result<(), TransportError>;
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
	/// Keep re-sending questions for as long as they are registered
	pub requery: bool,
	/// Delay before the first re-query
	pub initial_interval: Duration,
	/// Upper bound for the doubling re-query interval
	pub max_interval: Duration,
	/// Minimum gap between two sends of the same registration
	pub min_interval: Duration,
	/// Random extra delay added to each interval, in percent of it
	pub jitter_percent: u32,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		Self {
			requery: true,
			initial_interval: Duration::from_secs(1),
			max_interval: Duration::from_secs(60 * 60),
			min_interval: Duration::from_secs(1),
			jitter_percent: 20,
		}
	}
}
