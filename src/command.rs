use std::fmt;
use std::time::Duration;

use hickory_proto::rr::{Record, RecordType};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::DropGuard;
use tracing::trace;

use crate::cancel::CancelHandle;
use crate::error::Error;
use crate::matcher::{question_matches_record, record_data_equals, records_equal};
use crate::transport::{Flags, QueryMode, Question};

/// Called for every record answering a query: flags, interface index, record.
pub type QueryAnswered = Box<dyn FnMut(Flags, u32, Record) + Send>;

/// Called when a registration hits a transport or protocol failure.
pub type ErrCallback = Box<dyn FnMut(Error) + Send>;

/// Every callback shape a registration can be answered with.
pub enum ResponderTarget {
	/// Any record answering the question, CNAMEs included.
	Record(QueryAnswered),
	/// Only PTR records; a browse has no use for anything else.
	Browse(QueryAnswered),
}

/// Caller callbacks for one registration.
pub struct Responder {
	target: ResponderTarget,
	on_error: ErrCallback,
}

impl Responder {
	pub fn new(target: ResponderTarget, on_error: ErrCallback) -> Self {
		Self { target, on_error }
	}

	/// Records this responder wants delivered, checked before flags are set.
	pub fn record_filter(&self) -> fn(&Record) -> bool {
		match self.target {
			ResponderTarget::Record(_) => any_record,
			ResponderTarget::Browse(_) => ptr_only,
		}
	}

	pub fn deliver(&mut self, flags: Flags, if_index: u32, record: Record) {
		match &mut self.target {
			ResponderTarget::Record(on_answer) | ResponderTarget::Browse(on_answer) => {
				on_answer(flags, if_index, record)
			}
		}
	}

	pub fn deliver_error(&mut self, err: Error) {
		match &self.target {
			ResponderTarget::Record(_) | ResponderTarget::Browse(_) => (self.on_error)(err),
		}
	}
}

fn any_record(_: &Record) -> bool {
	true
}

fn ptr_only(record: &Record) -> bool {
	record.record_type() == RecordType::PTR
}

/// Work item for a responder task
#[derive(Debug)]
pub(crate) enum Delivery {
	Record { flags: Flags, if_index: u32, record: Record },
	Error(Error),
}

/// Run `responder` on its own task and return the channel feeding it.
///
/// The task ends once the sender side is dropped and the backlog drained,
/// so callbacks never run on the daemon loop.
pub(crate) fn spawn_responder(mut responder: Responder) -> mpsc::UnboundedSender<Delivery> {
	let (sender, mut receiver) = mpsc::unbounded_channel();
	tokio::spawn(async move {
		while let Some(delivery) = receiver.recv().await {
			match delivery {
				Delivery::Record { flags, if_index, record } => {
					responder.deliver(flags, if_index, record)
				}
				Delivery::Error(err) => responder.deliver_error(err),
			}
		}
	});
	sender
}

/// An answer a registration holds, with the time it arrived
struct KnownAnswer {
	record: Record,
	received: Instant,
}

impl KnownAnswer {
	fn expires_at(&self) -> Instant {
		self.received + Duration::from_secs(u64::from(self.record.ttl()))
	}
}

/// One outstanding registration, owned by the daemon's pending table
pub(crate) struct PendingCommand {
	pub id: u64,
	pub question: Question,
	pub mode: QueryMode,
	pub if_index: u32,
	pub cancel: CancelHandle,
	pub created_at: Instant,
	pub last_sent: Option<Instant>,
	pub next_send: Option<Instant>,
	pub interval: Duration,
	outbox: mpsc::UnboundedSender<Delivery>,
	accepts: fn(&Record) -> bool,
	known_answers: Vec<KnownAnswer>,
	// Fires when the command leaves the pending table, releasing its watcher
	_finished: Option<DropGuard>,
}

impl PendingCommand {
	pub fn new(
		id: u64,
		question: Question,
		mode: QueryMode,
		if_index: u32,
		cancel: CancelHandle,
		outbox: mpsc::UnboundedSender<Delivery>,
		interval: Duration,
	) -> Self {
		Self {
			id,
			question,
			mode,
			if_index,
			cancel,
			created_at: Instant::now(),
			last_sent: None,
			next_send: None,
			interval,
			outbox,
			accepts: any_record,
			known_answers: Vec::new(),
			_finished: None,
		}
	}

	/// Only records passing `accepts` count as answers.
	pub fn accepting(mut self, accepts: fn(&Record) -> bool) -> Self {
		self.accepts = accepts;
		self
	}

	/// Cancel `finished`'s token when this command is dropped.
	pub fn finished_by(mut self, finished: DropGuard) -> Self {
		self._finished = Some(finished);
		self
	}

	pub fn matches(&self, record: &Record) -> bool {
		question_matches_record(&self.question, record) && (self.accepts)(record)
	}

	/// Zero on either side means any interface.
	pub fn accepts_interface(&self, if_index: u32) -> bool {
		self.if_index == 0 || if_index == 0 || self.if_index == if_index
	}

	/// Track `record`, received at `now`, in the known-answer list.
	///
	/// Returns true when the record is news to this registration: a new or
	/// changed answer, or a goodbye for an answer it holds. Exact repeats
	/// only refresh the receive time.
	pub fn observe(&mut self, record: &Record, now: Instant) -> bool {
		self.expire_known_answers(now);

		if record.ttl() == 0 {
			let before = self.known_answers.len();
			self.known_answers.retain(|k| !record_data_equals(&k.record, record));
			return self.known_answers.len() < before;
		}

		if let Some(known) = self.known_answers.iter_mut().find(|k| records_equal(&k.record, record)) {
			known.received = now;
			return false;
		}
		self.known_answers.retain(|k| !record_data_equals(&k.record, record));
		self.known_answers.push(KnownAnswer { record: record.clone(), received: now });
		true
	}

	/// Forget answers whose TTL has run out.
	pub fn expire_known_answers(&mut self, now: Instant) {
		let id = self.id;
		self.known_answers.retain(|k| {
			let live = k.expires_at() > now;
			if !live {
				trace!(id, record = %k.record, "known answer expired");
			}
			live
		});
	}

	/// Answers worth attaching to a query sent at `now`.
	///
	/// Only answers with more than half their TTL left qualify (RFC 6762
	/// section 7.1), each carrying the TTL it has left.
	pub fn live_known_answers(&self, now: Instant) -> Vec<Record> {
		self.known_answers
			.iter()
			.filter_map(|k| {
				let ttl = Duration::from_secs(u64::from(k.record.ttl()));
				let elapsed = now.saturating_duration_since(k.received);
				if elapsed >= ttl / 2 {
					return None;
				}
				let remaining = u32::try_from((ttl - elapsed).as_secs()).unwrap_or(u32::MAX);
				let mut record = k.record.clone();
				record.set_ttl(remaining);
				Some(record)
			})
			.collect()
	}

	#[cfg(test)]
	pub fn known_answers(&self) -> impl Iterator<Item = &Record> {
		self.known_answers.iter().map(|k| &k.record)
	}

	pub fn deliver(&self, flags: Flags, if_index: u32, record: Record) {
		if self.outbox.send(Delivery::Record { flags, if_index, record }).is_err() {
			trace!(id = self.id, "responder gone, dropping record");
		}
	}

	pub fn deliver_error(&self, err: Error) {
		if self.outbox.send(Delivery::Error(err)).is_err() {
			trace!(id = self.id, "responder gone, dropping error");
		}
	}
}

impl fmt::Display for PendingCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "command{{{} {:?}}}", self.question, self.mode)
	}
}
