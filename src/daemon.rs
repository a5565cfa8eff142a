//! The daemon actor.
//!
//! All query state lives in a [`DaemonState`] owned by one tokio task. Every
//! mutation, including cancellation and inbound record dispatch, reaches it
//! as a unit of work on a single FIFO queue, so the pending table needs no
//! locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hickory_proto::rr::Record;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancelHandle;
use crate::command::{spawn_responder, PendingCommand, Responder};
use crate::error::{Error, Result, TransportError};
use crate::matcher::{questions_equal, record_data_equals, records_equal};
use crate::timing::{earliest_of, jittered_duration, latest_of, next_interval};
use crate::transport::{DaemonConfig, Flags, QueryMode, Question, Transport};

type Work = Box<dyn FnOnce(&mut DaemonState) + Send>;

/// Handle to a running daemon. Cheap to clone.
#[derive(Clone)]
pub struct Daemon {
	sender: mpsc::UnboundedSender<Work>,
	shutdown: CancellationToken,
	next_id: Arc<AtomicU64>,
}

impl Daemon {
	/// Spawn a daemon on the current tokio runtime.
	pub fn start<T: Transport>(transport: T, config: DaemonConfig) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		let shutdown = CancellationToken::new();
		let state = DaemonState {
			transport: Box::new(transport),
			pending: Vec::new(),
			config,
		};
		tokio::spawn(run(state, receiver, shutdown.clone()));
		info!("mDNS daemon started");

		Self {
			sender,
			shutdown,
			next_id: Arc::new(AtomicU64::new(1)),
		}
	}

	/// Queue `work` to run inside the daemon, after everything queued before it.
	pub fn enqueue<F>(&self, work: F) -> Result<()>
	where
		F: FnOnce(&mut DaemonState) + Send + 'static,
	{
		if self.shutdown.is_cancelled() {
			return Err(Error::Shutdown);
		}
		self.sender.send(Box::new(work)).map_err(|_| Error::Shutdown)
	}

	/// Register a question and send it.
	///
	/// Matching records go to `responder` until `cancel` fires. Cancellation
	/// is turned into a queued removal by a watcher task.
	pub fn run_query(
		&self,
		mode: QueryMode,
		cancel: &CancelHandle,
		if_index: u32,
		question: Question,
		responder: Responder,
	) -> Result<()> {
		self.register(mode, cancel, if_index, question, responder).map(|_watcher| ())
	}

	/// Queue the registration and spawn its cancel watcher.
	///
	/// The watcher exits on cancel, on shutdown, or once the registration
	/// leaves the pending table for any other reason.
	fn register(
		&self,
		mode: QueryMode,
		cancel: &CancelHandle,
		if_index: u32,
		question: Question,
		responder: Responder,
	) -> Result<JoinHandle<()>> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let registration = cancel.clone();
		let finished = CancellationToken::new();
		let guard = finished.clone().drop_guard();
		self.enqueue(move |state| {
			state.run_query(id, mode, registration, if_index, question, responder, guard)
		})?;

		let watched = cancel.clone();
		let daemon = self.clone();
		Ok(tokio::spawn(async move {
			tokio::select! {
				_ = watched.cancelled() => {
					// Fails only when the daemon is already gone
					let _ = daemon.enqueue(move |state| state.remove(id));
				}
				_ = finished.cancelled() => trace!(id, "registration finished"),
				_ = daemon.shutdown.cancelled() => {}
			}
		}))
	}

	/// Hand records from one received packet to the daemon.
	pub fn inbound(&self, if_index: u32, records: Vec<Record>) -> Result<()> {
		self.enqueue(move |state| state.dispatch(if_index, records))
	}

	/// Report a transport failure to every registration.
	pub fn transport_error(&self, err: TransportError) -> Result<()> {
		self.enqueue(move |state| state.transport_failed(err))
	}

	/// Wait until everything queued so far has run.
	pub async fn flush(&self) -> Result<()> {
		let (done, wait) = oneshot::channel();
		self.enqueue(move |_| {
			let _ = done.send(());
		})?;
		wait.await.map_err(|_| Error::Shutdown)
	}

	/// Number of live registrations, as seen from inside the queue.
	pub async fn pending_count(&self) -> Result<usize> {
		let (reply, wait) = oneshot::channel();
		self.enqueue(move |state| {
			let _ = reply.send(state.pending_len());
		})?;
		wait.await.map_err(|_| Error::Shutdown)
	}

	/// Stop the daemon. Pending registrations are dropped.
	pub fn shutdown(&self) {
		self.shutdown.cancel();
	}

	pub fn is_shutdown(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Resolves once [`Daemon::shutdown`] has been called.
	pub async fn closed(&self) {
		self.shutdown.cancelled().await
	}
}

async fn run(
	mut state: DaemonState,
	mut receiver: mpsc::UnboundedReceiver<Work>,
	shutdown: CancellationToken,
) {
	loop {
		let wake = state.next_wake();
		tokio::select! {
			biased;
			_ = shutdown.cancelled() => break,
			_ = sleep_until_deadline(wake) => state.on_timer(Instant::now()),
			work = receiver.recv() => match work {
				Some(work) => work(&mut state),
				None => break,
			},
		}
	}

	let dropped = state.pending.len();
	state.pending.clear();
	info!(dropped, "mDNS daemon stopped");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

/// State owned by the daemon task
pub struct DaemonState {
	transport: Box<dyn Transport>,
	pending: Vec<PendingCommand>,
	config: DaemonConfig,
}

impl DaemonState {
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	#[allow(clippy::too_many_arguments)]
	fn run_query(
		&mut self,
		id: u64,
		mode: QueryMode,
		cancel: CancelHandle,
		if_index: u32,
		question: Question,
		responder: Responder,
		finished: DropGuard,
	) {
		if cancel.is_cancelled() {
			debug!(id, "registration cancelled before it started");
			return;
		}

		let accepts = responder.record_filter();
		let outbox = spawn_responder(responder);
		let mut cmd = PendingCommand::new(
			id, question, mode, if_index, cancel, outbox, self.config.initial_interval,
		)
		.accepting(accepts)
		.finished_by(finished);
		debug!(id, %cmd, if_index, "registering query");

		let now = Instant::now();
		let result = self.transport.send(&cmd.question, cmd.mode, &[]);
		reschedule(&mut cmd, &self.config, now);
		match result {
			Ok(()) => self.pending.push(cmd),
			Err(TransportError::Closed) => {
				self.pending.push(cmd);
				self.transport_failed(TransportError::Closed);
			}
			Err(err) => {
				warn!(id, error = %err, "initial send failed");
				cmd.deliver_error(Error::Transport(err));
				self.pending.push(cmd);
			}
		}
	}

	fn remove(&mut self, id: u64) {
		if let Some(pos) = self.pending.iter().position(|c| c.id == id) {
			let cmd = self.pending.remove(pos);
			debug!(id, %cmd, age_ms = cmd.created_at.elapsed().as_millis() as u64, "registration removed");
		}
	}

	/// Drop registrations whose handle has fired but whose removal is still queued.
	fn prune_cancelled(&mut self) {
		self.pending.retain(|cmd| {
			let keep = !cmd.cancel.is_cancelled();
			if !keep {
				debug!(id = cmd.id, "pruning cancelled registration");
			}
			keep
		});
	}

	fn dispatch(&mut self, if_index: u32, records: Vec<Record>) {
		let mut unique: Vec<Record> = Vec::with_capacity(records.len());
		for record in records {
			if !unique.iter().any(|u| records_equal(u, &record)) {
				unique.push(record);
			}
		}

		self.prune_cancelled();

		let now = Instant::now();
		for cmd in self.pending.iter_mut() {
			if !cmd.accepts_interface(if_index) {
				continue;
			}
			let mut matched = Vec::new();
			for record in &unique {
				if cmd.matches(record) && cmd.observe(record, now) {
					matched.push(record);
				}
			}

			let count = matched.len();
			for (n, record) in matched.into_iter().enumerate() {
				let mut flags = Flags::NONE;
				if n + 1 < count {
					flags |= Flags::MORE_COMING;
				}
				if record.ttl() > 0 {
					flags |= Flags::RECORD_ADDED;
				}
				trace!(id = cmd.id, flags = flags.bits(), %record, "delivering record");
				cmd.deliver(flags, if_index, record.clone());
			}
		}
	}

	fn transport_failed(&mut self, err: TransportError) {
		match err {
			TransportError::Closed => {
				warn!(registrations = self.pending.len(), "transport closed, terminating registrations");
				for cmd in self.pending.drain(..) {
					cmd.deliver_error(Error::ChannelClosed);
				}
			}
			other => {
				warn!(error = %other, "transport error");
				for cmd in &self.pending {
					cmd.deliver_error(Error::Transport(other.clone()));
				}
			}
		}
	}

	fn next_wake(&self) -> Option<Instant> {
		self.pending
			.iter()
			.fold(None, |wake, cmd| earliest_of(wake, cmd.next_send))
	}

	/// Re-send every due question. Due registrations asking the same
	/// question share one send carrying all their known answers.
	fn on_timer(&mut self, now: Instant) {
		self.prune_cancelled();

		let mut batches: Vec<(Question, QueryMode, Vec<usize>)> = Vec::new();
		for (idx, cmd) in self.pending.iter().enumerate() {
			if !cmd.next_send.is_some_and(|t| t <= now) {
				continue;
			}
			match batches
				.iter_mut()
				.find(|(q, mode, _)| *mode == cmd.mode && questions_equal(q, &cmd.question))
			{
				Some((_, _, members)) => members.push(idx),
				None => batches.push((cmd.question.clone(), cmd.mode, vec![idx])),
			}
		}

		let mut closed = None;
		for (question, mode, members) in batches {
			let mut known: Vec<Record> = Vec::new();
			for &idx in &members {
				let cmd = &mut self.pending[idx];
				cmd.expire_known_answers(now);
				for record in cmd.live_known_answers(now) {
					if !known.iter().any(|k| record_data_equals(k, &record)) {
						known.push(record);
					}
				}
			}

			let result = self.transport.send(&question, mode, &known);
			trace!(%question, registrations = members.len(), known = known.len(), "re-query sent");

			for &idx in &members {
				let cmd = &mut self.pending[idx];
				reschedule(cmd, &self.config, now);
				if let Err(err) = &result {
					if *err != TransportError::Closed {
						cmd.deliver_error(Error::Transport(err.clone()));
					}
				}
			}
			if let Err(TransportError::Closed) = result {
				closed = Some(TransportError::Closed);
			}
		}

		if let Some(err) = closed {
			self.transport_failed(err);
		}
	}
}

/// Record a send at `now` and pick the next one.
///
/// The next send is one interval plus jitter away, but never closer than
/// `min_interval` to this one. The interval then doubles up to its cap.
fn reschedule(cmd: &mut PendingCommand, config: &DaemonConfig, now: Instant) {
	cmd.last_sent = Some(now);
	if !config.requery {
		cmd.next_send = None;
		return;
	}
	let jitter = jittered_duration(cmd.interval, config.jitter_percent);
	let earliest_allowed = cmd.last_sent.map(|t| t + config.min_interval);
	cmd.next_send = latest_of(Some(now + cmd.interval + jitter), earliest_allowed);
	cmd.interval = next_interval(cmd.interval, config.max_interval);
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::command::ResponderTarget;
	use crate::matcher::tests::{a_record, name};
	use hickory_proto::rr::{DNSClass, RecordType};
	use std::sync::Mutex;
	use std::time::Duration;

	#[derive(Debug, Clone)]
	pub(crate) struct SentQuery {
		pub question: Question,
		pub mode: QueryMode,
		/// TTLs of the attached known answers
		pub known_answers: Vec<u32>,
	}

	/// In-memory transport recording every send
	#[derive(Clone, Default)]
	pub(crate) struct RecordingTransport {
		sent: Arc<Mutex<Vec<SentQuery>>>,
		fail_with: Arc<Mutex<Option<TransportError>>>,
	}

	impl RecordingTransport {
		pub fn sent(&self) -> Vec<SentQuery> {
			self.sent.lock().unwrap().clone()
		}

		pub fn fail_with(&self, err: Option<TransportError>) {
			*self.fail_with.lock().unwrap() = err;
		}
	}

	impl Transport for RecordingTransport {
		fn send(
			&mut self,
			question: &Question,
			mode: QueryMode,
			known_answers: &[Record],
		) -> std::result::Result<(), TransportError> {
			self.sent.lock().unwrap().push(SentQuery {
				question: question.clone(),
				mode,
				known_answers: known_answers.iter().map(|r| r.ttl()).collect(),
			});
			match self.fail_with.lock().unwrap().clone() {
				Some(err) => Err(err),
				None => Ok(()),
			}
		}
	}

	pub(crate) type Answers = mpsc::UnboundedReceiver<(Flags, u32, Record)>;
	pub(crate) type Errors = mpsc::UnboundedReceiver<Error>;

	/// Responder forwarding everything into channels.
	pub(crate) fn collector() -> (Responder, Answers, Errors) {
		let (answer_tx, answers) = mpsc::unbounded_channel();
		let (error_tx, errors) = mpsc::unbounded_channel();
		let responder = Responder::new(
			ResponderTarget::Record(Box::new(move |flags: Flags, if_index: u32, record: Record| {
				let _ = answer_tx.send((flags, if_index, record));
			})),
			Box::new(move |err: Error| {
				let _ = error_tx.send(err);
			}),
		);
		(responder, answers, errors)
	}

	fn question(owner: &str) -> Question {
		Question::new(name(owner), RecordType::A, DNSClass::IN)
	}

	fn quiet_config() -> DaemonConfig {
		DaemonConfig { requery: false, ..DaemonConfig::default() }
	}

	async fn next<T>(receiver: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
		tokio::time::timeout(Duration::from_secs(2), receiver.recv())
			.await
			.expect("timed out waiting for callback")
	}

	#[tokio::test]
	async fn test_query_is_sent() {
		let transport = RecordingTransport::default();
		let daemon = Daemon::start(transport.clone(), quiet_config());
		let (responder, _answers, _errors) = collector();

		daemon
			.run_query(QueryMode::Probe, &CancelHandle::new(), 0, question("printer.local."), responder)
			.unwrap();
		daemon.flush().await.unwrap();

		let sent = transport.sent();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].question, question("printer.local."));
		assert_eq!(sent[0].mode, QueryMode::Probe);
		assert_eq!(daemon.pending_count().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_record_goes_to_matching_registration_only() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let cancel = CancelHandle::new();
		let (printer, mut printer_answers, _e1) = collector();
		let (scanner, mut scanner_answers, _e2) = collector();
		daemon.run_query(QueryMode::Query, &cancel, 0, question("printer.local."), printer).unwrap();
		daemon.run_query(QueryMode::Query, &cancel, 0, question("scanner.local."), scanner).unwrap();

		daemon.inbound(2, vec![a_record("printer.local.", 120, 5)]).unwrap();

		let (flags, if_index, record) = next(&mut printer_answers).await.unwrap();
		assert_eq!(flags, Flags::RECORD_ADDED);
		assert_eq!(if_index, 2);
		assert_eq!(record.name(), &name("printer.local."));

		// Cancelling drops the responders, closing their channels
		cancel.cancel();
		daemon.flush().await.unwrap();
		assert!(next(&mut scanner_answers).await.is_none());
	}

	#[tokio::test]
	async fn test_same_question_registrations_are_independent() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let first_cancel = CancelHandle::new();
		let (first, mut first_answers, _e1) = collector();
		let (second, mut second_answers, _e2) = collector();
		daemon.run_query(QueryMode::Query, &first_cancel, 0, question("printer.local."), first).unwrap();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), second).unwrap();

		daemon.inbound(0, vec![a_record("printer.local.", 120, 5)]).unwrap();
		assert!(next(&mut first_answers).await.is_some());
		assert!(next(&mut second_answers).await.is_some());

		first_cancel.cancel();
		daemon.inbound(0, vec![a_record("printer.local.", 120, 6)]).unwrap();
		assert!(next(&mut second_answers).await.is_some());
		assert!(next(&mut first_answers).await.is_none());
	}

	#[tokio::test]
	async fn test_cancel_is_ordered_before_later_record() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let cancel = CancelHandle::new();
		let (responder, mut answers, mut errors) = collector();
		daemon.run_query(QueryMode::Query, &cancel, 0, question("printer.local."), responder).unwrap();
		daemon.flush().await.unwrap();

		// The watcher has not had a chance to queue the removal yet
		cancel.cancel();
		daemon.inbound(0, vec![a_record("printer.local.", 120, 5)]).unwrap();
		daemon.flush().await.unwrap();

		assert!(next(&mut answers).await.is_none());
		assert!(next(&mut errors).await.is_none());
		assert_eq!(daemon.pending_count().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_already_cancelled_handle_never_registers() {
		let transport = RecordingTransport::default();
		let daemon = Daemon::start(transport.clone(), quiet_config());
		let cancel = CancelHandle::new();
		cancel.cancel();
		let (responder, mut answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &cancel, 0, question("printer.local."), responder).unwrap();
		daemon.flush().await.unwrap();

		assert!(transport.sent().is_empty());
		assert!(next(&mut answers).await.is_none());
	}

	#[tokio::test]
	async fn test_more_coming_within_one_packet() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let (responder, mut answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();

		daemon.inbound(0, vec![
			a_record("printer.local.", 120, 5),
			a_record("scanner.local.", 120, 9),
			a_record("printer.local.", 120, 6),
		]).unwrap();

		let (first, _, _) = next(&mut answers).await.unwrap();
		let (second, _, _) = next(&mut answers).await.unwrap();
		assert_eq!(first, Flags::MORE_COMING | Flags::RECORD_ADDED);
		assert_eq!(second, Flags::RECORD_ADDED);
	}

	#[tokio::test]
	async fn test_duplicates_delivered_once() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let (responder, mut answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();

		let record = a_record("printer.local.", 120, 5);
		daemon.inbound(0, vec![record.clone(), record.clone()]).unwrap();
		daemon.inbound(1, vec![record.clone()]).unwrap();
		daemon.inbound(0, vec![a_record("printer.local.", 0, 5)]).unwrap();

		let (flags, _, _) = next(&mut answers).await.unwrap();
		assert_eq!(flags, Flags::RECORD_ADDED);
		// The goodbye comes next, without RECORD_ADDED
		let (flags, _, goodbye) = next(&mut answers).await.unwrap();
		assert_eq!(flags, Flags::NONE);
		assert_eq!(goodbye.ttl(), 0);
	}

	#[tokio::test]
	async fn test_goodbye_delivered_once() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let (responder, mut answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();

		daemon.inbound(0, vec![a_record("printer.local.", 120, 5)]).unwrap();
		daemon.inbound(0, vec![a_record("printer.local.", 0, 5)]).unwrap();
		daemon.inbound(0, vec![a_record("printer.local.", 0, 5)]).unwrap();
		daemon.inbound(0, vec![a_record("printer.local.", 0, 77)]).unwrap();
		daemon.inbound(0, vec![a_record("printer.local.", 120, 6)]).unwrap();

		let mut seen = Vec::new();
		for _ in 0..3 {
			let (flags, _, record) = next(&mut answers).await.unwrap();
			seen.push((flags, record.ttl(), record.data().to_string()));
		}
		assert_eq!(seen, vec![
			(Flags::RECORD_ADDED, 120, "192.168.1.5".to_string()),
			(Flags::NONE, 0, "192.168.1.5".to_string()),
			(Flags::RECORD_ADDED, 120, "192.168.1.6".to_string()),
		]);
	}

	#[tokio::test]
	async fn test_interface_filter() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let (responder, mut answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 3, question("printer.local."), responder).unwrap();

		daemon.inbound(4, vec![a_record("printer.local.", 120, 5)]).unwrap();
		daemon.inbound(3, vec![a_record("printer.local.", 120, 6)]).unwrap();

		let (_, if_index, _) = next(&mut answers).await.unwrap();
		assert_eq!(if_index, 3);
	}

	#[tokio::test]
	async fn test_transport_error_keeps_registration() {
		let transport = RecordingTransport::default();
		transport.fail_with(Some(TransportError::Io("network unreachable".to_string())));
		let daemon = Daemon::start(transport.clone(), quiet_config());
		let (responder, mut answers, mut errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();

		let err = next(&mut errors).await.unwrap();
		assert_eq!(err, Error::Transport(TransportError::Io("network unreachable".to_string())));

		daemon.inbound(0, vec![a_record("printer.local.", 120, 5)]).unwrap();
		assert!(next(&mut answers).await.is_some());
	}

	#[tokio::test]
	async fn test_watcher_exits_when_transport_closes() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let (responder, _answers, mut errors) = collector();
		let watcher = daemon
			.register(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder)
			.unwrap();

		daemon.transport_error(TransportError::Closed).unwrap();
		assert_eq!(next(&mut errors).await, Some(Error::ChannelClosed));

		tokio::time::timeout(Duration::from_secs(2), watcher)
			.await
			.expect("watcher still running")
			.unwrap();
		assert!(!daemon.is_shutdown());
	}

	#[tokio::test]
	async fn test_transport_closed_terminates_once() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		let (responder, mut answers, mut errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();

		daemon.transport_error(TransportError::Closed).unwrap();
		daemon.transport_error(TransportError::Closed).unwrap();

		assert_eq!(next(&mut errors).await, Some(Error::ChannelClosed));
		assert!(next(&mut errors).await.is_none());
		assert!(next(&mut answers).await.is_none());
		assert_eq!(daemon.pending_count().await.unwrap(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_requery_backoff() {
		let transport = RecordingTransport::default();
		let config = DaemonConfig { jitter_percent: 0, ..DaemonConfig::default() };
		let daemon = Daemon::start(transport.clone(), config);
		let (responder, _answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();
		daemon.flush().await.unwrap();
		assert_eq!(transport.sent().len(), 1);

		let steps = [(999, 1), (1, 2), (1999, 2), (1, 3), (3999, 3), (1, 4)];
		for (advance_ms, expected) in steps {
			tokio::time::advance(Duration::from_millis(advance_ms)).await;
			daemon.flush().await.unwrap();
			assert_eq!(transport.sent().len(), expected, "after +{} ms", advance_ms);
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_requery_coalesces_and_carries_known_answers() {
		let transport = RecordingTransport::default();
		let config = DaemonConfig { jitter_percent: 0, ..DaemonConfig::default() };
		let daemon = Daemon::start(transport.clone(), config);
		let (first, _a1, _e1) = collector();
		let (second, _a2, _e2) = collector();
		let cancel = CancelHandle::new();
		daemon.run_query(QueryMode::Query, &cancel, 0, question("printer.local."), first).unwrap();
		daemon.run_query(QueryMode::Query, &cancel, 0, question("printer.local."), second).unwrap();
		daemon.inbound(0, vec![a_record("printer.local.", 120, 5)]).unwrap();
		daemon.flush().await.unwrap();
		assert_eq!(transport.sent().len(), 2);

		tokio::time::advance(Duration::from_secs(1)).await;
		daemon.flush().await.unwrap();

		let sent = transport.sent();
		assert_eq!(sent.len(), 3);
		assert_eq!(sent[2].known_answers, vec![119]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_known_answers_age_with_time() {
		let transport = RecordingTransport::default();
		let config = DaemonConfig { jitter_percent: 0, ..DaemonConfig::default() };
		let daemon = Daemon::start(transport.clone(), config);
		let (responder, mut answers, _errors) = collector();
		daemon.run_query(QueryMode::Query, &CancelHandle::new(), 0, question("printer.local."), responder).unwrap();
		daemon.inbound(0, vec![
			a_record("printer.local.", 4, 5),
			a_record("printer.local.", 120, 6),
		]).unwrap();
		daemon.flush().await.unwrap();
		next(&mut answers).await.unwrap();
		next(&mut answers).await.unwrap();

		// Re-queries go out at +1 s, +3 s and +7 s
		let steps = [(1, vec![3, 119]), (2, vec![117]), (4, vec![113])];
		for (advance_s, expected) in steps {
			tokio::time::advance(Duration::from_secs(advance_s)).await;
			daemon.flush().await.unwrap();
			let sent = transport.sent();
			assert_eq!(sent.last().unwrap().known_answers, expected, "after +{} s", advance_s);
		}
		assert_eq!(transport.sent().len(), 4);

		// The short-lived answer has expired, so a re-announcement is news again
		daemon.inbound(0, vec![a_record("printer.local.", 4, 5)]).unwrap();
		let (flags, _, record) = next(&mut answers).await.unwrap();
		assert_eq!(flags, Flags::RECORD_ADDED);
		assert_eq!(record.ttl(), 4);
	}

	#[tokio::test]
	async fn test_shutdown_rejects_new_work() {
		let daemon = Daemon::start(RecordingTransport::default(), quiet_config());
		daemon.shutdown();
		daemon.closed().await;
		assert!(daemon.is_shutdown());
		assert_eq!(daemon.inbound(0, Vec::new()), Err(Error::Shutdown));
		assert_eq!(daemon.flush().await, Err(Error::Shutdown));
	}
}
