use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use tracing::{debug, trace};

use crate::cancel::CancelHandle;
use crate::command::{Responder, ResponderTarget};
use crate::daemon::Daemon;
use crate::error::{Error, Result};
use crate::name::{parse_name, split_service_name, to_escaped, unescape_to_utf8};
use crate::transport::{Flags, QueryMode, Question};

/// Domain browsed when the caller leaves it blank
pub const DEFAULT_DOMAIN: &str = "local";

impl Daemon {
	/// Browse for instances of a service type, e.g. `_http._tcp`.
	///
	/// `on_update(found, flags, if_index, instance, service_type, domain)` is
	/// called for every instance seen; `found` is false when the instance
	/// said goodbye. `flags` may carry [`Flags::MORE_COMING`]. An empty
	/// `domain` browses `local`. Runs until `cancel` fires.
	#[allow(clippy::too_many_arguments)]
	pub fn browse<U, E>(
		&self,
		cancel: &CancelHandle,
		flags: Flags,
		if_index: u32,
		service_type: &str,
		domain: &str,
		mut on_update: U,
		on_error: E,
	) -> Result<()>
	where
		U: FnMut(bool, Flags, u32, &str, &str, &str) + Send + 'static,
		E: FnMut(Error) + Send + 'static,
	{
		let domain = domain.trim_end_matches('.');
		let domain = if domain.is_empty() { DEFAULT_DOMAIN } else { domain };
		let name = parse_name(&format!("{}.{}.", service_type, domain))?;
		let question = Question::new(name, RecordType::PTR, DNSClass::IN);
		debug!(service_type, domain, flags = flags.bits(), if_index, "browsing");

		let on_answer = move |flags: Flags, if_index: u32, record: Record| {
			let RData::PTR(ptr) = record.data() else {
				trace!(%record, "ignoring non-PTR answer to browse");
				return;
			};
			match split_service_name(&to_escaped(&ptr.0)) {
				Ok(service) => on_update(
					record.ttl() > 0,
					flags & Flags::MORE_COMING,
					if_index,
					&unescape_to_utf8(&service.instance),
					&service.service_type,
					&service.domain,
				),
				Err(err) => trace!(error = %err, "ignoring malformed PTR target"),
			}
		};

		let responder = Responder::new(
			ResponderTarget::Browse(Box::new(on_answer)),
			Box::new(on_error),
		);
		self.run_query(QueryMode::Query, cancel, if_index, question, responder)
	}

	/// Query an arbitrary record.
	///
	/// `name` is escaped text. Every matching record is passed to
	/// `on_answer(flags, if_index, record)`, with [`Flags::RECORD_ADDED`] set
	/// for live records. An `if_index` of 0 accepts answers from any
	/// interface. Runs until `cancel` fires.
	#[allow(clippy::too_many_arguments)]
	pub fn query<A, E>(
		&self,
		cancel: &CancelHandle,
		flags: Flags,
		if_index: u32,
		name: &str,
		record_type: RecordType,
		record_class: DNSClass,
		on_answer: A,
		on_error: E,
	) -> Result<()>
	where
		A: FnMut(Flags, u32, Record) + Send + 'static,
		E: FnMut(Error) + Send + 'static,
	{
		let question = Question::new(parse_name(name)?, record_type, record_class);
		debug!(%question, flags = flags.bits(), if_index, "querying");

		let responder = Responder::new(
			ResponderTarget::Record(Box::new(on_answer)),
			Box::new(on_error),
		);
		self.run_query(QueryMode::Query, cancel, if_index, question, responder)
	}

	/// Ask the network to verify a record that looks stale.
	///
	/// Not supported yet; always returns [`Error::NotImplemented`].
	pub fn reconfirm_record(&self, _flags: Flags, _if_index: u32, _record: &Record) -> Result<()> {
		Err(Error::NotImplemented("reconfirm_record"))
	}
}
