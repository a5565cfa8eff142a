use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::{Record, RecordType};

use crate::error::TransportError;
use crate::transport::{QueryMode, Question};

/// Build an mDNS query message for `question`.
///
/// mDNS queries carry id 0 and no recursion-desired bit. Known answers go
/// into the answer section so responders can suppress them. Probes are
/// sent as ANY questions for the name.
/// Returns the serialized message ready to send over UDP.
pub fn build_query(
	question: &Question,
	mode: QueryMode,
	known_answers: &[Record],
) -> Result<Vec<u8>, TransportError> {
	let mut query = question.to_query();
	if mode == QueryMode::Probe {
		query.set_query_type(RecordType::ANY);
	}

	let mut message = Message::new();
	message.set_id(0);
	message.set_message_type(MessageType::Query);
	message.set_op_code(OpCode::Query);
	message.set_recursion_desired(false);
	message.add_query(query);
	message.add_answers(known_answers.iter().cloned());

	message.to_vec()
		.map_err(|e| TransportError::Encode(e.to_string()))
}

/// Parse a received mDNS packet and return its answer and additional records.
///
/// Queries from other hosts are rejected, as are packets that do not parse.
pub fn parse_response(bytes: &[u8]) -> Result<Vec<Record>, TransportError> {
	let mut message = Message::from_vec(bytes)
		.map_err(|e| TransportError::Decode(e.to_string()))?;

	// Verify this is a response, not a query
	if message.message_type() != MessageType::Response {
		return Err(TransportError::Decode("received a query instead of a response".to_string()));
	}

	let mut records = message.take_answers();
	records.extend(message.take_additionals());
	Ok(records)
}
