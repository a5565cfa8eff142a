//! Question and record matching rules.
//!
//! A record answers a question when the names match, the record type
//! matches the question type unless the question type is ANY or the record
//! is a CNAME, and the classes match. Classes other than IN are compared
//! exactly as well; there is no class wildcard.

use hickory_proto::rr::{Record, RecordType};

use crate::transport::Question;

/// Check whether `record` answers `question`.
///
/// CNAME records match any concrete question type (single hop only).
pub fn question_matches_record(question: &Question, record: &Record) -> bool {
	(question.record_type == RecordType::ANY
		|| question.record_type == record.record_type()
		|| record.record_type() == RecordType::CNAME)
		&& question.dns_class == record.dns_class()
		&& &question.name == record.name()
}

/// Check that two records share type, class and name.
pub fn record_header_equals(r1: &Record, r2: &Record) -> bool {
	r1.record_type() == r2.record_type()
		&& r1.dns_class() == r2.dns_class()
		&& r1.name() == r2.name()
}

/// Same owner, type, class and payload; TTL ignored.
pub fn record_data_equals(r1: &Record, r2: &Record) -> bool {
	record_header_equals(r1, r2) && r1.data() == r2.data()
}

/// Check that two records are identical, payload and TTL included.
pub fn records_equal(r1: &Record, r2: &Record) -> bool {
	r1.to_string() == r2.to_string()
}

pub fn questions_equal(q1: &Question, q2: &Question) -> bool {
	q1.record_type == q2.record_type
		&& q1.dns_class == q2.dns_class
		&& q1.name == q2.name
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use hickory_proto::rr::rdata::{A, CNAME, PTR};
	use hickory_proto::rr::{DNSClass, Name, RData};

	pub(crate) fn name(s: &str) -> Name {
		Name::from_ascii(s).unwrap()
	}

	pub(crate) fn a_record(owner: &str, ttl: u32, last: u8) -> Record {
		Record::from_rdata(name(owner), ttl, RData::A(A::new(192, 168, 1, last)))
	}

	pub(crate) fn ptr_record(owner: &str, ttl: u32, target: Name) -> Record {
		Record::from_rdata(name(owner), ttl, RData::PTR(PTR(target)))
	}

	fn cname_record(owner: &str, target: &str) -> Record {
		Record::from_rdata(name(owner), 120, RData::CNAME(CNAME(name(target))))
	}

	fn question(owner: &str, record_type: RecordType) -> Question {
		Question::new(name(owner), record_type, DNSClass::IN)
	}

	#[test]
	fn test_exact_type_matches() {
		let q = question("printer.local.", RecordType::A);
		assert!(question_matches_record(&q, &a_record("printer.local.", 120, 5)));
	}

	#[test]
	fn test_any_matches_every_type() {
		let q = question("printer.local.", RecordType::ANY);
		assert!(question_matches_record(&q, &a_record("printer.local.", 120, 5)));
	}

	#[test]
	fn test_cname_matches_concrete_type() {
		let q = question("www.local.", RecordType::AAAA);
		assert!(question_matches_record(&q, &cname_record("www.local.", "host.local.")));
	}

	#[test]
	fn test_type_mismatch() {
		let q = question("printer.local.", RecordType::TXT);
		assert!(!question_matches_record(&q, &a_record("printer.local.", 120, 5)));
	}

	#[test]
	fn test_class_must_match_exactly() {
		let q = Question::new(name("printer.local."), RecordType::A, DNSClass::CH);
		assert!(!question_matches_record(&q, &a_record("printer.local.", 120, 5)));

		let mut chaos = a_record("printer.local.", 120, 5);
		chaos.set_dns_class(DNSClass::CH);
		assert!(question_matches_record(&q, &chaos));
	}

	#[test]
	fn test_name_mismatch() {
		let q = question("printer.local.", RecordType::A);
		assert!(!question_matches_record(&q, &a_record("scanner.local.", 120, 5)));
	}

	#[test]
	fn test_record_header_equals_ignores_payload() {
		let r1 = a_record("printer.local.", 120, 5);
		let r2 = a_record("printer.local.", 4500, 6);
		assert!(record_header_equals(&r1, &r2));
		assert!(!records_equal(&r1, &r2));
		assert!(!record_header_equals(&r1, &cname_record("printer.local.", "x.local.")));
	}

	#[test]
	fn test_record_data_equals_ignores_ttl() {
		let live = a_record("printer.local.", 120, 5);
		assert!(record_data_equals(&live, &a_record("printer.local.", 0, 5)));
		assert!(!record_data_equals(&live, &a_record("printer.local.", 120, 6)));
	}

	#[test]
	fn test_records_equal() {
		let r1 = a_record("printer.local.", 120, 5);
		let r2 = a_record("printer.local.", 120, 5);
		assert!(records_equal(&r1, &r2));
		// TTL is part of the canonical text
		assert!(!records_equal(&r1, &a_record("printer.local.", 121, 5)));
	}

	#[test]
	fn test_questions_equal() {
		let q1 = question("_http._tcp.local.", RecordType::PTR);
		assert!(questions_equal(&q1, &question("_http._tcp.local.", RecordType::PTR)));
		assert!(!questions_equal(&q1, &question("_http._tcp.local.", RecordType::ANY)));
		assert!(!questions_equal(&q1, &question("_ipp._tcp.local.", RecordType::PTR)));
	}
}
