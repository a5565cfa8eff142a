use std::fmt;

use hickory_proto::rr::Name;

use crate::error::{Error, Result};

/// The three-part logical name of a DNS-SD service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstanceName {
	pub instance: String,
	pub service_type: String,
	pub domain: String,
}

impl fmt::Display for ServiceInstanceName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&join_service_name(&self.instance, &self.service_type, &self.domain))
	}
}

/// Concatenate a three-part service name into the full, dot-terminated form.
///
/// No escaping is applied; the parts are expected in escaped text form
/// already (as returned by [`split_service_name`]).
pub fn join_service_name(instance: &str, service_type: &str, domain: &str) -> String {
	format!("{}.{}.{}.", instance, service_type, domain)
}

/// Split an escaped PTR target into instance, service type, and domain.
///
/// The first three unescaped dots delimit the instance label and the two
/// service type labels (e.g. `_http._tcp`). The remainder, with trailing
/// dots trimmed, is the domain.
///
/// Returns an error if the target has fewer than three unescaped dots.
pub fn split_service_name(ptr_target: &str) -> Result<ServiceInstanceName> {
	let mut cuts = Vec::with_capacity(3);
	let mut escaped = false;
	for (idx, c) in ptr_target.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match c {
			'\\' => escaped = true,
			'.' => {
				cuts.push(idx);
				if cuts.len() == 3 {
					break;
				}
			}
			_ => {}
		}
	}

	if cuts.len() < 3 {
		return Err(Error::InvalidName(format!(
			"'{}' is not a service instance name", ptr_target
		)));
	}

	Ok(ServiceInstanceName {
		instance: ptr_target[..cuts[0]].to_string(),
		service_type: ptr_target[cuts[0] + 1..cuts[2]].to_string(),
		domain: trim_trailing_dots(&ptr_target[cuts[2] + 1..]).to_string(),
	})
}

/// Trim unescaped trailing dots.
fn trim_trailing_dots(s: &str) -> &str {
	let mut end = s.len();
	while s[..end].ends_with('.') {
		// An odd run of backslashes before the dot escapes it
		let backslashes = s[..end - 1].bytes().rev().take_while(|&b| b == b'\\').count();
		if backslashes % 2 == 1 {
			break;
		}
		end -= 1;
	}
	&s[..end]
}

/// Decode DNS escaped label text into a UTF-8 string.
///
/// Recognized escapes are `\r`, `\t`, `\DDD` (a decimal byte value 0-255)
/// and `\c` for any other character `c`. Runs of decimal escapes are
/// decoded together, so multi-byte UTF-8 characters split across several
/// escapes come out as one character. A byte that is not part of a valid
/// UTF-8 sequence maps to the character with the same code point.
///
/// Malformed escapes never abort decoding: the offending characters are
/// kept literally and decoding continues.
pub fn unescape_to_utf8(packed: &str) -> String {
	decode_bytes(&unescape_bytes(packed))
}

/// Unescape label text into the raw bytes it denotes.
fn unescape_bytes(packed: &str) -> Vec<u8> {
	let chars: Vec<char> = packed.chars().collect();
	let mut bytes = Vec::with_capacity(packed.len());

	let mut i = 0;
	while i < chars.len() {
		let c = chars[i];
		if c != '\\' {
			push_char(&mut bytes, c);
			i += 1;
			continue;
		}

		let Some(&next) = chars.get(i + 1) else {
			// Dangling backslash at the end
			bytes.push(b'\\');
			break;
		};
		match next {
			'r' => {
				bytes.push(b'\r');
				i += 2;
			}
			't' => {
				bytes.push(b'\t');
				i += 2;
			}
			'0'..='9' => match decimal_escape(&chars[i + 1..]) {
				Some(b) => {
					bytes.push(b);
					i += 4;
				}
				None => {
					push_char(&mut bytes, next);
					i += 2;
				}
			},
			other => {
				push_char(&mut bytes, other);
				i += 2;
			}
		}
	}
	bytes
}

/// Parse three decimal digits into a byte, if they form a value in 0-255.
fn decimal_escape(digits: &[char]) -> Option<u8> {
	if digits.len() < 3 {
		return None;
	}
	let mut value: u32 = 0;
	for c in &digits[..3] {
		value = value * 10 + c.to_digit(10)?;
	}
	u8::try_from(value).ok()
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
	let mut buf = [0u8; 4];
	bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Decode bytes as UTF-8, mapping each invalid byte to the code point of
/// the same value.
fn decode_bytes(bytes: &[u8]) -> String {
	let mut out = String::with_capacity(bytes.len());
	let mut rest = bytes;
	while !rest.is_empty() {
		match std::str::from_utf8(rest) {
			Ok(s) => {
				out.push_str(s);
				break;
			}
			Err(e) => {
				let valid = e.valid_up_to();
				out.push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
				let bad = e.error_len().unwrap_or(rest.len() - valid);
				out.extend(rest[valid..valid + bad].iter().map(|&b| char::from(b)));
				rest = &rest[valid + bad..];
			}
		}
	}
	out
}

/// Escape one raw wire label into text form.
///
/// Printable ASCII is kept as is, `.` and `\` are backslash-escaped, and
/// every other byte (including space) becomes a `\DDD` escape.
pub fn escape_label(label: &[u8]) -> String {
	let mut out = String::with_capacity(label.len());
	for &b in label {
		match b {
			b'.' | b'\\' => {
				out.push('\\');
				out.push(char::from(b));
			}
			0x21..=0x7e => out.push(char::from(b)),
			_ => out.push_str(&format!("\\{:03}", b)),
		}
	}
	out
}

/// Render a name as escaped, dot-terminated text.
pub fn to_escaped(name: &Name) -> String {
	let mut out = String::new();
	for label in name.iter() {
		out.push_str(&escape_label(label));
		out.push('.');
	}
	if out.is_empty() {
		out.push('.');
	}
	out
}

/// Parse escaped text into a fully-qualified name.
pub fn parse_name(text: &str) -> Result<Name> {
	let mut labels: Vec<Vec<u8>> = Vec::new();
	let mut start = 0;
	let mut escaped = false;
	for (idx, c) in text.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match c {
			'\\' => escaped = true,
			'.' => {
				labels.push(unescape_bytes(&text[start..idx]));
				start = idx + 1;
			}
			_ => {}
		}
	}
	if start < text.len() {
		labels.push(unescape_bytes(&text[start..]));
	}

	if labels.is_empty() || (labels.len() == 1 && labels[0].is_empty()) {
		return Ok(Name::root());
	}
	if labels.iter().any(|l| l.is_empty()) {
		return Err(Error::InvalidName(format!("'{}' contains an empty label", text)));
	}

	Name::from_labels(labels.iter().map(|l| l.as_slice()))
		.map_err(|e| Error::InvalidName(format!("'{}': {}", text, e)))
}
