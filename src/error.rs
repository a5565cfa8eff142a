use thiserror::Error;

/// Failures reported by a [`crate::transport::Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("I/O error: {0}")]
	Io(String),

	#[error("failed to encode DNS message: {0}")]
	Encode(String),

	#[error("failed to decode DNS message: {0}")]
	Decode(String),

	/// The underlying channel is gone; no further traffic will flow.
	#[error("transport closed")]
	Closed,
}

/// Errors surfaced to callers, either as a return value or through an
/// error callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("invalid domain name: {0}")]
	InvalidName(String),

	#[error("transport error: {0}")]
	Transport(#[from] TransportError),

	/// The transport went away; the registration has been terminated.
	#[error("transport channel closed")]
	ChannelClosed,

	#[error("daemon is shut down")]
	Shutdown,

	#[error("operation not implemented: {0}")]
	NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
