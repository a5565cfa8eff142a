use tokio_util::sync::CancellationToken;

/// Cancellation handle for one or more registrations.
///
/// Cloning yields a handle to the same signal. Cancelling never touches
/// daemon state directly: the daemon observes the signal and removes the
/// affected registrations from inside its own queue.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
	token: CancellationToken,
}

impl CancelHandle {
	pub fn new() -> Self {
		Self::default()
	}

	/// A handle cancelled together with `self`, but cancellable on its own.
	pub fn child(&self) -> Self {
		Self { token: self.token.child_token() }
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Resolves once the handle is cancelled.
	pub async fn cancelled(&self) {
		self.token.cancelled().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_cancel_is_shared_by_clones() {
		let handle = CancelHandle::new();
		let clone = handle.clone();
		assert!(!clone.is_cancelled());
		handle.cancel();
		assert!(clone.is_cancelled());
	}

	#[test]
	fn test_child_follows_parent_only() {
		let parent = CancelHandle::new();
		let child = parent.child();
		child.cancel();
		assert!(!parent.is_cancelled());

		let other = parent.child();
		parent.cancel();
		assert!(other.is_cancelled());
	}
}
