use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	Sent,
	/// Transport reported success-or-timeout ambiguity; treated as sent to
	/// avoid duplicate delivery.
	ProbablySent,
}

#[derive(Debug, Error)]
pub enum ChannelError {
	#[error("recipient has blocked or revoked the channel")]
	PermissionDenied,
	#[error("send timed out")]
	Timeout,
	#[error("transient transport error: {0}")]
	Transient(String),
	#[error("channel not configured for this user")]
	NotConfigured,
}
