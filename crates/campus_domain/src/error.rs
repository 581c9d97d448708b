#![forbid(unsafe_code)]

use thiserror::Error;

/// Request-level error taxonomy.
///
/// `Upstream` never propagates past the component that detected it; every
/// cache/push/registry call site degrades instead. `System` is the only
/// failure class surfaced to callers for writes, and it surfaces as a
/// generic message without internal detail.
#[derive(Debug, Error)]
pub enum Error {
	#[error("{0}")]
	Validation(String),

	#[error("{0}")]
	Authorization(String),

	#[error("{0} not found")]
	NotFound(&'static str),

	#[error("{0}")]
	Conflict(String),

	#[error("upstream dependency failed: {0}")]
	Upstream(String),

	#[error("internal error")]
	System(#[from] anyhow::Error),
}

impl Error {
	pub fn validation(msg: impl Into<String>) -> Self {
		Error::Validation(msg.into())
	}

	pub fn authorization(msg: impl Into<String>) -> Self {
		Error::Authorization(msg.into())
	}

	pub fn conflict(msg: impl Into<String>) -> Self {
		Error::Conflict(msg.into())
	}

	/// HTTP status code equivalent for the REST boundary.
	pub fn status(&self) -> u16 {
		match self {
			Error::Validation(_) => 400,
			Error::Authorization(_) => 403,
			Error::NotFound(_) => 404,
			Error::Conflict(_) => 409,
			Error::Upstream(_) | Error::System(_) => 500,
		}
	}

	/// Message safe to return to the caller.
	pub fn public_message(&self) -> String {
		match self {
			Error::System(_) | Error::Upstream(_) => "internal error".to_string(),
			other => other.to_string(),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
