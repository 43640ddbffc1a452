//! Errors raised by the SDO download engine.

/// Errors that an [`SdoClient`](super::client::SdoClient) or
/// [`SdoWriter`](super::writer::SdoWriter) can report.
///
/// A server that rejects, aborts, or otherwise responds in a way the
/// response predicate does not recognize is indistinguishable from one that
/// never responds: both surface as [`SdoError::Timeout`] once the client's
/// retry budget is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum SdoError {
	/// No matching response arrived before the client's timeout (after
	/// exhausting its configured retries, if any).
	#[error("timed out waiting for a matching SDO response")]
	Timeout,

	/// Transmitting the request frame failed at the transport level.
	#[error("failed to send CAN frame: {0}")]
	SendFailed(std::io::Error),
}
