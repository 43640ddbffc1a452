//! The SDO download (write) state machine.
//!
//! An [`SdoWriter`] drives a single object-dictionary write from start to
//! finish: one initiate-download request, optionally followed by a run of
//! download-segment requests with an alternating toggle bit. It is generic
//! over [`SdoClient`] so tests can drive it against a mock client without a
//! bus at all.

use super::client::SdoClient;
use super::codec;
use super::error::SdoError;

/// Drives a single SDO download (write) of one object-dictionary entry.
///
/// A writer is single-use: construct one per `(index, sub_index)` write and
/// call [`write`](Self::write) exactly once.
pub struct SdoWriter<C: SdoClient> {
	client: C,
	index: u16,
	sub_index: u8,
	force_segment: bool,
	toggle: u8,
	position: u32,
	size: u32,
}

impl<C: SdoClient> std::fmt::Debug for SdoWriter<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SdoWriter")
			.field("index", &self.index)
			.field("sub_index", &self.sub_index)
			.field("force_segment", &self.force_segment)
			.field("position", &self.position)
			.field("size", &self.size)
			.finish()
	}
}

impl<C: SdoClient> SdoWriter<C> {
	/// Create a writer for `index`/`sub_index` using `client` to perform the
	/// exchange.
	///
	/// If `force_segment` is set, the transfer always uses segmented mode
	/// even when the payload would fit in a single expedited frame.
	pub fn new(client: C, index: u16, sub_index: u8, force_segment: bool) -> Self {
		Self { client, index, sub_index, force_segment, toggle: 0, position: 0, size: 0 }
	}

	/// Write `data` to this writer's object-dictionary entry.
	///
	/// Sends the initiate-download request, then, if the transfer is
	/// segmented, a run of download-segment requests carrying `data` seven
	/// bytes at a time, alternating the toggle bit and marking only the
	/// final segment as the last one.
	pub async fn write(&mut self, data: &[u8]) -> Result<(), SdoError> {
		let size = data.len() as u32;
		let request = codec::build_request_download(self.index, self.sub_index, data, Some(size), self.force_segment);
		log::debug!(
			"SDO write {:#06x}:{:#04x}: built {} initiate-download request ({size} bytes)",
			self.index,
			self.sub_index,
			if request.segmented { "segmented" } else { "expedited" },
		);

		let index = self.index;
		let sub_index = self.sub_index;
		self.client
			.send(request.frame, Box::new(move |frame: &[u8; 8]| codec::initial_response_matches(frame, index, sub_index)))
			.await?;

		if !request.segmented {
			return Ok(());
		}

		self.toggle = 0;
		self.position = 0;
		self.size = size;

		while self.position < self.size {
			let segment = codec::build_segment_download(self.position, self.size, self.toggle, data);
			let toggle_before = self.toggle;
			self.client
				.send(segment.frame, Box::new(move |frame: &[u8; 8]| codec::segment_response_matches(frame, toggle_before)))
				.await?;

			self.toggle ^= codec::SDO_TOGGLE_BIT;
			self.position += segment.payload_len;
			log::debug!(
				"SDO write {:#06x}:{:#04x}: segment acknowledged, {}/{} bytes sent",
				self.index,
				self.sub_index,
				self.position,
				self.size,
			);
		}

		Ok(())
	}
}

/// Write `data` to `index`/`sub_index` on `client` in a single call.
///
/// Equivalent to constructing an [`SdoWriter`] and calling
/// [`write`](SdoWriter::write) once; provided for callers that don't need to
/// hold onto the writer.
pub async fn write<C: SdoClient>(client: C, index: u16, sub_index: u8, force_segment: bool, data: &[u8]) -> Result<(), SdoError> {
	SdoWriter::new(client, index, sub_index, force_segment).write(data).await
}

#[cfg(test)]
mod test {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use assert2::assert;

	use super::*;

	/// A mock [`SdoClient`] that plays back one scripted response per call
	/// and records the frames it was sent.
	struct ScriptedClient {
		responses: Vec<Result<[u8; 8], SdoError>>,
		sent: Vec<[u8; 8]>,
		next: AtomicUsize,
	}

	impl ScriptedClient {
		fn new(responses: Vec<Result<[u8; 8], SdoError>>) -> Self {
			Self { responses, sent: Vec::new(), next: AtomicUsize::new(0) }
		}
	}

	impl SdoClient for ScriptedClient {
		async fn send(&mut self, frame: [u8; 8], expect: Box<dyn Fn(&[u8; 8]) -> bool + Send>) -> Result<[u8; 8], SdoError> {
			self.sent.push(frame);
			let index = self.next.fetch_add(1, Ordering::SeqCst);
			match &self.responses[index] {
				Ok(response) => {
					assert!(expect(response));
					Ok(*response)
				}
				Err(SdoError::Timeout) => Err(SdoError::Timeout),
				Err(SdoError::SendFailed(err)) => Err(SdoError::SendFailed(std::io::Error::new(err.kind(), err.to_string()))),
			}
		}
	}

	#[tokio::test]
	async fn expedited_write_sends_a_single_frame() {
		let client = ScriptedClient::new(vec![Ok([0x60, 0xE8, 0x03, 0x02, 0, 0, 0, 0])]);
		let mut writer = SdoWriter::new(client, 0x03E8, 0x02, false);

		writer.write(b"Line").await.unwrap();
		assert!(writer.client.sent == vec![[0x23, 0xE8, 0x03, 0x02, 0x4C, 0x69, 0x6E, 0x65]]);
	}

	#[tokio::test]
	async fn segmented_write_sends_initiate_then_every_segment() {
		let client = ScriptedClient::new(vec![
			Ok([0x60, 0xE8, 0x03, 0x02, 0, 0, 0, 0]),
			Ok([0x20, 0, 0, 0, 0, 0, 0, 0]),
			Ok([0x30, 0, 0, 0, 0, 0, 0, 0]),
			Ok([0x20, 0, 0, 0, 0, 0, 0, 0]),
		]);
		let mut writer = SdoWriter::new(client, 0x03E8, 0x02, false);

		writer.write(b"SizeLongerAsOneLine").await.unwrap();

		let sent = &writer.client.sent;
		assert!(sent.len() == 4);
		assert!(sent[0] == [0x21, 0xE8, 0x03, 0x02, 0x13, 0x00, 0x00, 0x00]);
		assert!(sent[1] == [0x00, 0x53, 0x69, 0x7A, 0x65, 0x4C, 0x6F, 0x6E]);
		assert!(sent[2] == [0x10, 0x67, 0x65, 0x72, 0x41, 0x73, 0x4F, 0x6E]);
		assert!(sent[3] == [0x05, 0x65, 0x4C, 0x69, 0x6E, 0x65, 0x00, 0x00]);
	}

	#[tokio::test]
	async fn force_segment_on_short_payload_still_segments() {
		let client = ScriptedClient::new(vec![Ok([0x60, 0, 0, 0, 0, 0, 0, 0]), Ok([0x20, 0, 0, 0, 0, 0, 0, 0])]);
		let mut writer = SdoWriter::new(client, 0x1000, 0x00, true);

		writer.write(b"Ab").await.unwrap();
		assert!(writer.client.sent.len() == 2);
		assert!(writer.client.sent[0][0] & 0x02 == 0); // not expedited
	}

	#[tokio::test]
	async fn timeout_on_initial_response_aborts_before_any_segment() {
		let client = ScriptedClient::new(vec![Err(SdoError::Timeout)]);
		let mut writer = SdoWriter::new(client, 0x03E8, 0x02, false);

		let result = writer.write(b"SizeLongerAsOneLine").await;
		assert!(matches!(result, Err(SdoError::Timeout)));
		assert!(writer.client.sent.len() == 1);
	}

	#[tokio::test]
	async fn timeout_mid_transfer_stops_further_segments() {
		let client = ScriptedClient::new(vec![Ok([0x60, 0, 0, 0, 0, 0, 0, 0]), Ok([0x20, 0, 0, 0, 0, 0, 0, 0]), Err(SdoError::Timeout)]);
		let mut writer = SdoWriter::new(client, 0x03E8, 0x02, false);

		let result = writer.write(b"SizeLongerAsOneLine").await;
		assert!(matches!(result, Err(SdoError::Timeout)));
		assert!(writer.client.sent.len() == 3);
	}

	#[tokio::test]
	async fn convenience_function_matches_writer() {
		let client = ScriptedClient::new(vec![Ok([0x60, 0xE8, 0x03, 0x02, 0, 0, 0, 0])]);
		write(client, 0x03E8, 0x02, false, b"Line").await.unwrap();
	}
}
