//! Pure frame encoding/decoding for the SDO download (write) protocol.
//!
//! All functions here build or inspect fixed 8-byte frames; none of them
//! touch the network or any writer state. See [`crate::sdo::writer`] for the
//! state machine that drives a full download using these building blocks.

/// `ccs = 1` (initiate download) in the command byte's top 3 bits.
pub const SDO_REQUEST_DOWNLOAD: u8 = 0x20;

/// Expedited-transfer flag (bit 1) of an initiate-download command byte.
pub const SDO_EXPEDITED: u8 = 0x02;

/// Size-specified flag (bit 0) of an initiate-download command byte.
pub const SDO_SIZE_SPECIFIED: u8 = 0x01;

/// `ccs = 0` (download segment) in the command byte's top 3 bits.
pub const SDO_REQUEST_SEGMENT_DOWNLOAD: u8 = 0x00;

/// "No more data" flag (bit 0) of a download-segment command byte.
pub const SDO_NO_MORE_DATA: u8 = 0x01;

/// Toggle flag (bit 4), alternated on every segment.
pub const SDO_TOGGLE_BIT: u8 = 0x10;

/// `scs = 3` (initiate download response), masked with [`SDO_SERVER_COMMAND_MASK`].
pub const SDO_RESPONSE_DOWNLOAD: u8 = 0x60;

/// `scs = 1` (download segment response), masked with [`SDO_SERVER_COMMAND_MASK`].
pub const SDO_RESPONSE_SEGMENT_DOWNLOAD: u8 = 0x20;

/// Mask isolating the server command specifier bits (7..5) of a response byte.
pub const SDO_SERVER_COMMAND_MASK: u8 = 0xE0;

/// An initiate-download request frame, along with whether the transfer it
/// starts is segmented (more frames follow) or expedited (already complete).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct InitialDownloadRequest {
	/// The 8-byte frame to send as the `0x600 + node_id` request.
	pub frame: [u8; 8],

	/// Whether this is a segmented transfer (`false` means expedited: the
	/// whole payload was carried in this one frame).
	pub segmented: bool,
}

/// Build the initial `initiate download` request frame.
///
/// If `size` is `None`, exceeds 4 bytes, or `force_segment` is set, the
/// result is a segmented request carrying no payload (the data follows in
/// segment frames). Otherwise the result is an expedited request carrying
/// the whole payload directly.
pub fn build_request_download(index: u16, sub_index: u8, data: &[u8], size: Option<u32>, force_segment: bool) -> InitialDownloadRequest {
	let index_bytes = index.to_le_bytes();

	let segmented = match size {
		Some(size) => size > 4 || force_segment,
		None => true,
	};

	if segmented {
		let mut frame = [0u8; 8];
		frame[0] = SDO_REQUEST_DOWNLOAD | if size.is_some() { SDO_SIZE_SPECIFIED } else { 0 };
		frame[1] = index_bytes[0];
		frame[2] = index_bytes[1];
		frame[3] = sub_index;
		frame[4..8].copy_from_slice(&size.unwrap_or(0).to_le_bytes());
		InitialDownloadRequest { frame, segmented: true }
	} else {
		let size = size.expect("expedited path only reached when size is known");
		let mut frame = [0u8; 8];
		frame[0] = SDO_REQUEST_DOWNLOAD | SDO_EXPEDITED | SDO_SIZE_SPECIFIED | ((4 - size as u8) << 2);
		frame[1] = index_bytes[0];
		frame[2] = index_bytes[1];
		frame[3] = sub_index;
		frame[4..4 + size as usize].copy_from_slice(&data[..size as usize]);
		InitialDownloadRequest { frame, segmented: false }
	}
}

/// A single download-segment request frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SegmentDownloadFrame {
	/// The 8-byte segment frame.
	pub frame: [u8; 8],

	/// Number of payload bytes carried by this segment (at most 7).
	pub payload_len: u32,

	/// Whether this is the last segment of the transfer.
	pub last: bool,
}

/// Build the next download-segment frame for a transfer in progress.
///
/// `position` is the number of bytes already sent, `size` the total
/// transfer length, `toggle` the toggle bit to set on this segment (`0` or
/// [`SDO_TOGGLE_BIT`]), and `data` the full payload being transferred.
pub fn build_segment_download(position: u32, size: u32, toggle: u8, data: &[u8]) -> SegmentDownloadFrame {
	let remaining = size - position;
	let payload_len = remaining.min(7);
	let last = position + payload_len == size;

	let mut frame = [0u8; 8];
	frame[0] = SDO_REQUEST_SEGMENT_DOWNLOAD
		| toggle
		| ((7 - payload_len as u8) << 1)
		| if last { SDO_NO_MORE_DATA } else { 0 };

	let start = position as usize;
	let end = start + payload_len as usize;
	frame[1..1 + payload_len as usize].copy_from_slice(&data[start..end]);

	SegmentDownloadFrame { frame, payload_len, last }
}

/// Does `frame` look like a valid response to an initiate-download request
/// for `index`/`sub_index`?
pub fn initial_response_matches(frame: &[u8; 8], index: u16, sub_index: u8) -> bool {
	frame[0] & SDO_SERVER_COMMAND_MASK == SDO_RESPONSE_DOWNLOAD
		&& u16::from_le_bytes([frame[1], frame[2]]) == index
		&& frame[3] == sub_index
}

/// Does `frame` look like a valid response to a download-segment request
/// sent with `toggle_before_xor` as its toggle bit?
pub fn segment_response_matches(frame: &[u8; 8], toggle_before_xor: u8) -> bool {
	frame[0] & SDO_SERVER_COMMAND_MASK == SDO_RESPONSE_SEGMENT_DOWNLOAD
		&& frame[0] & SDO_TOGGLE_BIT == toggle_before_xor
}

#[cfg(test)]
mod test {
	use super::*;
	use assert2::assert;

	#[test]
	fn expedited_request_for_four_byte_payload() {
		let data = b"Line";
		let request = build_request_download(0x03E8, 0x02, data, Some(4), false);
		assert!(!request.segmented);
		assert!(request.frame == [0x23, 0xE8, 0x03, 0x02, 0x4C, 0x69, 0x6E, 0x65]);
	}

	#[test]
	fn segmented_request_for_long_payload() {
		let data = b"SizeLongerAsOneLine";
		let request = build_request_download(0x03E8, 0x02, data, Some(data.len() as u32), false);
		assert!(request.segmented);
		assert!(request.frame == [0x21, 0xE8, 0x03, 0x02, 0x13, 0x00, 0x00, 0x00]);
	}

	#[test]
	fn force_segment_overrides_small_size() {
		let data = b"Ab";
		let request = build_request_download(0x1000, 0x00, data, Some(2), true);
		assert!(request.segmented);
	}

	#[test]
	fn unknown_size_is_always_segmented() {
		let data = b"whatever";
		let request = build_request_download(0x1000, 0x00, data, None, false);
		assert!(request.segmented);
		assert!(request.frame[4..8] == [0, 0, 0, 0]);
	}

	#[test]
	fn segment_frames_match_cia301_example() {
		let data = b"SizeLongerAsOneLine";
		let size = data.len() as u32;

		let seg0 = build_segment_download(0, size, 0x00, data);
		assert!(seg0.frame == [0x00, 0x53, 0x69, 0x7A, 0x65, 0x4C, 0x6F, 0x6E]);
		assert!(seg0.payload_len == 7);
		assert!(!seg0.last);

		let seg1 = build_segment_download(7, size, SDO_TOGGLE_BIT, data);
		assert!(seg1.frame == [0x10, 0x67, 0x65, 0x72, 0x41, 0x73, 0x4F, 0x6E]);
		assert!(!seg1.last);

		let seg2 = build_segment_download(14, size, 0x00, data);
		assert!(seg2.frame == [0x05, 0x65, 0x4C, 0x69, 0x6E, 0x65, 0x00, 0x00]);
		assert!(seg2.payload_len == 5);
		assert!(seg2.last);
	}

	#[test]
	fn last_segment_flag_is_strict_not_off_by_one() {
		// Size=8, a 7-byte first segment followed by a genuine 1-byte last
		// segment. The first segment must NOT be flagged as last even though
		// `position + payload_len >= size - 1` would hold for it too.
		let data = [0u8; 8];
		let seg0 = build_segment_download(0, 8, 0, &data);
		assert!(seg0.payload_len == 7);
		assert!(!seg0.last);

		let seg1 = build_segment_download(7, 8, SDO_TOGGLE_BIT, &data);
		assert!(seg1.payload_len == 1);
		assert!(seg1.last);
	}

	#[test]
	fn response_predicates() {
		assert!(initial_response_matches(&[0x60, 0xE8, 0x03, 0x02, 0, 0, 0, 0], 0x03E8, 0x02));
		assert!(!initial_response_matches(&[0x00, 0xE8, 0x03, 0x02, 0, 0, 0, 0], 0x03E8, 0x02));
		assert!(!initial_response_matches(&[0x60, 0x00, 0x00, 0x00, 0, 0, 0, 0], 0x03E8, 0x02));
		assert!(!initial_response_matches(&[0x60, 0xE8, 0x03, 0x00, 0, 0, 0, 0], 0x03E8, 0x02));

		assert!(segment_response_matches(&[0x20, 0, 0, 0, 0, 0, 0, 0], 0x00));
		assert!(segment_response_matches(&[0x30, 0, 0, 0, 0, 0, 0, 0], SDO_TOGGLE_BIT));
		assert!(!segment_response_matches(&[0x30, 0, 0, 0, 0, 0, 0, 0], 0x00));
	}
}
