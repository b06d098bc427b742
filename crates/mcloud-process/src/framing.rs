//! Log consumers (not the process runner) need to recognize and drop the
//! container engine's multiplexed-stream frame headers: an 8-byte chunk
//! whose eighth byte is not a newline.

/// True when `chunk` is an 8-byte stream-multiplexing header rather than
/// log content, and should be dropped by a log follower before the chunk
/// reaches a ticket's progress stream.
pub fn is_stream_header_frame(chunk: &[u8]) -> bool {
    chunk.len() == 8 && chunk[7] != b'\n'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_byte_frame_without_trailing_newline_is_a_header() {
        assert!(is_stream_header_frame(&[1, 0, 0, 0, 0, 0, 0, 42]));
    }

    #[test]
    fn eight_byte_chunk_ending_in_newline_is_content() {
        assert!(!is_stream_header_frame(b"abcdefg\n"));
    }

    #[test]
    fn chunks_of_other_lengths_are_never_headers() {
        assert!(!is_stream_header_frame(b"short"));
        assert!(!is_stream_header_frame(b"a much longer line of output\n"));
        assert!(!is_stream_header_frame(b""));
    }
}
