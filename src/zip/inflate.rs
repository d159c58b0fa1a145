//! Raw deflate decompression of a single entry.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};

/// Output is pulled from the decompressor in chunks of this size.
const CHUNK_SIZE: usize = 32 * 1024;

/// Decompress a raw deflate stream (no zlib or gzip envelope) into one buffer.
///
/// Output chunks are appended in order until the stream reports its end; the
/// task yields to the runtime between chunks. Input that runs out before the
/// end of the deflate stream is an error, so a partial buffer is never
/// returned.
///
/// # Arguments
///
/// * `entry` - Name of the entry, used in errors
/// * `input` - The compressed bytes
/// * `size_hint` - Expected decompressed size, used to pre-allocate
pub async fn inflate(entry: &str, input: &[u8], size_hint: usize) -> Result<Vec<u8>> {
    let mut decompress = Decompress::new(false);
    let mut output = Vec::with_capacity(size_hint);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut consumed = 0usize;

    loop {
        let in_before = decompress.total_in();
        let out_before = decompress.total_out();

        let status = decompress
            .decompress(&input[consumed..], &mut chunk, FlushDecompress::None)
            .map_err(|e| Error::Decompression {
                entry: entry.to_string(),
                reason: e.to_string(),
            })?;

        let read = (decompress.total_in() - in_before) as usize;
        let written = (decompress.total_out() - out_before) as usize;
        consumed += read;
        output.extend_from_slice(&chunk[..written]);

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError if read == 0 && written == 0 => {
                return Err(Error::Decompression {
                    entry: entry.to_string(),
                    reason: format!("deflate stream truncated after {consumed} bytes"),
                });
            }
            Status::Ok | Status::BufError => {}
        }

        tokio::task::yield_now().await;
    }

    if consumed < input.len() {
        tracing::debug!(
            entry,
            trailing = input.len() - consumed,
            "bytes after end of deflate stream"
        );
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn round_trips_multi_chunk_payload() {
        let payload: Vec<u8> = (0..200_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let compressed = deflate(&payload);

        let out = inflate("big.bin", &compressed, 0).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn empty_payload() {
        let compressed = deflate(b"");
        assert!(inflate("empty", &compressed, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncated_stream_fails() {
        let payload = b"<root>some text that compresses</root>".repeat(50);
        let compressed = deflate(&payload);

        let err = inflate("a.xml", &compressed[..compressed.len() / 2], payload.len())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decompression { ref entry, .. } if entry == "a.xml"));
    }

    #[tokio::test]
    async fn garbage_fails() {
        let err = inflate("bad.xml", &[0xFF; 64], 0).await.unwrap_err();
        assert!(matches!(err, Error::Decompression { .. }));
    }

    #[tokio::test]
    async fn empty_input_fails() {
        assert!(inflate("none.xml", &[], 0).await.is_err());
    }
}
