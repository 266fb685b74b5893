//! Network retrieval boundary.

use std::io::Read;
use std::time::Duration;

use log::warn;

use crate::config::RegistryConfig;
use crate::error::FetchError;

const USER_AGENT: &str = "dig/0.1.0 (https://github.com/polymonster/dig)";
/// Upper bound on what a `Content-Length` header may reserve up front.
const MAX_PREALLOC_BYTES: usize = 8 * 1024 * 1024;

/// Retrieves the full body of a URL. Failures are reported, never retried here.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher over a shared `ureq` agent.
pub struct UreqFetcher {
    http_client: ureq::Agent,
    min_chunk_bytes: usize,
}

impl UreqFetcher {
    pub fn new(registry: &RegistryConfig, min_chunk_bytes: usize) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(registry.http_connect_timeout_secs))
            .timeout_read(Duration::from_secs(registry.http_read_timeout_secs))
            .redirects(8)
            .user_agent(USER_AGENT)
            .build();
        Self {
            http_client,
            min_chunk_bytes: min_chunk_bytes.max(1),
        }
    }
}

impl Fetcher for UreqFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http_client
            .get(url)
            .call()
            .map_err(|error| FetchError::Request {
                url: url.to_string(),
                message: error.to_string(),
            })?;
        let expected_len = response
            .header("Content-Length")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        let body = read_into_buffer(response.into_reader(), expected_len, self.min_chunk_bytes)
            .map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            })?;
        if body.is_empty() {
            warn!("Fetch: empty body for {}", url);
            return Err(FetchError::Empty(url.to_string()));
        }
        Ok(body)
    }
}

/// Drains `reader` into a buffer that grows at least `min_chunk` bytes (or
/// doubles) whenever it fills, avoiding many small reallocations.
///
/// `size_hint` comes from the server and is only a hint: the up-front
/// reservation never exceeds `MAX_PREALLOC_BYTES`.
pub fn read_into_buffer<R: Read>(
    mut reader: R,
    size_hint: usize,
    min_chunk: usize,
) -> std::io::Result<Vec<u8>> {
    let min_chunk = min_chunk.clamp(1, MAX_PREALLOC_BYTES);
    let mut buffer: Vec<u8> =
        Vec::with_capacity(size_hint.min(MAX_PREALLOC_BYTES).max(min_chunk));
    let mut filled = 0usize;
    loop {
        if filled == buffer.len() {
            let grow_by = buffer
                .len()
                .max(min_chunk)
                .max(buffer.capacity() - buffer.len());
            buffer.resize(buffer.len() + grow_by, 0);
        }
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    buffer.truncate(filled);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Yields at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        position: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.data.len() - self.position;
            let count = remaining.min(self.step).min(out.len());
            out[..count].copy_from_slice(&self.data[self.position..self.position + count]);
            self.position += count;
            Ok(count)
        }
    }

    #[test]
    fn test_read_into_buffer_collects_everything() {
        let data: Vec<u8> = (0..5000u32).map(|value| (value % 251) as u8).collect();
        let reader = Trickle {
            data: data.clone(),
            position: 0,
            step: 333,
        };
        let body = read_into_buffer(reader, 0, 1024).expect("read should succeed");
        assert_eq!(body, data);
    }

    #[test]
    fn test_read_into_buffer_handles_empty_body() {
        let body = read_into_buffer(Cursor::new(Vec::<u8>::new()), 0, 1024)
            .expect("read should succeed");
        assert!(body.is_empty());
    }

    #[test]
    fn test_read_into_buffer_uses_size_hint_capacity() {
        let data = vec![7u8; 4096];
        let body = read_into_buffer(Cursor::new(data.clone()), 4096, 16)
            .expect("read should succeed");
        assert_eq!(body, data);
    }

    #[test]
    fn test_read_into_buffer_ignores_absurd_content_length() {
        let body = read_into_buffer(Cursor::new(b"abc".to_vec()), usize::MAX, 1024)
            .expect("read should succeed");
        assert_eq!(body, b"abc");

        let body = read_into_buffer(Cursor::new(b"abc".to_vec()), 1_000_000_000_000, 1024)
            .expect("read should succeed");
        assert_eq!(body, b"abc");
    }

    #[test]
    fn test_read_into_buffer_caps_oversized_min_chunk() {
        let body = read_into_buffer(Cursor::new(b"xyz".to_vec()), 0, usize::MAX)
            .expect("read should succeed");
        assert_eq!(body, b"xyz");
    }
}
