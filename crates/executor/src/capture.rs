//! Incrementally bounded capture of child output.
//!
//! Bytes past the limit are counted and discarded as they arrive, so memory stays at
//! `limit` no matter how much a runaway process writes.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Default)]
pub(crate) struct BoundedBuffer {
    data: Vec<u8>,
    limit: usize,
    dropped: u64,
}

impl BoundedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit.min(CHUNK_SIZE)),
            limit,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        let keep = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..keep]);
        self.dropped += (chunk.len() - keep) as u64;
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    /// Decode as UTF-8 (lossy) and append the truncation marker if anything was dropped.
    pub fn finish(mut self) -> (String, bool) {
        if !self.is_truncated() {
            return (String::from_utf8_lossy(&self.data).into_owned(), false);
        }

        // Don't end on half a character.
        if let Err(e) = std::str::from_utf8(&self.data) {
            if e.error_len().is_none() {
                let cut = e.valid_up_to();
                self.dropped += (self.data.len() - cut) as u64;
                self.data.truncate(cut);
            }
        }
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        text.push_str(&format!("\n[output truncated: {} bytes omitted]", self.dropped));
        (text, true)
    }
}

pub(crate) type SharedBuffer = Arc<Mutex<BoundedBuffer>>;

/// Spawn a task that reads `reader` to EOF into a shared bounded buffer. The buffer stays
/// readable even if the task is aborted.
pub(crate) fn spawn_reader<R>(reader: Option<R>, limit: usize) -> (SharedBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(BoundedBuffer::new(limit)));
    let sink = Arc::clone(&buffer);
    let handle = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    guard.push(&chunk[..n]);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Output stream read failed");
                    break;
                }
            }
        }
    });
    (buffer, handle)
}

/// Take the captured contents out of a shared buffer.
pub(crate) fn take(buffer: &SharedBuffer) -> (String, bool) {
    let mut guard = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *guard).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_is_untouched() {
        let mut buf = BoundedBuffer::new(16);
        buf.push(b"hello");
        buf.push(b" world");
        assert_eq!(buf.finish(), ("hello world".to_string(), false));
    }

    #[test]
    fn test_overflow_is_dropped_incrementally() {
        let mut buf = BoundedBuffer::new(4);
        buf.push(b"abc");
        buf.push(b"defgh");
        buf.push(b"ijk");
        assert_eq!(buf.data.len(), 4);
        let (text, truncated) = buf.finish();
        assert!(truncated);
        assert_eq!(text, "abcd\n[output truncated: 7 bytes omitted]");
    }

    #[test]
    fn test_truncation_does_not_split_characters() {
        let mut buf = BoundedBuffer::new(4);
        // "aé" is 3 bytes, "é" again splits at the limit
        buf.push("aéé".as_bytes());
        let (text, _) = buf.finish();
        assert!(text.starts_with("aé\n"));
        assert!(text.ends_with("2 bytes omitted]"));
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut buf = BoundedBuffer::new(0);
        buf.push(b"xyz");
        let (text, truncated) = buf.finish();
        assert!(truncated);
        assert!(text.starts_with("\n[output truncated: 3 bytes omitted]"));
    }

    #[tokio::test]
    async fn test_reader_task_caps_memory() {
        let data = std::io::Cursor::new(vec![b'x'; 100_000]);
        let (buffer, handle) = spawn_reader(Some(data), 1000);
        handle.await.ok();
        let (text, truncated) = take(&buffer);
        assert!(truncated);
        assert!(text.starts_with(&"x".repeat(1000)));
        assert!(text.contains("99000 bytes omitted"));
    }
}
