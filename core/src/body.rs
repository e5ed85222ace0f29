//! Streaming request bodies.
//!
//! # Design
//! A `BodyStream` is read on a blocking worker so slow sources never stall
//! the event loop. Every chunk is handed to the transport through a
//! `BodyWriter`; the write resolves only once the transport has put the
//! chunk on the wire, and the pump waits for that before it reads again.
//! A zero-length chunk marks the end of the body.

use std::io::{self, Read};

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{SessionError, TransportError};
use crate::http::BodyStream;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// One chunk on its way to the transport.
#[derive(Debug)]
pub struct BodyWrite {
    pub chunk: Bytes,
    ack: oneshot::Sender<io::Result<()>>,
}

impl BodyWrite {
    /// Zero-length chunks terminate the body.
    pub fn is_terminal(&self) -> bool {
        self.chunk.is_empty()
    }

    /// Report the outcome of writing this chunk back to the pump.
    pub fn complete(self, result: io::Result<()>) {
        // The pump may already be gone after a failure; nothing to tell it.
        let _ = self.ack.send(result);
    }
}

/// Producer half of the outbound body channel.
#[derive(Debug, Clone)]
pub struct BodyWriter {
    tx: mpsc::Sender<BodyWrite>,
}

impl BodyWriter {
    /// A writer and the receiver the transport drains. Holds one chunk at a
    /// time.
    pub fn channel() -> (BodyWriter, mpsc::Receiver<BodyWrite>) {
        let (tx, rx) = mpsc::channel(1);
        (BodyWriter { tx }, rx)
    }

    /// Hand `chunk` to the transport; resolves once it has been written.
    pub async fn write(&self, chunk: Bytes) -> Result<(), SessionError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(BodyWrite { chunk, ack })
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        done.await
            .map_err(|_| TransportError::ConnectionClosed)?
            .map_err(TransportError::Io)?;
        Ok(())
    }
}

/// Start pumping `stream` into `writer` on a blocking worker.
///
/// Must be called from within a tokio runtime. The handle resolves to the
/// number of body bytes written.
pub fn spawn_pump(
    stream: BodyStream,
    writer: BodyWriter,
    chunk_size: usize,
) -> JoinHandle<Result<u64, SessionError>> {
    let runtime = Handle::current();
    tokio::task::spawn_blocking(move || pump(&runtime, &stream, &writer, chunk_size.max(1)))
}

fn pump(
    runtime: &Handle,
    stream: &BodyStream,
    writer: &BodyWriter,
    chunk_size: usize,
) -> Result<u64, SessionError> {
    let mut reader = stream.open().map_err(SessionError::StreamOpenFailed)?;
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SessionError::StreamReadFailed(e)),
        };
        runtime.block_on(writer.write(Bytes::copy_from_slice(&buf[..n])))?;
        total += n as u64;
    }

    runtime.block_on(writer.write(Bytes::new()))?;
    tracing::debug!(bytes = total, "request body stream exhausted");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Reader that counts how many times it has been read from.
    struct CountingReader {
        inner: io::Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pumps_bounded_chunks_then_terminator() {
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let (writer, mut rx) = BodyWriter::channel();
        let handle = spawn_pump(BodyStream::from_bytes(data.clone()), writer, 1024);

        let mut received = Vec::new();
        let mut sizes = Vec::new();
        while let Some(write) = rx.recv().await {
            let terminal = write.is_terminal();
            sizes.push(write.chunk.len());
            received.extend_from_slice(&write.chunk);
            write.complete(Ok(()));
            if terminal {
                break;
            }
        }

        assert_eq!(handle.await.unwrap().unwrap(), 2500);
        assert_eq!(received, data);
        assert_eq!(sizes, [1024, 1024, 452, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waits_for_each_write_before_reading_more() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let stream = BodyStream::new(move || {
            Ok(Box::new(CountingReader {
                inner: io::Cursor::new(vec![7u8; 40]),
                reads: counter.clone(),
            }) as Box<dyn Read + Send>)
        });
        let (writer, mut rx) = BodyWriter::channel();
        let handle = spawn_pump(stream, writer, 10);

        let first = rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Nothing past the first chunk is read while its write is pending.
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        first.complete(Ok(()));

        while let Some(write) = rx.recv().await {
            let terminal = write.is_terminal();
            write.complete(Ok(()));
            if terminal {
                break;
            }
        }
        assert_eq!(handle.await.unwrap().unwrap(), 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_failure_fails_the_pump() {
        let stream = BodyStream::new(|| Err(io::Error::new(io::ErrorKind::NotFound, "gone")));
        let (writer, _rx) = BodyWriter::channel();
        let err = spawn_pump(stream, writer, 16).await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::StreamOpenFailed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_failure_fails_the_pump() {
        let stream = BodyStream::new(|| Ok(Box::new(FailingReader) as Box<dyn Read + Send>));
        let (writer, _rx) = BodyWriter::channel();
        let err = spawn_pump(stream, writer, 16).await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::StreamReadFailed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_write_stops_the_pump() {
        let (writer, mut rx) = BodyWriter::channel();
        let handle = spawn_pump(BodyStream::from_bytes(vec![1u8; 64]), writer, 8);
        let first = rx.recv().await.unwrap();
        first.complete(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reset")));
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Io(_))));
    }
}
