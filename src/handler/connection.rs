//! Line transport shared by the concrete handlers.
//!
//! A [`LineConnection`] takes the two halves of an opened stream. The write
//! half is kept behind a mutex for [`LineConnection::send`]; the read half
//! moves into a background task that decodes lines and hands them to the
//! handler's listeners.

use std::sync::{Mutex as StdMutex, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::listener::Listeners;
use crate::protocol::{LineDecoder, encode_line};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Read task plus write half of one open stream.
#[derive(Default)]
pub struct LineConnection {
    writer: Mutex<Option<Writer>>,
    read_task: StdMutex<Option<JoinHandle<()>>>,
}

impl LineConnection {
    /// Creates a detached connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes over an opened stream and starts the read task.
    ///
    /// Any previously attached stream is dropped first.
    pub async fn attach<R, W>(&self, reader: R, writer: W, listeners: Listeners)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.detach().await;

        let read_task = tokio::spawn(async move {
            if let Err(e) = run_read_loop(reader, LineDecoder::new(), &listeners).await {
                tracing::error!("read loop error: {}", e);
                listeners.dispatch_error(&e);
            }
        });

        *self.writer.lock().await = Some(Box::new(writer));
        *self
            .read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(read_task);
    }

    /// Stops the read task and drops the stream.
    ///
    /// Returns false if nothing was attached.
    pub async fn detach(&self) -> bool {
        let task = self
            .read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("shutdown of write half failed: {}", e);
                }
                true
            }
            None => false,
        }
    }

    /// Sends one command line.
    pub async fn send(&self, command: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!("sending {:?}", command);

        let line = encode_line(command);
        writer
            .write_all(&line)
            .await
            .map_err(|e| Error::communication(format!("failed to send {command:?}: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::communication(format!("failed to flush {command:?}: {e}")))?;

        Ok(())
    }

    /// Returns true while a stream is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for LineConnection {
    fn drop(&mut self) {
        if let Some(task) = self
            .read_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Reads from `reader` until it fails, delivering each decoded line.
///
/// End of stream is reported as a communication error.
pub async fn run_read_loop<R>(
    mut reader: R,
    mut decoder: LineDecoder,
    listeners: &Listeners,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 256];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("stream closed by device");
                return Err(Error::communication("stream closed by device"));
            }
            Ok(n) => n,
            Err(e) => return Err(Error::communication(format!("read failed: {e}"))),
        };

        tracing::trace!("received {} bytes", n);
        decoder.feed(&buf[..n]);

        loop {
            match decoder.decode() {
                Ok(Some(line)) => {
                    tracing::trace!("received line {:?}", line);
                    listeners.dispatch_line(&line);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("line decode error: {}", e);
                    listeners.dispatch_error(&Error::Line(e));
                }
            }
        }
    }
}
