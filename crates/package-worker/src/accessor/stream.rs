//! Byte streams between accessor handles
//!
//! A source handle exposes a [`PackageReadStream`], a target handle a
//! [`PutPackageHandler`]. [`pipe_package`] joins the two into a cancelable
//! copy; cancelling it trips both sides' tokens so the backends can abort
//! their own I/O (close sockets, drop partial files).

use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancelable::CancelableTask;
use crate::error::WorkerError;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Readable side of a package.
pub struct PackageReadStream {
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    /// Total size when the backend knows it up front.
    pub size: Option<u64>,
    cancel: CancellationToken,
}

impl PackageReadStream {
    pub fn new(reader: impl AsyncRead + Send + 'static, size: Option<u64>) -> Self {
        Self {
            reader: Box::pin(reader),
            size,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the stream. Backends watch [`Self::cancel_token`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Writable side of a package.
pub struct PutPackageHandler {
    pub writer: Pin<Box<dyn AsyncWrite + Send>>,
    cancel: CancellationToken,
}

impl PutPackageHandler {
    pub fn new(writer: impl AsyncWrite + Send + 'static) -> Self {
        Self {
            writer: Box::pin(writer),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Copy `read` into `put`, calling `on_progress(copied, total)` after every
/// chunk. Resolves to the number of bytes copied.
pub fn pipe_package<P>(
    mut read: PackageReadStream,
    mut put: PutPackageHandler,
    on_progress: P,
) -> CancelableTask<u64>
where
    P: Fn(u64, Option<u64>) + Send + 'static,
{
    CancelableTask::new(move |scope| {
        let read_token = read.cancel_token();
        let put_token = put.cancel_token();
        let registered = scope.on_cancel(move || {
            read_token.cancel();
            put_token.cancel();
        });

        async move {
            registered?;
            let total = read.size;
            let mut copied: u64 = 0;
            let mut buf = vec![0u8; COPY_CHUNK_SIZE];
            loop {
                let n = tokio::select! {
                    _ = scope.cancelled() => {
                        debug!(copied, "Package pipe cancelled");
                        return Err(WorkerError::Cancelled("pipe package".into()));
                    }
                    n = read.reader.read(&mut buf) => n?,
                };
                if n == 0 {
                    break;
                }
                tokio::select! {
                    _ = scope.cancelled() => {
                        debug!(copied, "Package pipe cancelled");
                        return Err(WorkerError::Cancelled("pipe package".into()));
                    }
                    written = put.writer.write_all(&buf[..n]) => written?,
                }
                copied += n as u64;
                on_progress(copied, total);
            }
            put.writer.flush().await?;
            put.writer.shutdown().await?;
            Ok(copied)
        }
    })
}
