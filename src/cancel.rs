use crate::error::{BundleError, Result};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one build.
///
/// Clones observe the same flag, so a token can be handed to a signal handler
/// or another thread while the pipeline keeps its own copy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stage-boundary check.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BundleError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Writer adapter that fails the next write once the token is cancelled,
/// which aborts an in-flight transfer.
pub struct CancellableWriter<'a, W: Write> {
    inner: W,
    token: &'a CancelToken,
    written: u64,
}

impl<'a, W: Write> CancellableWriter<'a, W> {
    pub fn new(inner: W, token: &'a CancelToken) -> Self {
        Self {
            inner,
            token,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CancellableWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::other("transfer cancelled"));
        }
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
