use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::warn;

use super::types::SaveReport;
use crate::error::SaveError;

pub type SaveResult = Result<SaveReport, SaveError>;

/// Handle to a save running in the background.
///
/// Await it (or call [`SaveHandle::wait`] outside a runtime) to get the
/// result. A failure nobody inspects is logged as a warning instead of
/// being dropped silently.
#[derive(Debug)]
pub struct SaveHandle {
    path: PathBuf,
    rx: Option<oneshot::Receiver<SaveResult>>,
}

impl SaveHandle {
    pub(crate) fn new(path: PathBuf, rx: oneshot::Receiver<SaveResult>) -> Self {
        SaveHandle { path, rx: Some(rx) }
    }

    /// Target path of the save
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block the current thread until the save finishes.
    ///
    /// Panics if called from within an async runtime; `.await` the handle there.
    pub fn wait(mut self) -> SaveResult {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or_else(|_| Err(aborted())),
            None => Err(already_taken()),
        }
    }

    /// The result if the save has finished, without blocking.
    /// Once a result has been returned the handle is spent.
    pub fn try_result(&mut self) -> Option<SaveResult> {
        let rx = self.rx.as_mut()?;
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(aborted()),
        };
        self.rx = None;
        Some(result)
    }
}

impl Future for SaveHandle {
    type Output = SaveResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = match self.rx.as_mut() {
            Some(rx) => Pin::new(rx).poll(cx),
            None => return Poll::Ready(Err(already_taken())),
        };

        match polled {
            Poll::Ready(result) => {
                self.rx = None;
                Poll::Ready(result.unwrap_or_else(|_| Err(aborted())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SaveHandle {
    fn drop(&mut self) {
        // A still-running task logs its own failure when it finds the handle gone.
        let Some(mut rx) = self.rx.take() else {
            return;
        };

        match rx.try_recv() {
            Ok(Err(err)) => {
                warn!(path = %self.path.display(), error = %err, "background save failed; result was never inspected");
            }
            Err(TryRecvError::Closed) => {
                warn!(path = %self.path.display(), "background save ended without a result; result was never inspected");
            }
            Ok(Ok(_)) | Err(TryRecvError::Empty) => {}
        }
    }
}

fn aborted() -> SaveError {
    SaveError::TaskAborted("the save task stopped before reporting, most likely a panic".to_string())
}

fn already_taken() -> SaveError {
    SaveError::TaskAborted("the result was already taken from this handle".to_string())
}
