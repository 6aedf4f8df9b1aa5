//! Render completion signal
//!
//! Every `set_state` call returns a [`RenderCompletion`]. It resolves once
//! the render that will show the change has finished, or immediately when
//! there is nothing to render.

use futures::channel::oneshot;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{RenderError, Result};

/// How a mutation call was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A render containing the change ran to completion
    Rendered,
    /// The call changed nothing; no render was needed
    Unchanged,
    /// The instance is inactive; the change will be rendered after activation
    Deferred,
}

pub(crate) type Waiter = oneshot::Sender<Result<RenderStatus>>;

enum Inner {
    Ready(Result<RenderStatus>),
    Waiting(oneshot::Receiver<Result<RenderStatus>>),
    Done,
}

/// Resolves when the render triggered by a mutation call has completed
pub struct RenderCompletion {
    inner: Inner,
}

impl RenderCompletion {
    pub(crate) fn ready(result: Result<RenderStatus>) -> Self {
        Self {
            inner: Inner::Ready(result),
        }
    }

    pub(crate) fn waiting() -> (Self, Waiter) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: Inner::Waiting(rx),
            },
            tx,
        )
    }

    /// Take the result if it is already available, without an executor
    ///
    /// Returns `None` while the render is still pending and after the result
    /// has been taken.
    pub fn try_take(&mut self) -> Option<Result<RenderStatus>> {
        match std::mem::replace(&mut self.inner, Inner::Done) {
            Inner::Ready(result) => Some(result),
            Inner::Waiting(mut rx) => match rx.try_recv() {
                Ok(Some(result)) => Some(result),
                Ok(None) => {
                    self.inner = Inner::Waiting(rx);
                    None
                }
                Err(oneshot::Canceled) => Some(Err(RenderError::Dropped)),
            },
            Inner::Done => None,
        }
    }

    /// Whether the result is known without waiting
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, Inner::Ready(_))
    }
}

impl Future for RenderCompletion {
    type Output = Result<RenderStatus>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = match std::mem::replace(&mut this.inner, Inner::Done) {
            Inner::Ready(result) => result,
            Inner::Waiting(mut rx) => match rx.poll_unpin(cx) {
                Poll::Pending => {
                    this.inner = Inner::Waiting(rx);
                    return Poll::Pending;
                }
                Poll::Ready(Ok(result)) => result,
                Poll::Ready(Err(oneshot::Canceled)) => Err(RenderError::Dropped),
            },
            Inner::Done => panic!("RenderCompletion polled after completion"),
        };
        Poll::Ready(result)
    }
}

impl std::fmt::Debug for RenderCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.inner {
            Inner::Ready(result) => format!("Ready({result:?})"),
            Inner::Waiting(_) => "Waiting".to_owned(),
            Inner::Done => "Done".to_owned(),
        };
        f.debug_struct("RenderCompletion")
            .field("state", &state)
            .finish()
    }
}
