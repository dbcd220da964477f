//! Lazy element streams with an explicit close contract.
//!
//! Store results are never drained by the executor on their own: they are
//! handed around as [`ElementStream`]s and pulled by whoever consumes the
//! final output. Dropping a stream does not release anything; callers close
//! it, and closing is idempotent.

use crate::element::Element;
use crate::error::Result;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

pub trait CloseableStream: Stream<Item = Result<Element>> + Send + Unpin {
    /// Releases whatever backs the stream. Reached at most once through
    /// [`ElementStream::close`].
    fn close(&mut self) -> Result<()>;
}

type CloseFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Stream over any in-memory iterator, with an optional callback run on close.
pub struct IterStream<I> {
    iter: Option<I>,
    on_close: Option<CloseFn>,
}

pub type VecStream = IterStream<std::vec::IntoIter<Element>>;

impl<I> IterStream<I>
where
    I: Iterator<Item = Element> + Send + Unpin,
{
    pub fn new(iter: I) -> Self {
        Self {
            iter: Some(iter),
            on_close: None,
        }
    }

    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.on_close = Some(Box::new(callback));
        self
    }
}

impl VecStream {
    pub fn from_vec(elements: Vec<Element>) -> Self {
        IterStream::new(elements.into_iter())
    }
}

impl<I> Stream for IterStream<I>
where
    I: Iterator<Item = Element> + Send + Unpin,
{
    type Item = Result<Element>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Poll::Ready(this.iter.as_mut().and_then(Iterator::next).map(Ok))
    }
}

impl<I> CloseableStream for IterStream<I>
where
    I: Iterator<Item = Element> + Send + Unpin,
{
    fn close(&mut self) -> Result<()> {
        self.iter = None;
        match self.on_close.take() {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }
}

/// The element output of an operation.
pub struct ElementStream {
    inner: Box<dyn CloseableStream>,
    closed: bool,
}

impl ElementStream {
    pub fn new(inner: impl CloseableStream + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            closed: false,
        }
    }

    pub fn from_vec(elements: Vec<Element>) -> Self {
        Self::new(VecStream::from_vec(elements))
    }

    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the underlying stream the first time; later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }

    /// Pulls everything, then closes. A failure to close after a complete
    /// read is logged rather than replacing the elements already read.
    pub async fn collect_all(mut self) -> Result<Vec<Element>> {
        let mut elements = Vec::new();
        while let Some(next) = self.next().await {
            match next {
                Ok(element) => elements.push(element),
                Err(err) => {
                    if let Err(close_err) = self.close() {
                        warn!(error = %close_err, "failed to close element stream after error");
                    }
                    return Err(err);
                }
            }
        }
        if let Err(close_err) = self.close() {
            warn!(error = %close_err, "failed to close drained element stream");
        }
        Ok(elements)
    }

    /// Lazily stops after `limit` elements, closing the source at that point.
    pub fn limit(self, limit: usize) -> ElementStream {
        ElementStream::new(LimitedStream {
            inner: self,
            remaining: limit,
        })
    }
}

impl Stream for ElementStream {
    type Item = Result<Element>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        Pin::new(&mut *this.inner).poll_next(cx)
    }
}

impl CloseableStream for ElementStream {
    fn close(&mut self) -> Result<()> {
        ElementStream::close(self)
    }
}

impl std::fmt::Debug for ElementStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementStream")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

struct LimitedStream {
    inner: ElementStream,
    remaining: usize,
}

impl Stream for LimitedStream {
    type Item = Result<Element>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            if let Err(err) = this.inner.close() {
                warn!(error = %err, "failed to close stream at result limit");
            }
            return Poll::Ready(None);
        }
        let next = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(_))) = &next {
            this.remaining -= 1;
        }
        next
    }
}

impl CloseableStream for LimitedStream {
    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Entity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entities(n: usize) -> Vec<Element> {
        (0..n)
            .map(|i| Entity::new("person", format!("v{i}")).into())
            .collect()
    }

    fn counted(n: usize, closes: Arc<AtomicUsize>) -> ElementStream {
        ElementStream::new(VecStream::from_vec(entities(n)).on_close(move || {
            closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    #[tokio::test]
    async fn close_runs_callback_exactly_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut stream = counted(3, closes.clone());

        assert!(stream.next().await.is_some());
        stream.close().unwrap();
        stream.close().unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn collect_all_drains_and_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let elements = counted(4, closes.clone()).collect_all().await.unwrap();
        assert_eq!(elements.len(), 4);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn limit_stops_early_and_closes_source() {
        let closes = Arc::new(AtomicUsize::new(0));
        let elements = counted(10, closes.clone()).limit(2).collect_all().await.unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
