use super::config::FailurePolicy;
use super::report::ReportHandle;
use crate::element::Element;
use crate::error::{GraphError, Result};
use crate::stream::{CloseableStream, ElementStream};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::warn;

struct Part {
    graph_id: String,
    stream: Option<ElementStream>,
}

/// Lazy concatenation of delegate streams, in delegate order.
///
/// A part is closed as soon as it is exhausted; closing the merged stream
/// closes whatever parts are still open. Cancellation is checked on every
/// poll, so a consumer parked on a slow delegate only notices it on the next
/// wake-up.
pub struct ChainedStream {
    parts: Vec<Part>,
    current: usize,
    policy: FailurePolicy,
    report: ReportHandle,
    cancellation: CancellationToken,
    finished: bool,
}

impl ChainedStream {
    pub fn new(
        parts: Vec<(String, ElementStream)>,
        policy: FailurePolicy,
        report: ReportHandle,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            parts: parts
                .into_iter()
                .map(|(graph_id, stream)| Part {
                    graph_id,
                    stream: Some(stream),
                })
                .collect(),
            current: 0,
            policy,
            report,
            cancellation,
            finished: false,
        }
    }

    /// Closes one part if it is still open, returning a description of the
    /// failure if closing failed.
    fn release(&mut self, index: usize) -> Option<String> {
        let part = self.parts.get_mut(index)?;
        let mut stream = part.stream.take()?;
        match stream.close() {
            Ok(()) => None,
            Err(err) => {
                warn!(graph_id = %part.graph_id, error = %err, "failed to close delegate stream");
                self.report.record_release_failure(&part.graph_id, err.to_string());
                Some(format!("{}: {err}", part.graph_id))
            }
        }
    }

    fn release_all(&mut self) -> Vec<String> {
        (0..self.parts.len())
            .filter_map(|index| self.release(index))
            .collect()
    }

    /// Ends the merge mid-iteration. Release failures are already in the
    /// report and the caller is handed the error that ended the merge.
    fn finish(&mut self) {
        self.finished = true;
        let _failures = self.release_all();
    }
}

impl Stream for ChainedStream {
    type Item = Result<Element>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.cancellation.is_cancelled() {
            this.finish();
            return Poll::Ready(Some(Err(GraphError::Cancelled)));
        }

        loop {
            let Some(part) = this.parts.get_mut(this.current) else {
                this.finished = true;
                return Poll::Ready(None);
            };
            let polled = match part.stream.as_mut() {
                Some(stream) => Pin::new(stream).poll_next(cx),
                None => Poll::Ready(None),
            };

            match polled {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(element))) => return Poll::Ready(Some(Ok(element))),
                Poll::Ready(None) => {
                    this.release(this.current);
                    this.current += 1;
                }
                Poll::Ready(Some(Err(err))) => {
                    let graph_id = this.parts[this.current].graph_id.clone();
                    match this.policy {
                        FailurePolicy::FailFast => {
                            this.finish();
                            return Poll::Ready(Some(Err(GraphError::delegate(graph_id, err))));
                        }
                        FailurePolicy::SkipOnError => {
                            warn!(graph_id = %graph_id, error = %err, "skipping rest of failed delegate stream");
                            this.report.record_skipped(&graph_id, err.to_string());
                            this.release(this.current);
                            this.current += 1;
                        }
                    }
                }
            }
        }
    }
}

impl CloseableStream for ChainedStream {
    fn close(&mut self) -> Result<()> {
        self.finished = true;
        let failures = self.release_all();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(GraphError::ResourceRelease { failures })
        }
    }
}
