use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::operation::{OperationChain, OutputKind};
use crate::schema::Schema;
use crate::stream::ElementStream;
use crate::walk::Walk;
use async_trait::async_trait;

/// The result of running a chain.
#[derive(Debug)]
pub enum QueryOutput {
    Elements(ElementStream),
    Count(u64),
    Walks(Vec<Walk>),
    Void,
}

impl QueryOutput {
    pub fn kind(&self) -> OutputKind {
        match self {
            QueryOutput::Elements(_) => OutputKind::Elements,
            QueryOutput::Count(_) => OutputKind::Count,
            QueryOutput::Walks(_) => OutputKind::Walks,
            QueryOutput::Void => OutputKind::Void,
        }
    }

    /// An empty result of the given kind.
    pub fn empty(kind: OutputKind) -> QueryOutput {
        match kind {
            OutputKind::Elements => QueryOutput::Elements(ElementStream::empty()),
            OutputKind::Count => QueryOutput::Count(0),
            OutputKind::Walks => QueryOutput::Walks(Vec::new()),
            OutputKind::Void => QueryOutput::Void,
        }
    }

    pub fn into_elements(self) -> Result<ElementStream> {
        match self {
            QueryOutput::Elements(stream) => Ok(stream),
            other => Err(GraphError::Store(anyhow::anyhow!(
                "expected elements, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_count(self) -> Result<u64> {
        match self {
            QueryOutput::Count(count) => Ok(count),
            mut other => {
                let kind = other.kind();
                other.close()?;
                Err(GraphError::Store(anyhow::anyhow!("expected count, got {kind}")))
            }
        }
    }

    pub fn into_walks(self) -> Result<Vec<Walk>> {
        match self {
            QueryOutput::Walks(walks) => Ok(walks),
            mut other => {
                let kind = other.kind();
                other.close()?;
                Err(GraphError::Store(anyhow::anyhow!("expected walks, got {kind}")))
            }
        }
    }

    /// Releases a streamed result. Other kinds hold nothing to release.
    pub fn close(&mut self) -> Result<()> {
        match self {
            QueryOutput::Elements(stream) => stream.close(),
            _ => Ok(()),
        }
    }
}

/// Something that can run an operation chain: a backend store, or a
/// federation of them.
///
/// Implementations must be safe to call from many requests at once.
#[async_trait]
pub trait Store: Send + Sync {
    fn schema(&self) -> Schema;

    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<QueryOutput>;
}
