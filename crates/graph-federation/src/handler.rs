//! Op-by-op execution of a flattened chain.
//!
//! Stores only have to know how to answer source operations (`GetElements`,
//! `GetAllElements`); everything that works on the previous output (limits,
//! counts, walks) is handled here the same way for every store.

use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::operation::{Operation, OperationChain};
use crate::store::QueryOutput;
use crate::stream::ElementStream;
use crate::walk;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[async_trait]
pub trait ElementSource: Send + Sync {
    /// Answers one source operation with a lazy stream.
    async fn fetch(&self, operation: Operation, ctx: &Context) -> Result<ElementStream>;
}

/// Runs `operations` in order, starting from `input` (the output of whatever
/// ran before them, if anything).
pub async fn run_chain<S>(
    source: &S,
    operations: Vec<Operation>,
    input: Option<QueryOutput>,
    ctx: &Context,
) -> Result<QueryOutput>
where
    S: ElementSource + ?Sized,
{
    let operations = OperationChain::new(operations).flatten();
    let mut current = input;

    for operation in operations {
        if ctx.is_cancelled() {
            discard(current.take());
            return Err(GraphError::Cancelled);
        }
        debug!(operation = operation.name(), job_id = %ctx.job_id(), "running operation");

        let output = match operation {
            Operation::GetElements(mut op) => {
                let previous = current.take();
                if op.seeds.is_empty() {
                    op.seeds = seeds_from(previous, "GetElements").await?;
                } else {
                    discard(previous);
                }
                QueryOutput::Elements(source.fetch(Operation::GetElements(op), ctx).await?)
            }
            Operation::GetAllElements(op) => {
                discard(current.take());
                QueryOutput::Elements(source.fetch(Operation::GetAllElements(op), ctx).await?)
            }
            Operation::GetWalks(mut op) => {
                let previous = current.take();
                if op.seeds.is_empty() {
                    op.seeds = seeds_from(previous, "GetWalks").await?;
                } else {
                    discard(previous);
                }
                QueryOutput::Walks(walk::get_walks(source, op, ctx).await?)
            }
            Operation::Limit(limit) => {
                let input = elements_input(current.take(), "Limit")?;
                QueryOutput::Elements(input.limit(limit.result_limit))
            }
            Operation::Count => {
                let input = elements_input(current.take(), "Count")?;
                QueryOutput::Count(count_elements(input).await?)
            }
            Operation::ToVec => {
                let input = elements_input(current.take(), "ToVec")?;
                QueryOutput::Elements(ElementStream::from_vec(input.collect_all().await?))
            }
            Operation::Chain(_) => {
                discard(current.take());
                return Err(GraphError::UnsupportedOperation {
                    operation: "OperationChain",
                    reason: "nested chains are flattened before execution".to_string(),
                });
            }
        };
        current = Some(output);
    }

    Ok(current.unwrap_or(QueryOutput::Void))
}

/// Distinct seed vertices taken from the previous output, in first-seen order.
async fn seeds_from(previous: Option<QueryOutput>, operation: &'static str) -> Result<Vec<String>> {
    let stream = match previous {
        None | Some(QueryOutput::Void) => return Ok(Vec::new()),
        Some(QueryOutput::Elements(stream)) => stream,
        Some(other) => {
            return Err(GraphError::UnsupportedOperation {
                operation,
                reason: format!("cannot take seeds from {} output", other.kind()),
            })
        }
    };
    let mut seen = BTreeSet::new();
    let seeds = stream
        .collect_all()
        .await?
        .iter()
        .map(|element| element.seed_vertex().to_string())
        .filter(|vertex| seen.insert(vertex.clone()))
        .collect();
    Ok(seeds)
}

fn elements_input(previous: Option<QueryOutput>, operation: &'static str) -> Result<ElementStream> {
    match previous {
        Some(QueryOutput::Elements(stream)) => Ok(stream),
        other => {
            let kind = other.as_ref().map(QueryOutput::kind);
            discard(other);
            Err(GraphError::UnsupportedOperation {
                operation,
                reason: match kind {
                    Some(kind) => format!("expects elements as input, got {kind}"),
                    None => "expects elements as input, got nothing".to_string(),
                },
            })
        }
    }
}

async fn count_elements(mut stream: ElementStream) -> Result<u64> {
    let mut count = 0u64;
    while let Some(next) = stream.next().await {
        if let Err(err) = next {
            if let Err(close_err) = stream.close() {
                warn!(error = %close_err, "failed to close stream after count error");
            }
            return Err(err);
        }
        count += 1;
    }
    if let Err(close_err) = stream.close() {
        warn!(error = %close_err, "failed to close counted stream");
    }
    Ok(count)
}

/// Releases an output nobody is going to read.
pub(crate) fn discard(output: Option<QueryOutput>) {
    if let Some(mut output) = output {
        if let Err(err) = output.close() {
            warn!(error = %err, "failed to release discarded output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Edge, Element, Entity};
    use crate::operation::{GetAllElements, GetElements, Limit};
    use std::sync::Mutex;

    /// Serves a fixed element list and remembers the seeds it was asked for.
    struct Fixed {
        elements: Vec<Element>,
        asked: Mutex<Vec<Vec<String>>>,
    }

    impl Fixed {
        fn new(elements: Vec<Element>) -> Self {
            Self {
                elements,
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ElementSource for Fixed {
        async fn fetch(&self, operation: Operation, _ctx: &Context) -> Result<ElementStream> {
            let matching = match operation {
                Operation::GetElements(op) => {
                    self.asked.lock().unwrap().push(op.seeds.clone());
                    self.elements
                        .iter()
                        .filter(|element| {
                            op.seeds
                                .iter()
                                .any(|seed| element.matches_seed(seed, op.direction))
                        })
                        .cloned()
                        .collect()
                }
                _ => self.elements.clone(),
            };
            Ok(ElementStream::from_vec(matching))
        }
    }

    fn fixture() -> Fixed {
        Fixed::new(vec![
            Element::from(Edge::new("knows", "a", "b")),
            Element::from(Edge::new("knows", "c", "b")),
            Element::from(Entity::new("person", "b")),
            Element::from(Entity::new("person", "d")),
        ])
    }

    #[tokio::test]
    async fn seeds_come_from_previous_output_once_each() {
        let source = fixture();
        let operations = vec![
            Operation::from(GetElements::new().seeds(["a", "c"])),
            Operation::from(GetElements::new()),
        ];

        let output = run_chain(&source, operations, None, &Context::default())
            .await
            .unwrap();

        let asked = source.asked.lock().unwrap().clone();
        assert_eq!(asked, vec![vec!["a".to_string(), "c".to_string()], vec!["b".to_string()]]);
        let elements = output.into_elements().unwrap().collect_all().await.unwrap();
        assert!(elements.iter().any(|element| element.is_entity()));
    }

    #[tokio::test]
    async fn limit_then_count() {
        let source = fixture();
        let operations = vec![
            Operation::from(GetAllElements::new()),
            Operation::from(Limit { result_limit: 3 }),
            Operation::Count,
        ];

        let output = run_chain(&source, operations, None, &Context::default())
            .await
            .unwrap();
        assert!(matches!(output, QueryOutput::Count(3)));
    }

    #[tokio::test]
    async fn count_without_elements_is_unsupported() {
        let source = fixture();
        let err = run_chain(&source, vec![Operation::Count], None, &Context::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnsupportedOperation { operation: "Count", .. }
        ));
    }

    #[tokio::test]
    async fn cancelled_context_stops_before_fetching() {
        let source = fixture();
        let ctx = Context::default();
        ctx.cancel();

        let err = run_chain(&source, vec![Operation::from(GetAllElements::new())], None, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }
}
