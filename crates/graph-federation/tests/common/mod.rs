#![allow(dead_code)]

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;
use synapse_federation::{
    CloseableStream, Context, Edge, Element, ElementStream, Entity, GraphError, GraphHook,
    MapStore, OperationChain, QueryOutput, Result, Schema, SchemaElementDefinition, Store,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn schema() -> Schema {
    Schema::new()
        .entity(
            "person",
            SchemaElementDefinition::default()
                .with_property("name", "string")
                .with_property("age", "int"),
        )
        .entity("junction", SchemaElementDefinition::default())
        .entity("secret", SchemaElementDefinition::default())
        .edge("knows", SchemaElementDefinition::default().with_property("weight", "float"))
        .edge("road", SchemaElementDefinition::default())
}

pub fn road_schema() -> Schema {
    Schema::new()
        .entity("junction", SchemaElementDefinition::default())
        .edge("road", SchemaElementDefinition::default())
}

pub fn person(vertex: &str) -> Element {
    Entity::new("person", vertex).with_property("name", vertex).into()
}

pub fn road(source: &str, destination: &str) -> Element {
    Edge::new("road", source, destination).into()
}

pub fn vertices(elements: &[Element]) -> Vec<String> {
    elements.iter().map(|e| e.seed_vertex().to_string()).collect()
}

pub async fn collect(output: QueryOutput) -> Vec<Element> {
    output
        .into_elements()
        .expect("element output")
        .collect_all()
        .await
        .expect("readable stream")
}

/// A delegate backed by a [`MapStore`] that counts dispatches and closes,
/// and can be made slow or broken.
pub struct RecordingStore {
    inner: MapStore,
    dispatches: AtomicUsize,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    delay: Option<Duration>,
    failure: Option<String>,
    break_after: Option<usize>,
}

impl RecordingStore {
    pub fn new(schema: Schema, elements: Vec<Element>) -> Self {
        let inner = MapStore::new(schema);
        inner.add_elements(elements).expect("elements match schema");
        Self {
            inner,
            dispatches: AtomicUsize::new(0),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            delay: None,
            failure: None,
            break_after: None,
        }
    }

    pub fn people(names: &[&str]) -> Self {
        Self::new(schema(), names.iter().map(|n| person(n)).collect())
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Streams fail after yielding `n` elements.
    pub fn breaking_after(mut self, n: usize) -> Self {
        self.break_after = Some(n);
        self
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for RecordingStore {
    fn schema(&self) -> Schema {
        self.inner.schema()
    }

    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<QueryOutput> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(GraphError::Store(anyhow::anyhow!(message.clone())));
        }
        match self.inner.execute(chain, ctx).await? {
            QueryOutput::Elements(stream) => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(QueryOutput::Elements(ElementStream::new(Tracked {
                    inner: stream,
                    closed: self.closed.clone(),
                    break_after: self.break_after,
                    yielded: 0,
                })))
            }
            other => Ok(other),
        }
    }
}

struct Tracked {
    inner: ElementStream,
    closed: Arc<AtomicUsize>,
    break_after: Option<usize>,
    yielded: usize,
}

impl Stream for Tracked {
    type Item = Result<Element>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.break_after == Some(this.yielded) {
            this.break_after = None;
            return Poll::Ready(Some(Err(GraphError::Store(anyhow::anyhow!("stream broke")))));
        }
        let next = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(_))) = &next {
            this.yielded += 1;
        }
        next
    }
}

impl CloseableStream for Tracked {
    fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

/// Records every hook call as `"{name}:{stage}"`.
pub struct RecordingHook {
    name: String,
    calls: Arc<Mutex<Vec<String>>>,
    fail_post: bool,
}

impl RecordingHook {
    pub fn new(name: &str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            calls: calls.clone(),
            fail_post: false,
        }
    }

    pub fn failing_post_execute(mut self) -> Self {
        self.fail_post = true;
        self
    }

    fn record(&self, stage: &str) {
        self.calls.lock().unwrap().push(format!("{}:{stage}", self.name));
    }
}

impl GraphHook for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_execute(&self, _chain: &mut OperationChain, _ctx: &mut Context) -> Result<()> {
        self.record("pre");
        Ok(())
    }

    fn post_execute(
        &self,
        _result: &mut QueryOutput,
        _chain: &OperationChain,
        _ctx: &mut Context,
    ) -> Result<()> {
        self.record("post");
        if self.fail_post {
            return Err(GraphError::hook_rejected(&self.name, "post execute failed"));
        }
        Ok(())
    }

    fn on_failure(
        &self,
        result: Option<QueryOutput>,
        _chain: &OperationChain,
        _ctx: &mut Context,
        error: &GraphError,
    ) -> Option<QueryOutput> {
        self.record(&format!("failure({})", error_kind(error)));
        result
    }
}

fn error_kind(error: &GraphError) -> &'static str {
    match error {
        GraphError::Validation { .. } => "validation",
        GraphError::HookRejected { .. } => "rejected",
        _ => "other",
    }
}
