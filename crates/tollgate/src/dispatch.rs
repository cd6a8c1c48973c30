//! Route-to-adapter binding and admission policy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::admission::AdmissionQueue;
use crate::config::{AdmissionConfig, UpstreamsConfig};
use crate::upstream::{
    FluxAdapter, GatewayError, ImageFetchAdapter, ImageGenerationAdapter, InboundRequest,
    MessagesAdapter, UpstreamAdapter, UpstreamReply,
};

/// Inbound routes served through an upstream adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ImageGenerations,
    Messages,
    FluxGenerate,
    FetchImage,
    StreamImage,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::ImageGenerations => "/proxy/v1/images/generations",
            Route::Messages => "/proxy/v1/messages",
            Route::FluxGenerate => "/proxy/flux/generate",
            Route::FetchImage => "/fetch-image",
            Route::StreamImage => "/proxy/image",
        }
    }

    /// Whether calls on this route wait for an admission slot.
    ///
    /// Proxy routes carry the caller's own credentials and are bounded by the
    /// caller's upstream rate limits. The buffered image fetch has no caller
    /// identity, so its fan-out is capped.
    pub fn is_admission_controlled(self) -> bool {
        matches!(self, Route::FetchImage)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends each route's requests through its adapter, queueing where required.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    adapters: HashMap<Route, Arc<dyn UpstreamAdapter>>,
    queue: AdmissionQueue,
}

impl Dispatcher {
    pub fn new(client: Client, queue: AdmissionQueue) -> Self {
        Self {
            client,
            adapters: HashMap::new(),
            queue,
        }
    }

    /// Build a dispatcher with every route bound to its upstream.
    pub fn from_config(
        upstreams: &UpstreamsConfig,
        admission: &AdmissionConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(upstreams.connect_timeout_seconds))
            .build()?;
        let mut dispatcher = Self::new(client, AdmissionQueue::new(admission.concurrency_limit));

        dispatcher.register(
            Route::ImageGenerations,
            Arc::new(ImageGenerationAdapter::new(&upstreams.openai_base_url)),
        );
        dispatcher.register(
            Route::Messages,
            Arc::new(MessagesAdapter::new(&upstreams.anthropic_base_url)),
        );
        dispatcher.register(
            Route::FluxGenerate,
            Arc::new(FluxAdapter::new(&upstreams.flux_url)),
        );
        dispatcher.register(
            Route::FetchImage,
            Arc::new(ImageFetchAdapter::buffered(upstreams.image_max_bytes)),
        );
        dispatcher.register(Route::StreamImage, Arc::new(ImageFetchAdapter::streamed()));

        info!(
            concurrency_limit = dispatcher.queue.limit(),
            image_max_bytes = upstreams.image_max_bytes,
            "Registered upstream adapters"
        );

        Ok(dispatcher)
    }

    /// Bind a route to an adapter, replacing any previous binding.
    pub fn register(&mut self, route: Route, adapter: Arc<dyn UpstreamAdapter>) {
        self.adapters.insert(route, adapter);
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub async fn dispatch(
        &self,
        route: Route,
        request: InboundRequest,
    ) -> Result<UpstreamReply, GatewayError> {
        let request_id = Ulid::new();
        let Some(adapter) = self.adapters.get(&route).cloned() else {
            error!(%request_id, %route, "No adapter registered for route");
            return Err(GatewayError::internal(format!(
                "no adapter registered for {route}"
            )));
        };
        let upstream = adapter.name();
        let started = Instant::now();

        let result = if route.is_admission_controlled() {
            let stats = self.queue.stats();
            debug!(
                %request_id,
                %route,
                running = stats.running,
                pending = stats.pending,
                "Queueing upstream call"
            );
            let client = self.client.clone();
            self.queue
                .enqueue(async move { adapter.call(&client, &request).await })
                .await
                .unwrap_or_else(|e| Err(GatewayError::internal(e.to_string())))
        } else {
            adapter.call(&self.client, &request).await
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(reply) => info!(
                %request_id,
                %route,
                upstream,
                status = reply.status().as_u16(),
                elapsed_ms,
                "Upstream call completed"
            ),
            Err(GatewayError::Internal(message)) => error!(
                %request_id,
                %route,
                upstream,
                elapsed_ms,
                error = %message,
                "Upstream call failed"
            ),
            Err(e) => warn!(
                %request_id,
                %route,
                upstream,
                kind = e.kind(),
                status = e.status().as_u16(),
                elapsed_ms,
                error = %e,
                "Upstream call failed"
            ),
        }

        result
    }
}
