//! Network session wrapper.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::challenge;
use crate::connectivity::ConnectivityMonitor;
use crate::decorator::{RequestDecorator, TRACKING_ID_HEADER};
use crate::delegate::{DelegateChain, SessionDelegate};
use crate::metadata::{MetadataRecorder, RequestMetadata, TelemetrySink, TracingTelemetrySink};
use crate::retry::{DefaultRetryPolicy, RetryBudget, RetryPolicy};
use crate::transport::{PreparedRequest, ReqwestTransport, Transport};
use crate::{
    AuthorizationProvider, AuthorizationState, RequestDescriptor, Response, Result,
    SessionConfig, SessionError, TransportErrorKind,
};

/// Terminal result of one logical request.
pub type Outcome = Result<Response>;

/// Completion callback of a logical request.
pub type CompletionHandler = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Shape of the task a logical request was started with.
///
/// Retries and the post-authorization resend replay the same shape.
pub enum TaskKind {
    /// Fetch reporting to the session's delegates.
    PlainFetch,
    /// Fetch reporting to a completion callback.
    FetchWithCallback(CompletionHandler),
    /// Upload of a body reporting to a completion callback.
    UploadWithBody(Bytes, CompletionHandler),
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainFetch => f.write_str("PlainFetch"),
            Self::FetchWithCallback(_) => f.write_str("FetchWithCallback"),
            Self::UploadWithBody(body, _) => {
                f.debug_tuple("UploadWithBody").field(&body.len()).finish()
            }
        }
    }
}

impl TaskKind {
    fn shape(&self) -> Shape {
        match self {
            Self::PlainFetch => Shape::Fetch { delegated: true },
            Self::FetchWithCallback(_) => Shape::Fetch { delegated: false },
            Self::UploadWithBody(body, _) => Shape::Upload(body.clone()),
        }
    }

    fn complete(self, outcome: Outcome, delegate: &DelegateChain) {
        match self {
            Self::PlainFetch => delegate.on_complete(&outcome),
            Self::FetchWithCallback(handler) | Self::UploadWithBody(_, handler) => handler(outcome),
        }
    }
}

/// Callback-free copy of a [`TaskKind`] used to replay physical exchanges.
#[derive(Debug, Clone)]
enum Shape {
    Fetch { delegated: bool },
    Upload(Bytes),
}

impl Shape {
    fn delegated(&self) -> bool {
        matches!(self, Self::Fetch { delegated: true })
    }
}

struct SessionInner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    decorator: RequestDecorator,
    authorizer: Option<Arc<dyn AuthorizationProvider>>,
    retry_policy: Arc<dyn RetryPolicy>,
    recorder: MetadataRecorder,
    delegate: DelegateChain,
}

/// Session that decorates, retries and reauthorizes requests.
///
/// Every logical request delivers exactly one [`Outcome`], however many
/// physical exchanges it takes.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session builder around a transport.
    pub fn builder(transport: Arc<dyn Transport>) -> SessionBuilder {
        SessionBuilder::new(transport)
    }

    /// Create a session using the reqwest transport.
    pub fn with_reqwest(config: SessionConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(SessionBuilder::new(transport).config(config).build())
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The shared authorization state.
    pub fn authorization_state(&self) -> &Arc<AuthorizationState> {
        self.inner.decorator.state()
    }

    /// The decorator used for outgoing requests.
    pub fn decorator(&self) -> &RequestDecorator {
        &self.inner.decorator
    }

    /// Whether network metadata is recorded.
    pub fn records_network_metadata(&self) -> bool {
        self.inner.recorder.is_enabled()
    }

    /// Turn network metadata recording on or off.
    pub fn set_record_network_metadata(&self, enable: bool) {
        self.inner.recorder.set_enabled(enable);
    }

    fn default_budget(&self) -> RetryBudget {
        RetryBudget::new(self.inner.config.auto_retries)
    }

    /// Send a request and deliver its outcome to `completion`.
    ///
    /// Runs on a spawned tokio task; `completion` is invoked exactly once.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn send<F>(
        &self,
        request: RequestDescriptor,
        budget: impl Into<RetryBudget>,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.spawn(request, TaskKind::FetchWithCallback(Box::new(completion)), budget.into())
    }

    /// Upload `body` and deliver the outcome to `completion`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn upload<F>(
        &self,
        request: RequestDescriptor,
        body: impl Into<Bytes>,
        budget: impl Into<RetryBudget>,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let task = TaskKind::UploadWithBody(body.into(), Box::new(completion));
        self.spawn(request, task, budget.into())
    }

    /// Send a request whose events go to the session delegates.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn data_task(&self, request: RequestDescriptor) -> JoinHandle<()> {
        self.spawn(request, TaskKind::PlainFetch, self.default_budget())
    }

    /// Send a request with the configured retry budget and await its outcome.
    pub async fn fetch(&self, request: RequestDescriptor) -> Outcome {
        self.fetch_with_budget(request, self.default_budget()).await
    }

    /// Send a request with an explicit retry budget and await its outcome.
    pub async fn fetch_with_budget(
        &self,
        request: RequestDescriptor,
        budget: impl Into<RetryBudget>,
    ) -> Outcome {
        let (tx, rx) = oneshot::channel();
        let task = TaskKind::FetchWithCallback(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }));
        self.execute(request, task, budget.into()).await;
        Self::received(rx).await
    }

    /// Upload `body` with the configured retry budget and await the outcome.
    pub async fn upload_data(&self, request: RequestDescriptor, body: impl Into<Bytes>) -> Outcome {
        let (tx, rx) = oneshot::channel();
        let task = TaskKind::UploadWithBody(
            body.into(),
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        self.execute(request, task, self.default_budget()).await;
        Self::received(rx).await
    }

    async fn received(rx: oneshot::Receiver<Outcome>) -> Outcome {
        rx.await.unwrap_or_else(|_| {
            Err(SessionError::transport(
                TransportErrorKind::Other,
                "completion handler dropped without an outcome",
            ))
        })
    }

    fn spawn(&self, request: RequestDescriptor, task: TaskKind, budget: RetryBudget) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.execute(request, task, budget).await })
    }

    /// Run a logical request to completion and hand its outcome to the task.
    pub async fn execute(&self, request: RequestDescriptor, task: TaskKind, budget: RetryBudget) {
        let shape = task.shape();
        let outcome = self.run(&request, &shape, budget).await;
        task.complete(outcome, &self.inner.delegate);
    }

    async fn run(&self, original: &RequestDescriptor, shape: &Shape, budget: RetryBudget) -> Outcome {
        let inner = &self.inner;
        let url = match original.resolve_url(inner.config.app_route.as_deref()) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, url = %original.url(), "Cannot send request");
                return Err(e);
            }
        };

        let mut budget = budget;
        let mut attempt = 0u32;
        loop {
            // Decorate the untouched original on every attempt.
            let decorated = inner.decorator.decorate(original, true);
            let tracking_id = decorated
                .header_value(TRACKING_ID_HEADER)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let metadata = RequestMetadata::new(Some(url.clone()), tracking_id);

            debug!(
                method = %original.method(),
                url = %url,
                attempt = attempt + 1,
                retries_left = budget.remaining(),
                "Dispatching request"
            );
            let result = self.dispatch(&decorated, &url, shape).await;

            let (response, error) = match &result {
                Ok(response) => (Some(response), None),
                Err(e) => (None, Some(e)),
            };
            if inner.retry_policy.should_retry(response, error, budget)
                && let Some(next) = budget.decrement()
            {
                debug!(
                    status = ?response.map(|r| r.status().as_u16()),
                    error = ?error.map(ToString::to_string),
                    retries_left = next.remaining(),
                    "Retrying request"
                );
                let delay = inner.retry_policy.retry_delay(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                budget = next;
                attempt += 1;
                continue;
            }

            return match result {
                Ok(response) if challenge::is_challenge(&response, &inner.config.auth_realm) => {
                    self.handle_challenge(&decorated, &url, shape, metadata, response)
                        .await
                }
                Ok(response) => self.finish(response, metadata, shape),
                Err(e) => Err(e),
            };
        }
    }

    async fn dispatch(&self, request: &RequestDescriptor, url: &url::Url, shape: &Shape) -> Outcome {
        let prepared = PreparedRequest::new(request, url.clone(), self.inner.config.timeout);
        match shape {
            Shape::Upload(body) => self.inner.transport.upload(prepared, body.clone()).await,
            Shape::Fetch { .. } => self.inner.transport.fetch(prepared).await,
        }
    }

    /// Obtain fresh credentials and resend the challenged request once.
    ///
    /// The resend keeps the challenged exchange's headers, including its
    /// tracking id, with only the credential replaced. On any authorization
    /// failure the challenge response itself is delivered.
    async fn handle_challenge(
        &self,
        challenged: &RequestDescriptor,
        url: &url::Url,
        shape: &Shape,
        metadata: RequestMetadata,
        challenge: Response,
    ) -> Outcome {
        let inner = &self.inner;
        info!(status = %challenge.status(), url = %url, "Authorization challenge received");

        let Some(authorizer) = &inner.authorizer else {
            warn!("No authorization provider configured, delivering challenge response");
            return challenge.error_for_status();
        };

        let state = inner.decorator.state();
        match authorizer.obtain_authorization(state).await {
            Ok(status) if status.is_success() => {
                let mut request = challenged.clone();
                if let Some(header) = state.cached_header() {
                    request.set_header(http::header::AUTHORIZATION.as_str(), &header);
                }
                debug!(url = %url, "Resending request after authorization");
                match self.dispatch(&request, url, shape).await {
                    Ok(response) => self.finish(response, metadata, shape),
                    Err(e) => Err(e),
                }
            }
            Ok(status) => {
                error!(status = %status, "Authorization process failed");
                challenge.error_for_status()
            }
            Err(e) => {
                error!(error = %e, "Authorization process failed");
                challenge.error_for_status()
            }
        }
    }

    /// Report and record a received response, then turn it into an outcome.
    fn finish(&self, response: Response, mut metadata: RequestMetadata, shape: &Shape) -> Outcome {
        let inner = &self.inner;

        if response.is_redirect() {
            debug!(status = %response.status(), "Redirect response not followed");
            if shape.delegated() {
                inner.delegate.on_redirect(&response);
            }
            return Ok(response);
        }

        if shape.delegated() {
            inner.delegate.on_response(&response);
        }
        metadata.observe(&response);
        metadata.finalize(&inner.recorder);

        response.error_for_status()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("authorizer", &self.inner.authorizer.is_some())
            .field("recorder", &self.inner.recorder)
            .field("delegates", &self.inner.delegate.len())
            .finish()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    state: Option<Arc<AuthorizationState>>,
    authorizer: Option<Arc<dyn AuthorizationProvider>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    telemetry_sink: Option<Arc<dyn TelemetrySink>>,
    delegate: DelegateChain,
}

impl SessionBuilder {
    /// Start a builder around a transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: SessionConfig::default(),
            state: None,
            authorizer: None,
            retry_policy: None,
            connectivity: None,
            telemetry_sink: None,
            delegate: DelegateChain::new(),
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing authorization state.
    pub fn authorization_state(mut self, state: Arc<AuthorizationState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the provider used to answer authorization challenges.
    pub fn authorizer(mut self, authorizer: Arc<dyn AuthorizationProvider>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Replace the retry policy.
    ///
    /// A custom policy ignores [`connectivity`](Self::connectivity) and the
    /// configured backoff.
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Gate transport retries of the default policy on connectivity.
    pub fn connectivity(mut self, monitor: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    /// Set the telemetry sink for network metadata.
    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry_sink = Some(sink);
        self
    }

    /// Add a delegate for plain fetch tasks.
    pub fn delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = self.delegate.with_delegate(delegate);
        self
    }

    /// Build the session.
    pub fn build(self) -> Session {
        let state = self.state.unwrap_or_default();
        let decorator = RequestDecorator::new(state)
            .with_analytics_metadata(self.config.analytics_metadata.clone());

        let retry_policy = self.retry_policy.unwrap_or_else(|| {
            let mut policy = DefaultRetryPolicy::new().with_backoff(self.config.backoff.clone());
            if let Some(monitor) = self.connectivity {
                policy = policy.with_connectivity(monitor);
            }
            Arc::new(policy)
        });

        let sink = self
            .telemetry_sink
            .unwrap_or_else(|| Arc::new(TracingTelemetrySink));
        let recorder = MetadataRecorder::new(sink, self.config.record_network_metadata);

        Session {
            inner: Arc::new(SessionInner {
                config: self.config,
                transport: self.transport,
                decorator,
                authorizer: self.authorizer,
                retry_policy,
                recorder,
                delegate: self.delegate,
            }),
        }
    }
}
