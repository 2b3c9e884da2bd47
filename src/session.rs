// Session Controller Module
// Activation, per-session state (RNG, clock, templates, streams) and the
// control operations exposed to test code.

use crate::clock::{system_clock, SharedClock};
use crate::errors::{ErrorConfig, ErrorInjector, MockError, SimulatedError};
use crate::handlers::{register_builtins, BuiltinEndpoint};
use crate::latency::{LatencyProfile, DEFAULT_CHUNK_INTERVAL_MS};
use crate::router::{
    parse_method, CustomEndpoint, Dispatch, RouteKind, RouteRegistry, DEFAULT_ORIGIN,
};
use crate::samples::ContentType;
use crate::stream::{StreamEmulator, StreamRegistry};
use crate::templates::TemplateStore;
use axum::http::Method;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// RNG seed: a number, or a string folded to one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Number(u64),
    Text(String),
}

impl Seed {
    pub fn to_u64(&self) -> u64 {
        match self {
            Seed::Number(n) => *n,
            Seed::Text(text) => text.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
            }),
        }
    }
}

impl From<u64> for Seed {
    fn from(n: u64) -> Self {
        Seed::Number(n)
    }
}

impl From<&str> for Seed {
    fn from(text: &str) -> Self {
        Seed::Text(text.to_string())
    }
}

impl From<String> for Seed {
    fn from(text: String) -> Self {
        Seed::Text(text)
    }
}

/// Activation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockOptions {
    /// Built-in handlers occasionally answer with a simulated provider error
    pub include_errors: bool,
    pub error_rate: f64,
    /// Delay before a built-in handler's response is delivered
    pub latency_ms: u64,
    pub stream_interval_ms: u64,
    /// Log every intercepted request body
    pub log_requests: bool,
    pub seed: Option<Seed>,
    /// Answer chat and image requests with the canned templates
    pub use_fixed_responses: bool,
    /// Origin whose traffic is intercepted
    pub origin: String,
    /// Where the loopback server forwards requests no route matches
    pub passthrough_upstream: Option<String>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            include_errors: false,
            error_rate: crate::errors::DEFAULT_ERROR_RATE,
            latency_ms: 0,
            stream_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            log_requests: false,
            seed: None,
            use_fixed_responses: false,
            origin: DEFAULT_ORIGIN.to_string(),
            passthrough_upstream: None,
        }
    }
}

impl MockOptions {
    pub fn error_config(&self) -> ErrorConfig {
        let config = if self.include_errors {
            ErrorConfig::enabled()
        } else {
            ErrorConfig::none()
        };
        config.with_rate(self.error_rate)
    }

    pub fn latency_profile(&self) -> LatencyProfile {
        LatencyProfile::new(self.latency_ms, self.stream_interval_ms)
    }
}

/// Ambient execution mode, read from `APP_ENV` (or `RUST_ENV`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Development,
    Other,
}

impl ExecutionMode {
    pub fn from_env() -> Self {
        let value = std::env::var("APP_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        Self::parse(&value)
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("development") {
            ExecutionMode::Development
        } else {
            ExecutionMode::Other
        }
    }
}

fn rng_for(seed: Option<&Seed>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.to_u64()),
        None => StdRng::from_os_rng(),
    }
}

/// State shared by the built-in handlers of one session
pub struct SessionContext {
    rng: Mutex<StdRng>,
    clock: SharedClock,
    templates: TemplateStore,
    streams: StreamEmulator,
    injector: ErrorInjector,
    latency: LatencyProfile,
    use_fixed_responses: bool,
}

impl SessionContext {
    pub fn new(options: &MockOptions, clock: SharedClock) -> Self {
        let latency = options.latency_profile();
        Self {
            rng: Mutex::new(rng_for(options.seed.as_ref())),
            clock,
            templates: TemplateStore::new(),
            streams: StreamEmulator::new(StreamRegistry::new(), latency),
            injector: ErrorInjector::new(options.error_config()),
            latency,
            use_fixed_responses: options.use_fixed_responses,
        }
    }

    /// Run `f` with exclusive access to the session RNG. Never hold it
    /// across an await point.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    pub fn reseed(&self, seed: Option<&Seed>) {
        self.with_rng(|rng| *rng = rng_for(seed));
    }

    pub fn now(&self) -> i64 {
        self.clock.now_unix()
    }

    pub fn maybe_inject(&self, endpoint: BuiltinEndpoint) -> Option<SimulatedError> {
        if !self.injector.is_enabled() {
            return None;
        }
        self.with_rng(|rng| self.injector.maybe_inject(endpoint, rng))
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn streams(&self) -> &StreamEmulator {
        &self.streams
    }

    pub fn latency(&self) -> &LatencyProfile {
        &self.latency
    }

    pub fn use_fixed_responses(&self) -> bool {
        self.use_fixed_responses
    }
}

struct SessionShared {
    active: AtomicBool,
    options: MockOptions,
    context: Arc<SessionContext>,
    routes: RouteRegistry,
}

/// Control handle returned by activation. Clones share the same session.
#[derive(Clone)]
pub struct MockSession {
    shared: Arc<SessionShared>,
}

/// Activate mocking when `force` is set or the process runs in development mode.
/// An inactive handle is returned otherwise; every control operation is still safe.
pub fn mock_openai_response(force: bool, options: MockOptions) -> Result<MockSession, MockError> {
    MockSession::activate(force, ExecutionMode::from_env(), options, system_clock())
}

impl MockSession {
    pub fn activate(
        force: bool,
        mode: ExecutionMode,
        options: MockOptions,
        clock: SharedClock,
    ) -> Result<Self, MockError> {
        let active = force || mode == ExecutionMode::Development;
        let routes = RouteRegistry::new(&options.origin, options.log_requests)?;
        let context = Arc::new(SessionContext::new(&options, clock));

        if active {
            register_builtins(&routes, &context)?;
            tracing::info!(
                origin = %options.origin,
                seeded = options.seed.is_some(),
                fixed = options.use_fixed_responses,
                include_errors = options.include_errors,
                "OpenAI API mocking activated"
            );
        } else {
            tracing::debug!(?mode, "Mocking not activated");
        }

        Ok(Self {
            shared: Arc::new(SessionShared {
                active: AtomicBool::new(active),
                options,
                context,
                routes,
            }),
        })
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> &MockOptions {
        &self.shared.options
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.shared.context
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.shared.routes
    }

    /// Tear down every route and cancel live streams
    pub fn stop_mocking(&self) {
        let removed = self.shared.routes.clear();
        self.shared.context.streams().registry().clear();
        if self.shared.active.swap(false, Ordering::SeqCst) {
            tracing::info!(routes = removed, "OpenAI API mocking stopped");
        }
    }

    pub fn set_seed(&self, seed: impl Into<Seed>) {
        let seed = seed.into();
        tracing::debug!(?seed, "Reseeding session RNG");
        self.shared.context.reseed(Some(&seed));
    }

    pub fn reset_seed(&self) {
        self.shared.context.reseed(None);
    }

    pub fn get_response_templates(&self) -> BTreeMap<String, Value> {
        self.shared.context.templates().all()
    }

    pub fn create_response_template(
        &self,
        name: &str,
        overrides: &Value,
    ) -> Result<Value, MockError> {
        self.shared.context.templates().create(name, overrides)
    }

    /// Register a persistent handler for `method path`. The handler receives
    /// the request uri and body and returns a status and body.
    pub fn add_custom_endpoint<F, Fut>(
        &self,
        method: &str,
        path: &str,
        handler: F,
    ) -> Result<(), MockError>
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (u16, Value)> + Send + 'static,
    {
        let method = parse_method(method)?;
        self.shared.routes.register(
            method,
            path,
            Arc::new(CustomEndpoint::new(handler)),
            true,
            RouteKind::Custom,
        )
    }

    /// Offer a request to the session; see [`RouteRegistry::dispatch`]
    pub async fn dispatch(&self, method: Method, target: &str, body: Value) -> Dispatch {
        if !self.is_active() {
            return Dispatch::Passthrough;
        }
        self.shared.routes.dispatch(&method, target, body).await
    }

    /// Rewind a live stream onto a fresh sample chosen for `prompt`
    pub fn reset_stream(&self, stream_id: &str, prompt: &str) -> bool {
        let content_type = ContentType::classify(prompt);
        let content = self.shared.context.with_rng(|rng| content_type.pick(rng));
        self.shared
            .context
            .streams()
            .registry()
            .reset(stream_id, content, content_type)
    }
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("active", &self.is_active())
            .field("options", &self.shared.options)
            .field("routes", &self.shared.routes)
            .finish()
    }
}
