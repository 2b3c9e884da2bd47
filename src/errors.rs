// Error Module
// Engine errors raised to the caller of the control API, and the injector that
// simulates provider-side failures for the built-in endpoints.

use crate::handlers::BuiltinEndpoint;
use crate::openai::ErrorResponse;
use rand::Rng;

/// Probability of an injected error per request when `include_errors` is on
pub const DEFAULT_ERROR_RATE: f64 = 0.05;

/// Errors surfaced by the mock engine itself
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// A template name that the store does not know; a bug in the calling test
    #[error("Unknown template type: {0}")]
    UnknownTemplate(String),
    /// A function/tool parameter schema the synthesizer cannot instantiate
    #[error("Invalid schema at '{path}': {reason}")]
    InvalidSchema { path: String, reason: String },
    /// A handler failed while building its response
    #[error("Handler failed: {0}")]
    Handler(String),
    #[error("Failed to bind or run mock server: {0}")]
    Bind(#[source] std::io::Error),
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),
    /// Route paths must be absolute, e.g. `/v1/chat/completions`
    #[error("Invalid route path '{0}': paths must start with '/'")]
    InvalidPath(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MockError {
    pub fn handler(message: impl Into<String>) -> Self {
        MockError::Handler(message.into())
    }
}

/// Configuration for error injection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorConfig {
    pub enabled: bool,
    /// Probability of an error per request (0.0-1.0)
    pub rate: f64,
}

impl ErrorConfig {
    pub fn none() -> Self {
        Self {
            enabled: false,
            rate: DEFAULT_ERROR_RATE,
        }
    }

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            rate: DEFAULT_ERROR_RATE,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate.clamp(0.0, 1.0);
        self
    }

    /// The effective probability of an error occurring
    pub fn effective_rate(&self) -> f64 {
        if self.enabled {
            self.rate
        } else {
            0.0
        }
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

/// Types of simulated provider errors
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedError {
    /// Rate limit exceeded (HTTP 429)
    RateLimit { retry_after_seconds: u32 },
    /// Prompt rejected by the safety system (HTTP 400)
    ContentPolicy,
}

impl SimulatedError {
    /// The error each built-in endpoint simulates
    pub fn for_endpoint<R: Rng + ?Sized>(endpoint: BuiltinEndpoint, rng: &mut R) -> Self {
        match endpoint {
            BuiltinEndpoint::ChatCompletions => SimulatedError::RateLimit {
                retry_after_seconds: rng.random_range(1..60),
            },
            BuiltinEndpoint::ImageGenerations => SimulatedError::ContentPolicy,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            SimulatedError::RateLimit { .. } => 429,
            SimulatedError::ContentPolicy => 400,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            SimulatedError::RateLimit { .. } => ErrorResponse::rate_limit(),
            SimulatedError::ContentPolicy => ErrorResponse::content_policy(),
        }
    }

    /// Retry-After header value if applicable
    pub fn retry_after(&self) -> Option<u32> {
        match self {
            SimulatedError::RateLimit {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            SimulatedError::ContentPolicy => None,
        }
    }
}

/// Decides whether a built-in handler returns a simulated error
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorInjector {
    config: ErrorConfig,
}

impl ErrorInjector {
    pub fn new(config: ErrorConfig) -> Self {
        Self { config }
    }

    /// Draw once from `rng`; below the configured rate an error is returned.
    /// No draw is made while injection is disabled.
    pub fn maybe_inject<R: Rng + ?Sized>(
        &self,
        endpoint: BuiltinEndpoint,
        rng: &mut R,
    ) -> Option<SimulatedError> {
        if !self.is_enabled() {
            return None;
        }
        let roll: f64 = rng.random();
        if roll < self.config.effective_rate() {
            Some(SimulatedError::for_endpoint(endpoint, rng))
        } else {
            None
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.effective_rate() > 0.0
    }

    pub fn config(&self) -> &ErrorConfig {
        &self.config
    }
}
