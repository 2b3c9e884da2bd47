//! # openai-api-mock
//!
//! An OpenAI API emulator for tests and local development. It intercepts
//! requests aimed at the API origin and answers them with synthesized,
//! seed-deterministic content instead of calling a real model.
//!
//! ## Features
//!
//! - Built-in `POST /v1/chat/completions` and `POST /v1/images/generations`
//! - Content chosen by the prompt's content type (markdown, html, json, text)
//! - Function and tool calls with arguments synthesized from the declared schema
//! - Character-by-character SSE streaming with cancellation
//! - Canned response templates with deep-merged overrides
//! - Optional error injection and artificial latency
//! - Custom endpoints registered at runtime
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use openai_api_mock::{mock_openai_response, Method, MockOptions};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), openai_api_mock::MockError> {
//! let mock = mock_openai_response(true, MockOptions {
//!     seed: Some(42u64.into()),
//!     ..MockOptions::default()
//! })?;
//!
//! let reply = mock
//!     .dispatch(
//!         Method::POST,
//!         "https://api.openai.com/v1/chat/completions",
//!         json!({"model": "gpt-4", "messages": [{"role": "user", "content": "Hi"}]}),
//!     )
//!     .await;
//!
//! // or serve it for an unmodified client
//! let server = mock.serve("127.0.0.1:0".parse().unwrap()).await?;
//! println!("base url: {}/v1", server.base_url());
//! server.shutdown().await?;
//! mock.stop_mocking();
//! # Ok(())
//! # }
//! ```
//!
//! ### As a CLI
//!
//! ```bash
//! openai-api-mock serve --port 8080 --seed 42
//! ```

pub mod clock;
pub mod config;
pub mod errors;
pub mod generator;
pub mod handlers;
pub mod latency;
pub mod openai;
pub mod router;
pub mod samples;
pub mod server;
pub mod session;
pub mod stream;
pub mod templates;

// Re-export commonly used types
pub use axum::http::Method;
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::{Config, ConfigError};
pub use errors::{ErrorConfig, ErrorInjector, MockError, SimulatedError};
pub use generator::FakeDataGenerator;
pub use latency::LatencyProfile;
pub use router::{Dispatch, HandlerResponse, MockRequest, RouteHandler, RouteRegistry};
pub use samples::ContentType;
pub use server::MockServer;
pub use session::{mock_openai_response, ExecutionMode, MockOptions, MockSession, Seed};
pub use stream::{StreamEmulator, StreamHandle, StreamRegistry, StreamState};
pub use templates::{deep_merge, TemplateStore};
