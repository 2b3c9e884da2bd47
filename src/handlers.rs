// Built-in Endpoint Handlers
// Request validation and response synthesis for the emulated Chat Completions
// and Image Generations endpoints.

use crate::errors::{MockError, SimulatedError};
use crate::generator::FakeDataGenerator;
use crate::openai::{
    AssistantMessage, ChatCompletionRequest, ChatCompletionResponse, ErrorResponse, FunctionCall,
    FunctionDefinition, ImageData, ImageGenerationRequest, ImageGenerationResponse, ToolCall, Usage,
};
use crate::router::{HandlerResponse, MockRequest, RouteHandler, RouteKind, RouteRegistry};
use crate::samples::ContentType;
use crate::session::SessionContext;
use crate::stream::ChunkIdentity;
use crate::templates;
use async_trait::async_trait;
use axum::http::Method;
use rand::distr::{Alphanumeric, Distribution};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

pub const MISSING_FIELDS_MESSAGE: &str = "Invalid request. Missing required fields.";
pub const MISSING_PROMPT_MESSAGE: &str = "Invalid request. Missing prompt.";

/// Host used for synthesized image URLs
const IMAGE_HOST: &str = "https://mock-images.openai.invalid";

/// A 1x1 transparent PNG, returned for `response_format: "b64_json"`
const PLACEHOLDER_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// The endpoints every active session registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinEndpoint {
    ChatCompletions,
    ImageGenerations,
}

impl BuiltinEndpoint {
    pub const ALL: [BuiltinEndpoint; 2] = [
        BuiltinEndpoint::ChatCompletions,
        BuiltinEndpoint::ImageGenerations,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            BuiltinEndpoint::ChatCompletions => "/v1/chat/completions",
            BuiltinEndpoint::ImageGenerations => "/v1/images/generations",
        }
    }

    pub fn method(&self) -> Method {
        Method::POST
    }

    fn handler(&self, ctx: Arc<SessionContext>) -> Arc<dyn RouteHandler> {
        match self {
            BuiltinEndpoint::ChatCompletions => Arc::new(ChatCompletionsHandler::new(ctx)),
            BuiltinEndpoint::ImageGenerations => Arc::new(ImageGenerationsHandler::new(ctx)),
        }
    }
}

/// Register the persistent built-in routes on `registry`
pub fn register_builtins(
    registry: &RouteRegistry,
    ctx: &Arc<SessionContext>,
) -> Result<(), MockError> {
    for endpoint in BuiltinEndpoint::ALL {
        registry.register(
            endpoint.method(),
            endpoint.path(),
            endpoint.handler(ctx.clone()),
            true,
            RouteKind::BuiltIn,
        )?;
    }
    Ok(())
}

/// `count` random ASCII letters and digits
pub fn random_alphanumeric<R: Rng + ?Sized>(rng: &mut R, count: usize) -> String {
    (0..count)
        .map(|_| char::from(Alphanumeric.sample(rng)))
        .collect()
}

fn completion_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("chatcmpl-{}", random_alphanumeric(rng, 29))
}

fn tool_call_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("call_{}", random_alphanumeric(rng, 24))
}

fn simulated(endpoint: BuiltinEndpoint, error: &SimulatedError) -> HandlerResponse {
    tracing::warn!(
        path = endpoint.path(),
        status = error.status_code(),
        retry_after = ?error.retry_after(),
        "Injecting simulated error"
    );
    HandlerResponse::error(error.status_code(), &error.to_error_response())
}

fn bad_request(message: &str) -> HandlerResponse {
    HandlerResponse::error(400, &ErrorResponse::new(message))
}

/// Deserialize a request body that already passed shape validation. Bodies
/// that still fail to parse are treated as invalid input.
fn parse_body<T: DeserializeOwned>(body: &Value) -> Option<T> {
    match serde_json::from_value(body.clone()) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(error = %err, "Rejecting malformed request body");
            None
        }
    }
}

fn non_empty_str(body: &Value, key: &str) -> bool {
    body.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// `model` must be a non-empty string and `messages` a non-empty list
fn parse_chat_request(body: &Value) -> Option<ChatCompletionRequest> {
    let has_messages = body
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|m| !m.is_empty());
    if !non_empty_str(body, "model") || !has_messages {
        return None;
    }
    parse_body(body)
}

fn parse_image_request(body: &Value) -> Option<ImageGenerationRequest> {
    if !non_empty_str(body, "prompt") {
        return None;
    }
    parse_body(body)
}

/// POST /v1/chat/completions
pub struct ChatCompletionsHandler {
    ctx: Arc<SessionContext>,
}

impl ChatCompletionsHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn fixed(&self, request: &ChatCompletionRequest) -> Result<HandlerResponse, MockError> {
        let name = if request.declares_tools() {
            templates::TOOL_CALL
        } else if request.declares_functions() {
            templates::FUNCTION_CALL
        } else {
            templates::SIMPLE_CHAT
        };
        let body = self
            .ctx
            .templates()
            .create(name, &json!({ "model": request.model }))?;
        Ok(HandlerResponse::Json { status: 200, body })
    }

    /// Function or tool call shape with synthesized arguments
    fn call(
        &self,
        request: &ChatCompletionRequest,
        function: &FunctionDefinition,
        as_tool: bool,
    ) -> Result<HandlerResponse, MockError> {
        let created = self.ctx.now();
        let (id, message, arguments_len) = self.ctx.with_rng(|rng| {
            let id = completion_id(rng);
            let arguments =
                FakeDataGenerator::new(&mut *rng).arguments(function.parameters.as_ref())?;
            let arguments_len = arguments.chars().count();
            let call = FunctionCall {
                name: function.name.clone(),
                arguments,
            };
            let message = if as_tool {
                AssistantMessage::tool_calls(vec![ToolCall {
                    id: tool_call_id(rng),
                    call_type: "function".to_string(),
                    function: call,
                }])
            } else {
                AssistantMessage::function_call(call)
            };
            Ok::<_, MockError>((id, message, arguments_len))
        })?;

        let finish_reason = if as_tool { "tool_calls" } else { "function_call" };
        tracing::debug!(function = %function.name, as_tool, "Synthesized function call");
        let usage = Usage::from_chars(request.prompt_chars(), arguments_len);
        HandlerResponse::json(
            200,
            ChatCompletionResponse::new(
                id,
                created,
                request.model.clone(),
                message,
                finish_reason,
                usage,
            ),
        )
    }

    fn completion(&self, request: &ChatCompletionRequest) -> Result<HandlerResponse, MockError> {
        let content_type = ContentType::classify(&request.latest_message_text());
        let created = self.ctx.now();
        let (id, content) = self
            .ctx
            .with_rng(|rng| (completion_id(rng), content_type.pick(rng)));

        if request.stream {
            let identity = ChunkIdentity {
                id,
                model: request.model.clone(),
                created,
            };
            let handle = self.ctx.streams().open(identity, content, content_type);
            tracing::debug!(stream_id = handle.stream_id(), %content_type, "Streaming completion");
            return Ok(HandlerResponse::Stream(handle));
        }

        let usage = Usage::from_chars(request.prompt_chars(), content.chars().count());
        HandlerResponse::json(
            200,
            ChatCompletionResponse::new(
                id,
                created,
                request.model.clone(),
                AssistantMessage::text(content),
                "stop",
                usage,
            ),
        )
    }
}

#[async_trait]
impl RouteHandler for ChatCompletionsHandler {
    async fn handle(&self, request: MockRequest) -> Result<HandlerResponse, MockError> {
        let Some(chat) = parse_chat_request(&request.body) else {
            return Ok(bad_request(MISSING_FIELDS_MESSAGE));
        };

        tracing::info!(
            model = %chat.model,
            stream = chat.stream,
            messages = chat.messages.len(),
            "Chat completion request"
        );

        self.ctx.latency().delay_response().await;

        let endpoint = BuiltinEndpoint::ChatCompletions;
        if let Some(error) = self.ctx.maybe_inject(endpoint) {
            return Ok(simulated(endpoint, &error));
        }

        if self.ctx.use_fixed_responses() {
            return self.fixed(&chat);
        }
        if let Some(tool) = chat.selected_tool() {
            return self.call(&chat, tool, true);
        }
        if let Some(function) = chat.selected_function() {
            return self.call(&chat, function, false);
        }
        self.completion(&chat)
    }
}

/// POST /v1/images/generations
pub struct ImageGenerationsHandler {
    ctx: Arc<SessionContext>,
}

impl ImageGenerationsHandler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    fn generate(&self, request: &ImageGenerationRequest) -> Result<HandlerResponse, MockError> {
        let created = self.ctx.now();
        let data = self.ctx.with_rng(|rng| {
            (0..request.image_count())
                .map(|_| {
                    let (url, b64_json) = if request.wants_base64() {
                        (None, Some(PLACEHOLDER_PNG_B64.to_string()))
                    } else {
                        let name = random_alphanumeric(rng, 24);
                        (Some(format!("{IMAGE_HOST}/img-{name}.png")), None)
                    };
                    ImageData {
                        url,
                        b64_json,
                        revised_prompt: Some(request.prompt.clone()),
                    }
                })
                .collect::<Vec<_>>()
        });
        HandlerResponse::json(200, ImageGenerationResponse { created, data })
    }
}

#[async_trait]
impl RouteHandler for ImageGenerationsHandler {
    async fn handle(&self, request: MockRequest) -> Result<HandlerResponse, MockError> {
        let Some(image) = parse_image_request(&request.body) else {
            return Ok(bad_request(MISSING_PROMPT_MESSAGE));
        };

        tracing::info!(n = image.image_count(), size = ?image.size, "Image generation request");

        self.ctx.latency().delay_response().await;

        let endpoint = BuiltinEndpoint::ImageGenerations;
        if let Some(error) = self.ctx.maybe_inject(endpoint) {
            return Ok(simulated(endpoint, &error));
        }

        if self.ctx.use_fixed_responses() {
            let body = self
                .ctx
                .templates()
                .create(templates::IMAGE_GENERATION, &json!({}))?;
            return Ok(HandlerResponse::Json { status: 200, body });
        }
        self.generate(&image)
    }
}
