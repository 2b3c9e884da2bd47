// OpenAI API Types
// Wire shapes for the emulated Chat Completions and Images endpoints.
// Reference: https://platform.openai.com/docs/api-reference/chat

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const OBJECT_CHAT_COMPLETION: &str = "chat.completion";
pub const OBJECT_CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";

/// Optional request knobs accept any JSON. A value of the wrong shape reads
/// as the field's default instead of rejecting the whole request.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .map(|value| serde_json::from_value(value).unwrap_or_default())
        .collect())
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Function,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One typed part of a multi-part message body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Message content is either a plain string or an array of parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten the content into plain text; non-text parts are skipped.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A message in a chat conversation (request side). Entries that are not
/// objects read as an empty message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Role,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Message {
    /// Text of the message, empty when it carries no content
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::as_text)
            .unwrap_or_default()
    }
}

/// A tool call made by the assistant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// A function call; `arguments` is a JSON document serialized as a string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A function definition for function calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Legacy `function_call` selector: `"auto"`, `"none"` or `{"name": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionCallChoice {
    Mode(String),
    Named { name: String },
}

/// Tool choice option
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Named {
        #[serde(rename = "type")]
        choice_type: String,
        function: ToolChoiceFunction,
    },
}

/// Function specification for tool choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// Chat completion request. Only `model` and `messages` are strict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(deserialize_with = "lenient_messages")]
    pub messages: Vec<Message>,
    #[serde(default, deserialize_with = "lenient")]
    pub stream: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionDefinition>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallChoice>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatCompletionRequest {
    /// Text of the most recent message, used for content classification
    pub fn latest_message_text(&self) -> String {
        self.messages.last().map(Message::text).unwrap_or_default()
    }

    /// Total characters across all message texts
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.text().chars().count()).sum()
    }

    pub fn declares_functions(&self) -> bool {
        self.functions.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn declares_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// The legacy function the caller wants invoked: the one named by
    /// `function_call`, falling back to the first declared function.
    pub fn selected_function(&self) -> Option<&FunctionDefinition> {
        let functions = self.functions.as_ref()?;
        if let Some(FunctionCallChoice::Named { name }) = &self.function_call {
            if let Some(found) = functions.iter().find(|f| &f.name == name) {
                return Some(found);
            }
        }
        functions.first()
    }

    /// The tool the caller wants invoked: the one named by `tool_choice`,
    /// falling back to the first declared tool.
    pub fn selected_tool(&self) -> Option<&FunctionDefinition> {
        let tools = self.tools.as_ref()?;
        if let Some(ToolChoice::Named { function, .. }) = &self.tool_choice {
            if let Some(found) = tools.iter().find(|t| t.function.name == function.name) {
                return Some(&found.function);
            }
        }
        tools.first().map(|t| &t.function)
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Approximate usage from character counts: one token per four characters.
    pub fn from_chars(prompt_chars: usize, completion_chars: usize) -> Self {
        let prompt_tokens = (prompt_chars / 4) as u32;
        let completion_tokens = (completion_chars / 4) as u32;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The assistant message inside a completion choice. `content` is
/// serialized as `null` when a function or tool call is returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            function_call: None,
            tool_calls: None,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            function_call: Some(call),
            tool_calls: None,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            function_call: None,
            tool_calls: Some(calls),
        }
    }
}

/// A choice in the completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub logprobs: Option<Value>,
    pub finish_reason: String,
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn new(
        id: String,
        created: i64,
        model: String,
        message: AssistantMessage,
        finish_reason: &str,
        usage: Usage,
    ) -> Self {
        Self {
            id,
            object: OBJECT_CHAT_COMPLETION.to_string(),
            created,
            model,
            choices: vec![Choice {
                index: 0,
                message,
                logprobs: None,
                finish_reason: finish_reason.to_string(),
            }],
            usage,
        }
    }
}

/// Delta content in streaming response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A choice in streaming response. `finish_reason` stays `null` until the
/// terminal chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

/// Streaming chat completion chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    /// Content family of the stream, present on the first and terminal chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ChatCompletionChunk {
    pub fn new(id: String, model: String, created: i64) -> Self {
        Self {
            id,
            object: OBJECT_CHAT_COMPLETION_CHUNK.to_string(),
            created,
            model,
            choices: vec![],
            content_type: None,
        }
    }

    pub fn with_content(mut self, content: String, include_role: bool) -> Self {
        self.choices = vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: include_role.then_some(Role::Assistant),
                content: Some(content),
            },
            finish_reason: None,
        }];
        self
    }

    pub fn with_finish(mut self, reason: &str) -> Self {
        self.choices = vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some(reason.to_string()),
        }];
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Image generation request. Only `prompt` is strict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

impl ImageGenerationRequest {
    /// Requested image count, clamped to what the real API accepts
    pub fn image_count(&self) -> u32 {
        self.n.unwrap_or(1).clamp(1, 10)
    }

    pub fn wants_base64(&self) -> bool {
        self.response_format.as_deref() == Some("b64_json")
    }
}

/// One generated image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

/// Image generation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}

/// OpenAI-style error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Bare envelope carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: None,
                code: None,
            },
        }
    }

    pub fn typed(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: Some(error_type.into()),
                code: Some(code.into()),
            },
        }
    }

    pub fn rate_limit() -> Self {
        Self::typed(
            "Rate limit exceeded. Please try again later.",
            "rate_limit_error",
            "rate_limit_exceeded",
        )
    }

    pub fn content_policy() -> Self {
        Self::typed(
            "Your request was rejected as a result of our safety system.",
            "invalid_request_error",
            "content_policy_violation",
        )
    }

    pub fn internal() -> Self {
        Self::new("Internal server error in mock")
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_deserialization() {
        let json = r#"{
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": [{"type": "text", "text": "Hello!"}]}
            ],
            "stream": true
        }"#;

        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages.len(), 2);
        assert!(request.stream);
        assert_eq!(request.latest_message_text(), "Hello!");
    }

    #[test]
    fn test_selected_tool_honours_tool_choice() {
        let json = r#"{
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [
                {"type": "function", "function": {"name": "first"}},
                {"type": "function", "function": {"name": "second"}}
            ],
            "tool_choice": {"type": "function", "function": {"name": "second"}}
        }"#;
        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert!(request.declares_tools());
        assert_eq!(request.selected_tool().unwrap().name, "second");
    }

    #[test]
    fn test_selected_function_defaults_to_first() {
        let json = r#"{
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "functions": [{"name": "lookup"}, {"name": "other"}],
            "function_call": "auto"
        }"#;
        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.selected_function().unwrap().name, "lookup");
    }

    #[test]
    fn test_function_call_message_has_null_content() {
        let message = AssistantMessage::function_call(FunctionCall {
            name: "lookup".into(),
            arguments: "{}".into(),
        });
        let json = serde_json::to_value(&message).unwrap();
        assert!(json["content"].is_null());
        assert_eq!(json["function_call"]["name"], "lookup");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_streaming_chunk_finish_reason_is_null() {
        let chunk = ChatCompletionChunk::new("chatcmpl-test".into(), "gpt-4".into(), 1234567890)
            .with_content("H".into(), true);

        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["delta"]["content"], "H");
        assert_eq!(json["choices"][0]["delta"]["role"], "assistant");
        assert!(json["choices"][0]["finish_reason"].is_null());
        assert!(json.get("content_type").is_none());
    }

    #[test]
    fn test_usage_from_chars() {
        let usage = Usage::from_chars(10, 41);
        assert_eq!(usage.prompt_tokens, 2);
        assert_eq!(usage.completion_tokens, 10);
        assert_eq!(usage.total_tokens, 12);
    }

    #[test]
    fn test_error_envelope_shapes() {
        let bare = serde_json::to_value(ErrorResponse::new("boom")).unwrap();
        assert_eq!(bare, serde_json::json!({"error": {"message": "boom"}}));

        let rate = serde_json::to_value(ErrorResponse::rate_limit()).unwrap();
        assert_eq!(rate["error"]["type"], "rate_limit_error");
        assert_eq!(rate["error"]["code"], "rate_limit_exceeded");
    }

    #[test]
    fn test_chat_request_tolerates_odd_optional_fields() {
        let json = r#"{
            "model": "gpt-4",
            "messages": [
                {"content": "no role"},
                {"role": "critic", "content": 5},
                "not an object",
                {"role": "user", "content": "hi"}
            ],
            "stream": null,
            "max_tokens": -1,
            "temperature": "hot",
            "tool_choice": {"type": "function"},
            "tools": [{"type": "function"}]
        }"#;
        let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, Role::Unknown);
        assert_eq!(request.messages[1].role, Role::Unknown);
        assert!(request.messages[1].content.is_none());
        assert_eq!(request.latest_message_text(), "hi");
        assert!(!request.stream);
        assert!(request.max_tokens.is_none());
        assert!(request.temperature.is_none());
        assert!(request.tool_choice.is_none());
        assert!(!request.declares_tools());
    }

    #[test]
    fn test_image_request_tolerates_negative_count() {
        let request: ImageGenerationRequest =
            serde_json::from_str(r#"{"prompt": "x", "n": -1, "size": 512}"#).unwrap();
        assert_eq!(request.image_count(), 1);
        assert!(request.size.is_none());
    }

    #[test]
    fn test_image_request_count_is_clamped() {
        let request: ImageGenerationRequest =
            serde_json::from_str(r#"{"prompt": "a cat", "n": 40}"#).unwrap();
        assert_eq!(request.image_count(), 10);
        assert!(!request.wants_base64());
    }
}
