use bon::Builder;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

pub type HeadersMap = BTreeMap<String, String>;

/// Values captured from earlier responses, keyed by store name
pub type Store = Map<String, Value>;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Outgoing request descriptor handed to handlers
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct Request {
    #[builder(into)]
    pub url: String,
    #[builder(into, default = String::from("GET"))]
    pub method: String,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub timeout: Duration,
    #[builder(default)]
    pub headers: HeadersMap,
    /// Request payload
    pub data: Option<Value>,
}

/// Received response with its decoded views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HeadersMap,
    /// Parsed JSON body, when the body is valid JSON
    pub json: Option<Value>,
    /// `json` when present, otherwise the text body as a string value
    pub body: Option<Value>,
    /// Body decoded as UTF-8
    pub text: Option<String>,
    /// Raw body bytes
    pub buffer: Option<Bytes>,
}

impl Response {
    /// Build a response from its raw parts, deriving the text and JSON views
    pub fn from_parts(status: u16, headers: HeadersMap, buffer: Bytes) -> Self {
        let text = std::str::from_utf8(&buffer).ok().map(str::to_owned);

        let json = text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| serde_json::from_str::<Value>(t).ok());

        let mut response = Self {
            status,
            headers,
            json,
            body: None,
            text,
            buffer: Some(buffer),
        };

        if response.json.is_none() && response.declares_json() && !response.is_empty() {
            tracing::warn!(
                status,
                "Response declares a JSON content type but the body is not valid JSON"
            );
        }

        response.body = response
            .json
            .clone()
            .or_else(|| response.text.clone().map(Value::String));

        response
    }

    /// Read a `reqwest` response to completion
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let buffer = response.bytes().await?;
        tracing::debug!(status, size = buffer.len(), "Response body received");

        Ok(Self::from_parts(status, headers, buffer))
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        self.header("content-type")?.parse().ok()
    }

    pub fn declares_json(&self) -> bool {
        self.content_type().is_some_and(|mime| {
            mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON)
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_empty(&self) -> bool {
        self.buffer.as_ref().is_none_or(|b| b.is_empty())
    }
}

/// A named handler invocation with optional data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HandlerCall {
    pub fn new(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Reference to another registered interaction handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentHandler {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ParentHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }
}

/// Retry settings attached to a spec
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    pub count: u32,
    pub delay: Duration,
    /// Name of the retry handler deciding whether to try again
    pub strategy: Option<String>,
}

impl RetryOptions {
    pub fn new(count: u32, delay: Duration) -> Self {
        Self {
            count,
            delay,
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, handler: impl Into<String>) -> Self {
        self.strategy = Some(handler.into());
        self
    }
}

/// A test case under construction. Spec handlers receive it mutably.
#[derive(Debug, Clone)]
pub struct Spec {
    pub id: Uuid,
    pub name: Option<String>,
    pub request: Request,
    pub expectations: Vec<HandlerCall>,
    /// Store name -> capture expression
    pub stores: BTreeMap<String, String>,
    pub retry: Option<RetryOptions>,
    pub states: Vec<HandlerCall>,
    pub interactions: Vec<ParentHandler>,
}

impl Spec {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: None,
            request,
            expectations: Vec::new(),
            stores: BTreeMap::new(),
            retry: None,
            states: Vec::new(),
            interactions: Vec::new(),
        }
    }

    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.request.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_json(&mut self, data: Value) -> &mut Self {
        self.request.data = Some(data);
        self
    }

    pub fn expect(&mut self, handler: impl Into<String>, data: Option<Value>) -> &mut Self {
        self.expectations.push(HandlerCall::new(handler, data));
        self
    }

    pub fn store(&mut self, name: impl Into<String>, expression: impl Into<String>) -> &mut Self {
        self.stores.insert(name.into(), expression.into());
        self
    }

    pub fn retry(&mut self, options: RetryOptions) -> &mut Self {
        self.retry = Some(options);
        self
    }

    pub fn set_state(&mut self, handler: impl Into<String>, data: Option<Value>) -> &mut Self {
        self.states.push(HandlerCall::new(handler, data));
        self
    }

    pub fn use_interaction(
        &mut self,
        handler: impl Into<String>,
        data: Option<Value>,
    ) -> &mut Self {
        self.interactions.push(ParentHandler {
            name: handler.into(),
            data,
        });
        self
    }
}

fn default_strict() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

/// Mock server setup entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Interaction {
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Strict interactions must match the request exactly
    #[builder(default = true)]
    #[serde(default = "default_strict")]
    pub strict: bool,
    pub request: MockRequest,
    pub response: MockResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct MockRequest {
    #[builder(into, default = default_method())]
    #[serde(default = "default_method")]
    pub method: String,
    #[builder(into)]
    pub path: String,
    #[builder(default)]
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[builder(default)]
    #[serde(default)]
    pub headers: HeadersMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct MockResponse {
    #[builder(default = 200)]
    pub status: u16,
    #[builder(default)]
    #[serde(default)]
    pub headers: HeadersMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// What an interaction handler may hand back
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutput {
    Interaction(Interaction),
    Parent(ParentHandler),
    Interactions(Vec<Interaction>),
    Parents(Vec<ParentHandler>),
}

impl From<Interaction> for InteractionOutput {
    fn from(value: Interaction) -> Self {
        Self::Interaction(value)
    }
}

impl From<ParentHandler> for InteractionOutput {
    fn from(value: ParentHandler) -> Self {
        Self::Parent(value)
    }
}

impl From<Vec<Interaction>> for InteractionOutput {
    fn from(value: Vec<Interaction>) -> Self {
        Self::Interactions(value)
    }
}

impl From<Vec<ParentHandler>> for InteractionOutput {
    fn from(value: Vec<ParentHandler>) -> Self {
        Self::Parents(value)
    }
}
