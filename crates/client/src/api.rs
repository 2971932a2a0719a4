// crates/client/src/api.rs
//! REST client for the ticket endpoints.

use std::time::Duration;

use async_trait::async_trait;
use helpdesk_core::{AgentContext, PageRequest, TicketSource};
use helpdesk_types::Ticket;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A failed API call. `Display` is the message shown to the agent.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Session expired. Please log in again.")]
    Unauthorized,

    #[error("You don't have permission to perform this action.")]
    Forbidden,

    #[error("The requested resource was not found.")]
    NotFound,

    #[error("{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("Too many requests. Please try again later.")]
    TooManyRequests,

    #[error("Server error. Please try again later.")]
    Server,

    #[error("Server is temporarily unavailable. Please try again later.")]
    BadGateway,

    #[error("Service is temporarily unavailable. Please try again later.")]
    Unavailable,

    #[error("{message}")]
    Other { status: u16, message: String },

    #[error("Network error. Please check your internet connection.")]
    Network(#[source] reqwest::Error),

    #[error("An unexpected error occurred. Please try again.")]
    Unexpected(#[source] reqwest::Error),
}

impl ApiError {
    /// Classify a non-2xx response by status, using the JSON body when it
    /// carries a message.
    pub fn from_status(status: StatusCode, body: &Value) -> Self {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        match status.as_u16() {
            400 => Self::BadRequest(
                message.unwrap_or_else(|| "Invalid request. Please check your input.".into()),
            ),
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            422 => {
                let mut messages = validation_messages(body);
                if messages.is_empty() {
                    messages.push(
                        message.unwrap_or_else(|| "Validation failed. Please check your input.".into()),
                    );
                }
                Self::Validation(messages)
            }
            429 => Self::TooManyRequests,
            500 => Self::Server,
            502 => Self::BadGateway,
            503 => Self::Unavailable,
            code => Self::Other {
                status: code,
                message: message
                    .unwrap_or_else(|| format!("An error occurred ({code}). Please try again.")),
            },
        }
    }

    /// The login is gone; the caller must clear auth and sign in again.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::NotFound => Some(404),
            Self::Validation(_) => Some(422),
            Self::TooManyRequests => Some(429),
            Self::Server => Some(500),
            Self::BadGateway => Some(502),
            Self::Unavailable => Some(503),
            Self::Other { status, .. } => Some(*status),
            Self::Network(_) | Self::Unexpected(_) => None,
        }
    }
}

/// Field-keyed `errors` of a 422, flattened in field order.
fn validation_messages(body: &Value) -> Vec<String> {
    let Some(errors) = body.get("errors").and_then(Value::as_object) else {
        return Vec::new();
    };
    errors
        .values()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>(),
            other => vec![value_text(other)],
        })
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(context: &AgentContext) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::Unexpected)?;
        Ok(Self {
            http,
            base_url: context.endpoints.api_base_url.clone(),
            token: context.token.clone(),
        })
    }

    /// `POST <base>/<path>` with a JSON body; the decoded JSON reply.
    pub async fn post(&self, path: &str, body: &impl serde::Serialize) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            let err = ApiError::from_status(status, &body);
            warn!(%url, status = status.as_u16(), error = %err, "API request failed");
            return Err(err);
        }
        debug!(%url, status = status.as_u16(), "API request ok");
        response.json::<Value>().await.map_err(ApiError::Unexpected)
    }
}

fn classify_send_error(e: reqwest::Error) -> ApiError {
    if e.is_builder() {
        ApiError::Unexpected(e)
    } else {
        ApiError::Network(e)
    }
}

#[async_trait]
impl TicketSource for ApiClient {
    type Error = ApiError;

    async fn fetch_tickets(&self, request: PageRequest) -> Result<Option<Vec<Ticket>>, ApiError> {
        let body = self.post("getTickets", &request).await?;
        let Some(data) = body.get("data").filter(|d| d.is_array()) else {
            return Ok(None);
        };
        // Rows that fail to decode are skipped rather than failing the page.
        let tickets = data
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|row| match serde_json::from_value::<Ticket>(row.clone()) {
                Ok(ticket) => Some(ticket),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable ticket row");
                    None
                }
            })
            .collect();
        Ok(Some(tickets))
    }
}
