//! Request/response access to the chat backend.
//!
//! The engine only knows the [`Transport`] trait. [`HttpTransport`] is the
//! production adapter: a JSON GET for the conversation snapshot and a
//! multipart POST for outgoing messages, routed to the callback endpoint when
//! no operator is online.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Url;
use tracing::{debug, warn};

use chatsync_shared::protocol::ConversationResponse;
use chatsync_shared::{ConversationSnapshot, OutgoingPost, TransportError};

/// Default per-request timeout. Kept below the poll interval so a hung
/// request cannot outlive the next tick by much.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the current conversation snapshot.
    async fn fetch_conversation(&self) -> Result<ConversationSnapshot, TransportError>;

    /// Post a message, or a callback request when `post.is_callback` is set.
    async fn post_message(&self, post: &OutgoingPost) -> Result<(), TransportError>;
}

/// Absolute URLs of the three backend routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    pub conversation: Url,
    pub post_message: Url,
    pub callback: Url,
}

impl Routes {
    /// Resolve route paths against `base_url`.
    pub fn resolve(
        base_url: &str,
        conversation: &str,
        post_message: &str,
        callback: &str,
    ) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::Route(format!("{base_url}: {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| TransportError::Route(format!("{path}: {e}")))
        };
        Ok(Self {
            conversation: join(conversation)?,
            post_message: join(post_message)?,
            callback: join(callback)?,
        })
    }

    pub fn for_post(&self, post: &OutgoingPost) -> &Url {
        if post.is_callback {
            &self.callback
        } else {
            &self.post_message
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    routes: Routes,
}

impl HttpTransport {
    pub fn new(routes: Routes, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, routes })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_conversation(&self) -> Result<ConversationSnapshot, TransportError> {
        let response = self
            .client
            .get(self.routes.conversation.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %self.routes.conversation, "conversation fetch rejected");
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let snapshot = ConversationResponse::decode_snapshot(&body)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        debug!(
            online = snapshot.operator_online,
            messages = snapshot.messages.len(),
            "conversation fetched"
        );
        Ok(snapshot)
    }

    async fn post_message(&self, post: &OutgoingPost) -> Result<(), TransportError> {
        let form = post
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        let url = self.routes.for_post(post).clone();
        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %url, "message post rejected");
            return Err(TransportError::Status(status.as_u16()));
        }

        debug!(callback = post.is_callback, len = post.message.len(), "message posted");
        Ok(())
    }
}
