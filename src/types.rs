use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(u64);

impl MessageId {
    pub fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// Kind-specific payload of a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageContent {
    Text,
    /// `data` is always embeddable: a `data:image/...` URI or an http(s) URL.
    Image { data: String },
    Code { code: String, output: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: OffsetDateTime,
    pub content: MessageContent,
}

impl ChatMessage {
    fn new(sender: Sender, text: impl Into<String>, content: MessageContent) -> Self {
        Self {
            id: MessageId::next(),
            text: text.into(),
            sender,
            timestamp: OffsetDateTime::now_utc(),
            content,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, MessageContent::Text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text, MessageContent::Text)
    }

    pub fn assistant_image(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(
            Sender::Assistant,
            text,
            MessageContent::Image { data: data.into() },
        )
    }

    pub fn assistant_code(
        text: impl Into<String>,
        code: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::new(
            Sender::Assistant,
            text,
            MessageContent::Code {
                code: code.into(),
                output: output.into(),
            },
        )
    }
}

/// A file picked by the user, sent along with the pending input.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

/// One user action: whatever sits in the composer plus an optional upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserInput {
    pub text: String,
    pub attachment: Option<Attachment>,
    pub question: Option<String>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn upload(text: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            text: text.into(),
            attachment: Some(attachment),
            question: None,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }
}
