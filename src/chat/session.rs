use super::router::{self, DispatchError, Flow, Route};
use super::store::{AwaitingGuard, ConversationStore};
use crate::ai::{Backend, ChatResult};
use crate::types::{ChatMessage, UserInput};
use std::sync::Arc;

pub const TEXT_ERROR: &str = "Произошла ошибка при обработке запроса. Проверьте подключение к API.";
pub const IMAGE_ERROR: &str =
    "Произошла ошибка при генерации изображения. Проверьте подключение к API.";
pub const VISION_ERROR: &str =
    "Произошла ошибка при анализе изображения. Проверьте подключение к API.";
pub const CODE_ERROR: &str = "Произошла ошибка при выполнении кода. Проверьте подключение к API.";

const BASE64_PNG_PREFIX: &str = "data:image/png;base64,";
const CODE_PREVIEW_CHARS: usize = 30;

impl Flow {
    /// Fixed assistant reply used when the flow's gateway call fails.
    pub fn error_text(self) -> &'static str {
        match self {
            Flow::Text => TEXT_ERROR,
            Flow::ImageGeneration => IMAGE_ERROR,
            Flow::ImageAnalysis => VISION_ERROR,
            Flow::CodeExecution => CODE_ERROR,
        }
    }
}

/// Owns the conversation and the backend; every user action goes through here.
#[derive(Clone)]
pub struct ChatSession {
    store: Arc<ConversationStore>,
    backend: Arc<dyn Backend>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_store(Arc::new(ConversationStore::new()), backend)
    }

    pub fn with_store(store: Arc<ConversationStore>, backend: Arc<dyn Backend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Run one user action to completion.
    pub async fn dispatch(&self, input: UserInput) -> Result<Flow, DispatchError> {
        let pending = self.begin(input)?;
        let flow = pending.flow();
        pending.complete().await;
        Ok(flow)
    }

    /// Phase one: route the input, echo it and raise the awaiting flag.
    /// Nothing touches the network until the returned flow is completed.
    pub fn begin(&self, input: UserInput) -> Result<PendingFlow, DispatchError> {
        let route = router::route(input)?;
        tracing::debug!(flow = %route.flow(), "dispatching");
        self.store.append(ChatMessage::user(route.echo()));
        let awaiting = AwaitingGuard::acquire(Arc::clone(&self.store));
        Ok(PendingFlow {
            session: self.clone(),
            route,
            _awaiting: awaiting,
        })
    }

    async fn call(&self, route: &Route) -> ChatResult<ChatMessage> {
        match route {
            Route::Text { message } => {
                let reply = self.backend.send_text(message).await?;
                Ok(ChatMessage::assistant(reply))
            }
            Route::GenerateImage { prompt, .. } => {
                let image = self.backend.generate_image(prompt).await?;
                Ok(ChatMessage::assistant_image(
                    format!("Вот сгенерированное изображение по запросу: \"{prompt}\""),
                    embeddable_image(&image),
                ))
            }
            Route::AnalyzeImage { file, question } => {
                let result = self.backend.analyze_image(file, Some(question.as_str())).await?;
                Ok(ChatMessage::assistant(result))
            }
            Route::ExecuteCode { program } => {
                let execution = self.backend.execute_code(program).await?;
                Ok(ChatMessage::assistant_code(
                    format!(
                        "Результат выполнения кода для: \"{}...\"",
                        preview(program, CODE_PREVIEW_CHARS)
                    ),
                    execution.code,
                    execution.execution_result,
                ))
            }
        }
    }
}

/// Phase two of a dispatched action. Dropping it before completion still
/// releases the awaiting flag.
pub struct PendingFlow {
    session: ChatSession,
    route: Route,
    _awaiting: AwaitingGuard,
}

impl PendingFlow {
    pub fn flow(&self) -> Flow {
        self.route.flow()
    }

    pub async fn complete(self) {
        let flow = self.flow();
        let reply = match self.session.call(&self.route).await {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(%flow, error = %err, "gateway call failed");
                ChatMessage::assistant(flow.error_text())
            }
        };
        self.session.store.append(reply);
    }
}

/// Wrap a bare base64 payload so it can be embedded directly.
pub fn embeddable_image(payload: &str) -> String {
    let payload = payload.trim();
    if payload.starts_with("data:image")
        || payload.starts_with("http://")
        || payload.starts_with("https://")
    {
        payload.to_string()
    } else {
        format!("{BASE64_PNG_PREFIX}{payload}")
    }
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
