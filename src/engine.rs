use crate::context::{assemble_prompt, dataset_snapshot};
use crate::models::{CompletionRequest, LanguageModel};
use crate::session::{ChatMessage, Session};
use crate::settings::{resolve_effective_settings, GlobalConfigDefaults, RequestOverrides};
use tracing::{info, warn};

/// One chat turn: append the user message, build the prompt bundle from the
/// session's dataset and conversation, call the model, and append the reply.
/// A failed model call is converted into a displayable assistant message, so
/// every turn grows the conversation by exactly one user and one assistant
/// message.
pub async fn run_turn(
    session: &mut Session,
    model: &dyn LanguageModel,
    global: &GlobalConfigDefaults,
    user_text: String,
    overrides: RequestOverrides,
) -> ChatMessage {
    let eff = resolve_effective_settings(global, &session.settings, &overrides);
    session.conversation.append(ChatMessage::user(user_text));

    let snapshot = session
        .dataset
        .as_ref()
        .map(|d| dataset_snapshot(d, eff.context_columns))
        .unwrap_or_default();
    let messages = assemble_prompt(&snapshot, &session.conversation, eff.history_window);

    info!(session = %session.id, model = %eff.model, messages = messages.len(), "chat turn");
    let request = CompletionRequest {
        model: eff.model,
        messages,
        temperature: eff.temperature,
        max_tokens: eff.max_tokens,
    };
    let reply = match model.complete(request).await {
        Ok(content) => content,
        Err(err) => {
            warn!(session = %session.id, error = %err, "model call failed");
            err.user_message()
        }
    };
    let msg = ChatMessage::assistant(reply);
    session.conversation.append(msg.clone());
    msg
}
