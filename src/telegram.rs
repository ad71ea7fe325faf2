//! Thin long-polling adapter over the Telegram Bot API.
//!
//! Pass-through glue only: this module fetches updates, dispatches
//! commands and keyboard buttons, and sends back whatever string the
//! relay service produced. No quota or business logic lives here.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::HttpBackend;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::relay;

const POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

const BTN_PROFILE: &str = "👤 My profile";
const BTN_NEW_DIALOG: &str = "🔄 New dialog";

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    from: Option<Sender>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Long poll plus headroom.
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            token: token.to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let response = self
            .client
            .post(self.url("getUpdates"))
            .json(&json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("getUpdates failed: {e}")))?;

        let body: UpdatesResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("unreadable getUpdates response: {e}")))?;

        if !body.ok {
            return Err(AppError::Internal("getUpdates returned ok=false".into()));
        }
        Ok(body.result)
    }

    async fn send_message(&self, chat_id: i64, text: &str) {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "reply_markup": main_keyboard(),
        });
        let result = self
            .client
            .post(self.url("sendMessage"))
            .json(&payload)
            .send()
            .await;
        match result {
            Ok(r) if !r.status().is_success() => {
                tracing::error!(chat_id, status = r.status().as_u16(), "sendMessage rejected");
            }
            Err(e) => tracing::error!(chat_id, error = %e, "sendMessage failed"),
            _ => {}
        }
    }
}

fn main_keyboard() -> Value {
    json!({
        "keyboard": [[{ "text": BTN_PROFILE }, { "text": BTN_NEW_DIALOG }]],
        "resize_keyboard": true,
    })
}

/// Run the polling loop until the task is aborted. Each inbound message
/// is handled on its own task, so one user's slow backend call does not
/// stall the others.
pub async fn run(state: AppState, backend: Arc<HttpBackend>, client: TelegramClient) -> Result<()> {
    let client = Arc::new(client);
    let mut offset = 0i64;

    tracing::info!("chat transport started (long polling)");

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!(error = %e, "polling error, backing off");
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let state = state.clone();
            let backend = Arc::clone(&backend);
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                dispatch(&state, &backend, &client, message).await;
            });
        }
    }
}

async fn dispatch(
    state: &AppState,
    backend: &HttpBackend,
    client: &TelegramClient,
    message: Message,
) {
    let chat_id = message.chat.id;
    // Commands act on behalf of the sender, not the chat.
    let user_id = message.from.map(|f| f.id).unwrap_or(chat_id);
    let Some(text) = message.text else {
        return;
    };
    let text = text.trim();

    let reply = if text == "/start" || text.starts_with("/start ") {
        let code = text["/start".len()..].split_whitespace().next();
        relay::handle_start(state, user_id, code)
    } else if text == "/profile" || text == BTN_PROFILE {
        relay::handle_profile(state, user_id)
    } else if text == "/new_dialog" || text == BTN_NEW_DIALOG {
        relay::handle_new_dialog(backend, user_id).await
    } else if text.is_empty() || text.starts_with('/') {
        "🤔 Unknown command. Send /start, /profile, /new_dialog, or just a question.".to_string()
    } else {
        relay::handle_message(state, backend, user_id, text).await
    };

    client.send_message(chat_id, &reply).await;
}
