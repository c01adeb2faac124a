//! Telegram Bot API transport. Translates between the wire (getUpdates,
//! sendMessage, sendPhoto) and the transport-neutral `Incoming`/`Reply` types;
//! nothing outside this module knows the chat service is Telegram.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::channel::{ChatChannel, DeliveryError, Incoming, Reply};
use crate::dialogue::Dialogue;
use crate::error::Result;

/// Long-poll wait passed to getUpdates, in seconds. Kept short so a shutdown
/// flag is noticed promptly.
const LONG_POLL_SECS: u64 = 10;

/// Callback data prefix for the inline remove button.
const REMOVE_PREFIX: &str = "remove:";

// The agent timeout must exceed the long-poll wait or every idle getUpdates
// would be reported as an error.
static HTTP_AGENT: Lazy<ureq::Agent> = Lazy::new(|| {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(LONG_POLL_SECS + 20)))
        .build()
        .into()
});

// ---------- wire shapes ----------

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

/// Classify one update into a conversation event, if it carries one.
fn classify(update: &Update) -> Option<(i64, Incoming)> {
    if let Some(message) = &update.message {
        let text = message.text.clone()?;
        return Some((message.chat.id, Incoming::Text(text)));
    }
    if let Some(callback) = &update.callback_query {
        let data = callback.data.as_deref()?;
        let item_id = data.strip_prefix(REMOVE_PREFIX)?;
        return Some((callback.from.id, Incoming::RemoveItem(item_id.to_string())));
    }
    None
}

/// Build the Bot API method name and JSON payload for one outbound reply.
fn reply_payload(recipient: i64, reply: &Reply) -> (&'static str, serde_json::Value) {
    let reply_markup = if let Some(rows) = &reply.keyboard {
        let keyboard: Vec<Vec<serde_json::Value>> = rows
            .iter()
            .map(|row| row.iter().map(|b| serde_json::json!({"text": b})).collect())
            .collect();
        Some(serde_json::json!({
            "keyboard": keyboard,
            "resize_keyboard": true,
            "one_time_keyboard": true
        }))
    } else if let Some(remove) = &reply.remove {
        Some(serde_json::json!({
            "inline_keyboard": [[{
                "text": remove.label,
                "callback_data": format!("{REMOVE_PREFIX}{}", remove.item_id)
            }]]
        }))
    } else {
        None
    };

    let mut payload = match &reply.photo_url {
        Some(url) => serde_json::json!({
            "chat_id": recipient,
            "photo": url,
            "caption": reply.text,
            "parse_mode": "HTML"
        }),
        None => serde_json::json!({
            "chat_id": recipient,
            "text": reply.text,
            "parse_mode": "HTML",
            "disable_web_page_preview": false
        }),
    };
    if let Some(markup) = reply_markup {
        payload["reply_markup"] = markup;
    }

    let method = if reply.photo_url.is_some() {
        "sendPhoto"
    } else {
        "sendMessage"
    };
    (method, payload)
}

fn delivery_error(err: ureq::Error) -> DeliveryError {
    match err {
        ureq::Error::StatusCode(403) => DeliveryError::Blocked,
        ureq::Error::StatusCode(400) => DeliveryError::BadRequest("rejected by chat API".into()),
        other => DeliveryError::Other(other.to_string()),
    }
}

/// The Bot API client. Cheap to share; all state lives server-side and in the
/// update offset the caller owns.
pub struct Telegram {
    token: String,
}

impl Telegram {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    /// One long poll. Advances `offset` past every update it returns.
    pub fn poll_updates(&self, offset: &mut i64) -> Result<Vec<(i64, Incoming)>> {
        let payload = serde_json::json!({
            "offset": *offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message", "callback_query"]
        });
        let response: UpdatesResponse = HTTP_AGENT
            .post(&self.method_url("getUpdates"))
            .send_json(&payload)?
            .into_body()
            .read_json()?;

        let mut events = Vec::new();
        for update in &response.result {
            if update.update_id >= *offset {
                *offset = update.update_id + 1;
            }
            if let Some(callback) = &update.callback_query {
                // ack so the client stops showing the spinner
                let _ = HTTP_AGENT
                    .post(&self.method_url("answerCallbackQuery"))
                    .send_json(&serde_json::json!({"callback_query_id": callback.id}));
            }
            if let Some(event) = classify(update) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

impl ChatChannel for Telegram {
    fn send(&self, recipient: i64, reply: &Reply) -> std::result::Result<(), DeliveryError> {
        let (method, payload) = reply_payload(recipient, reply);
        HTTP_AGENT
            .post(&self.method_url(method))
            .send_json(&payload)
            .map_err(delivery_error)?;
        Ok(())
    }
}

/// The conversation side of the process: long-poll updates and feed them to
/// the engine, in arrival order, until shutdown. Single-threaded on purpose;
/// it is what serializes turns per owner.
pub fn run_update_loop(telegram: &Telegram, dialogue: &mut Dialogue, running: &Arc<AtomicBool>) {
    let mut offset = 0i64;
    while running.load(Ordering::SeqCst) {
        let events = match telegram.poll_updates(&mut offset) {
            Ok(events) => events,
            Err(e) => {
                eprintln!("  [ERROR] getUpdates: {}", e);
                std::thread::sleep(Duration::from_secs(3));
                continue;
            }
        };

        for (owner, incoming) in events {
            let replies = match dialogue.handle(owner, &incoming) {
                Ok(replies) => replies,
                Err(e) => {
                    eprintln!("  [ERROR] owner {}: {}", owner, e);
                    continue;
                }
            };
            for reply in &replies {
                if let Err(e) = telegram.send(owner, reply) {
                    eprintln!("  [ERROR] reply to {}: {}", owner, e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_text_and_callback() {
        let response: UpdatesResponse = serde_json::from_str(
            r#"{"ok": true, "result": [
                {"update_id": 10, "message": {"chat": {"id": 42}, "text": "hello"}},
                {"update_id": 11, "callback_query": {"id": "cb1", "from": {"id": 42},
                    "data": "remove:abc-123"}},
                {"update_id": 12, "message": {"chat": {"id": 43}}}
            ]}"#,
        )
        .unwrap();

        let events: Vec<_> = response.result.iter().filter_map(classify).collect();
        assert_eq!(
            events,
            vec![
                (42, Incoming::Text("hello".to_string())),
                (42, Incoming::RemoveItem("abc-123".to_string())),
            ]
        );
    }

    #[test]
    fn test_keyboard_payload_shape() {
        let reply = Reply::with_keyboard("pick", vec![vec!["a".to_string(), "b".to_string()]]);
        let (method, payload) = reply_payload(7, &reply);
        assert_eq!(method, "sendMessage");
        assert_eq!(payload["chat_id"], 7);
        assert_eq!(payload["parse_mode"], "HTML");
        assert_eq!(payload["reply_markup"]["keyboard"][0][1]["text"], "b");
    }

    #[test]
    fn test_remove_button_payload_shape() {
        let reply = Reply::item_card("card", "Remove", "id-9");
        let (_, payload) = reply_payload(7, &reply);
        assert_eq!(
            payload["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "remove:id-9"
        );
    }

    #[test]
    fn test_photo_payload_uses_send_photo() {
        let reply = Reply::photo("https://img/x.jpg", "caption");
        let (method, payload) = reply_payload(7, &reply);
        assert_eq!(method, "sendPhoto");
        assert_eq!(payload["photo"], "https://img/x.jpg");
        assert_eq!(payload["caption"], "caption");
    }

    #[test]
    fn test_delivery_error_mapping() {
        assert_eq!(
            delivery_error(ureq::Error::StatusCode(403)),
            DeliveryError::Blocked
        );
        assert!(matches!(
            delivery_error(ureq::Error::StatusCode(400)),
            DeliveryError::BadRequest(_)
        ));
        assert!(matches!(
            delivery_error(ureq::Error::StatusCode(500)),
            DeliveryError::Other(_)
        ));
    }
}
