//! Messaging-channel abstraction. The conversation engine and the poller only
//! ever talk to these types; the Telegram transport lives in `telegram.rs`.

use thiserror::Error;

/// Why a delivery attempt failed, as far as the poll cycle cares.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient is unreachable for good (blocked the bot, deleted the
    /// account). Their tracked items should be dropped.
    #[error("recipient unreachable or blocked")]
    Blocked,

    /// The payload itself was rejected; skip this one notification only.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Anything else (network, rate limit, server error). Log and move on.
    #[error("delivery failed: {0}")]
    Other(String),
}

/// An inbound conversation event, already stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A plain-text reply (menu choice or free text).
    Text(String),
    /// The opaque id of a tracked item the user asked to remove.
    RemoveItem(String),
}

/// A "remove this item" action attached to an item card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveAction {
    pub label: String,
    pub item_id: String,
}

/// An outbound message. `keyboard` is a one-of-N choice grid mirroring the
/// valid input domain of the step that sent it; `remove` renders as an inline
/// action button on item cards.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Vec<Vec<String>>>,
    pub remove: Option<RemoveAction>,
    pub photo_url: Option<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            remove: None,
            photo_url: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            keyboard: Some(rows),
            ..Self::text(text)
        }
    }

    /// One-column keyboard, one option per row.
    pub fn with_options(text: impl Into<String>, options: impl IntoIterator<Item = String>) -> Self {
        Self::with_keyboard(text, options.into_iter().map(|o| vec![o]).collect())
    }

    pub fn item_card(text: impl Into<String>, label: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            remove: Some(RemoveAction {
                label: label.into(),
                item_id: item_id.into(),
            }),
            ..Self::text(text)
        }
    }

    pub fn photo(url: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            photo_url: Some(url.into()),
            ..Self::text(caption)
        }
    }
}

/// Push-style delivery to one recipient. Implemented by the real transport and
/// by test stubs; injected into the poller so the cycle never names Telegram.
pub trait ChatChannel {
    fn send(&self, recipient: i64, reply: &Reply) -> std::result::Result<(), DeliveryError>;
}

/// Escape user-derived text for HTML message bodies.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
