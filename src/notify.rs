//! Chat delivery.
//!
//! One message per call, one blocking request at a time.  A 429 reply that
//! carries `parameters.retry_after` is retried after that many seconds, up
//! to [`MAX_ATTEMPTS`] requests in total.  After the last request, whatever
//! its outcome, the caller's pacing delay is slept.
//!
//! Nothing here returns an error to the caller: failures are logged and
//! reported as a [`Delivery`] value.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Messages and replies
// ---------------------------------------------------------------------------

/// Requests per message, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Bot token and target chat.
#[derive(Clone)]
pub struct Credentials {
    pub token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Body of a `sendMessage` call.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    pub disable_web_page_preview: bool,
}

/// Raw HTTP reply from the chat endpoint.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

/// The subset of a Bot API error body we act on.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration, body: String },
}

impl DeliveryError {
    fn from_reply(reply: Reply) -> Self {
        let parsed: ApiError = serde_json::from_str(&reply.body).unwrap_or_default();
        match parsed {
            ApiError {
                error_code: Some(429),
                parameters:
                    Some(ResponseParameters {
                        retry_after: Some(secs),
                    }),
                ..
            } => DeliveryError::RateLimited {
                retry_after: Duration::from_secs(secs),
                body: reply.body,
            },
            ApiError {
                description: Some(description),
                ..
            } => DeliveryError::Rejected {
                status: reply.status,
                body: description,
            },
            _ => DeliveryError::Rejected {
                status: reply.status,
                body: reply.body,
            },
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Rejected, unreachable, or still rate limited after every attempt.
    Failed,
    /// No credentials, nothing was attempted.
    Skipped,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// The seam between the notifier and the network.
pub trait ChatTransport {
    fn send_message(&self, message: &SendMessage<'_>) -> Result<Reply>;
}

/// Telegram Bot API over blocking [`reqwest`].
pub struct TelegramTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl TelegramTransport {
    /// Create a transport for the public Bot API.
    ///
    /// # Arguments
    ///
    /// * `client` — shared blocking HTTP client.
    /// * `token` — bot token; it becomes part of the request path.
    pub fn new(client: reqwest::blocking::Client, token: &str) -> Self {
        Self::with_api_base(client, TELEGRAM_API, token)
    }

    /// Same as [`new`](Self::new) against another Bot API server.
    pub fn with_api_base(client: reqwest::blocking::Client, api_base: &str, token: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", api_base.trim_end_matches('/')),
        }
    }
}

impl ChatTransport for TelegramTransport {
    fn send_message(&self, message: &SendMessage<'_>) -> Result<Reply> {
        // The endpoint URL embeds the bot token; keep it out of error text.
        let resp = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .map_err(reqwest::Error::without_url)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(reqwest::Error::without_url)?;
        Ok(Reply { status, body })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

type Sleeper = Box<dyn Fn(Duration)>;

pub struct Notifier {
    target: Option<(String, Box<dyn ChatTransport>)>,
    sleep: Sleeper,
}

impl Notifier {
    /// A notifier posting to Telegram, or a no-op one when `credentials`
    /// is `None`.
    pub fn telegram(credentials: Option<Credentials>) -> Self {
        match credentials {
            Some(Credentials { token, chat_id }) => {
                let transport = TelegramTransport::new(reqwest::blocking::Client::new(), &token);
                Self::new(Some(chat_id), Box::new(transport))
            }
            None => Self::unconfigured(),
        }
    }

    /// A notifier over any transport.
    ///
    /// # Arguments
    ///
    /// * `chat_id` — target chat; `None` makes every send a no-op.
    /// * `transport` — performs the actual request.
    pub fn new(chat_id: Option<String>, transport: Box<dyn ChatTransport>) -> Self {
        Self {
            target: chat_id.map(|id| (id, transport)),
            sleep: Box::new(std::thread::sleep),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            target: None,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the sleep function used for rate-limit waits and pacing.
    #[cfg(test)]
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Deliver `text`, then pause for `delay`.
    pub fn send(&self, text: &str, delay: Duration) -> Delivery {
        let Some((chat_id, transport)) = &self.target else {
            error!("missing TELEGRAM_TOKEN or CHAT_ID, message not sent");
            return Delivery::Skipped;
        };

        let message = SendMessage {
            chat_id: chat_id.as_str(),
            text,
            disable_web_page_preview: true,
        };

        let mut attempt = 1;
        let outcome = loop {
            match Self::attempt(transport.as_ref(), &message) {
                Ok(()) => {
                    info!("message sent");
                    break Delivery::Sent;
                }
                Err(DeliveryError::RateLimited { retry_after, body }) if attempt < MAX_ATTEMPTS => {
                    warn!(%body, ?retry_after, attempt, "rate limited, waiting before retry");
                    (self.sleep)(retry_after);
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, attempt, "message not delivered");
                    break Delivery::Failed;
                }
            }
        };

        (self.sleep)(delay);
        outcome
    }

    fn attempt(transport: &dyn ChatTransport, message: &SendMessage<'_>) -> Result<(), DeliveryError> {
        let reply = transport
            .send_message(message)
            .map_err(DeliveryError::Transport)?;
        if reply.status == 200 {
            Ok(())
        } else {
            Err(DeliveryError::from_reply(reply))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Transport that replays canned replies and records every request.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedTransport {
        pub replies: Rc<RefCell<VecDeque<Result<Reply, String>>>>,
        pub sent: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptedTransport {
        pub fn reply(&self, status: u16, body: &str) -> &Self {
            self.replies.borrow_mut().push_back(Ok(Reply {
                status,
                body: body.to_string(),
            }));
            self
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn send_message(&self, message: &SendMessage<'_>) -> Result<Reply> {
            self.sent.borrow_mut().push(message.text.to_string());
            match self.replies.borrow_mut().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => Err(anyhow!(e)),
                None => Ok(Reply {
                    status: 200,
                    body: r#"{"ok":true}"#.to_string(),
                }),
            }
        }
    }

    /// Build a notifier over `transport` whose sleeps are recorded.
    pub(crate) fn scripted(transport: &ScriptedTransport) -> (Notifier, Rc<RefCell<Vec<Duration>>>) {
        let slept = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&slept);
        let notifier = Notifier::new(Some("42".to_string()), Box::new(transport.clone()))
            .with_sleep(move |d| log.borrow_mut().push(d));
        (notifier, slept)
    }

    const RATE_LIMITED: &str = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#;

    #[test]
    fn success_sleeps_pacing_delay_once() {
        let transport = ScriptedTransport::default();
        let (notifier, slept) = scripted(&transport);

        assert_eq!(notifier.send("hi", Duration::from_secs(1)), Delivery::Sent);
        assert_eq!(*transport.sent.borrow(), vec!["hi".to_string()]);
        assert_eq!(*slept.borrow(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn rate_limit_retries_once_after_hint() {
        let transport = ScriptedTransport::default();
        transport.reply(429, RATE_LIMITED);
        let (notifier, slept) = scripted(&transport);

        assert_eq!(notifier.send("hi", Duration::from_secs(1)), Delivery::Sent);
        assert_eq!(transport.sent.borrow().len(), 2);
        assert_eq!(
            *slept.borrow(),
            vec![Duration::from_secs(5), Duration::from_secs(1)]
        );
    }

    #[test]
    fn persistent_rate_limit_gives_up_after_max_attempts() {
        let transport = ScriptedTransport::default();
        for _ in 0..10 {
            transport.reply(429, RATE_LIMITED);
        }
        let (notifier, slept) = scripted(&transport);

        assert_eq!(notifier.send("hi", Duration::from_secs(2)), Delivery::Failed);
        assert_eq!(transport.sent.borrow().len(), MAX_ATTEMPTS as usize);
        assert_eq!(
            *slept.borrow(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(2)
            ]
        );
    }

    #[test]
    fn other_errors_are_not_retried() {
        let transport = ScriptedTransport::default();
        transport.reply(400, r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#);
        let (notifier, slept) = scripted(&transport);

        assert_eq!(notifier.send("hi", Duration::from_secs(1)), Delivery::Failed);
        assert_eq!(transport.sent.borrow().len(), 1);
        assert_eq!(*slept.borrow(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn rate_limit_without_hint_is_not_retried() {
        let transport = ScriptedTransport::default();
        transport.reply(429, r#"{"ok":false,"error_code":429}"#);
        let (notifier, _) = scripted(&transport);

        assert_eq!(notifier.send("hi", Duration::ZERO), Delivery::Failed);
        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[test]
    fn transport_error_is_logged_not_raised() {
        let transport = ScriptedTransport::default();
        transport
            .replies
            .borrow_mut()
            .push_back(Err("dns failure".to_string()));
        let (notifier, slept) = scripted(&transport);

        assert_eq!(notifier.send("hi", Duration::from_secs(1)), Delivery::Failed);
        assert_eq!(*slept.borrow(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn missing_credentials_skip_without_pacing() {
        let slept = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&slept);
        let notifier = Notifier::unconfigured().with_sleep(move |d| log.borrow_mut().push(d));

        assert_eq!(notifier.send("hi", Duration::from_secs(1)), Delivery::Skipped);
        assert!(slept.borrow().is_empty());
    }

    #[test]
    fn request_body_disables_previews() {
        let body = serde_json::to_value(SendMessage {
            chat_id: "42",
            text: "hello",
            disable_web_page_preview: true,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"chat_id": "42", "text": "hello", "disable_web_page_preview": true})
        );
    }

    #[test]
    fn transport_errors_do_not_reveal_the_token() {
        // nothing listens on port 1, so the request fails before any reply
        let transport = TelegramTransport::with_api_base(
            reqwest::blocking::Client::new(),
            "http://127.0.0.1:1",
            "SECRET123:xyz",
        );
        let message = SendMessage {
            chat_id: "42",
            text: "hi",
            disable_web_page_preview: true,
        };

        let err = Notifier::attempt(&transport, &message).unwrap_err();

        assert!(matches!(err, DeliveryError::Transport(_)));
        let shown = err.to_string();
        assert!(!shown.contains("SECRET123"), "token leaked: {shown}");
    }

    #[test]
    fn endpoint_embeds_token_once() {
        let transport = TelegramTransport::with_api_base(
            reqwest::blocking::Client::new(),
            "http://localhost:8081/",
            "123:abc",
        );
        assert_eq!(transport.endpoint, "http://localhost:8081/bot123:abc/sendMessage");
    }

    #[test]
    fn credentials_debug_hides_token() {
        let creds = Credentials {
            token: "secret-token".into(),
            chat_id: "1".into(),
        };
        assert!(!format!("{creds:?}").contains("secret-token"));
    }
}
