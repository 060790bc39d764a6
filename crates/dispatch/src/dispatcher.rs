use crate::keywords::{classify, Intent, GOPHER_PAYLOAD};
use gopherbot_core::config::BotMode;
use gopherbot_core::state::{RotationPick, SharedBotState};
use gopherbot_core::types::{Attachment, Button, Message, Postback, SendResponse};
use gopherbot_messenger::MessageSender;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GOPHER_INTRO: &str = "Cool! Here's a gopher for you:";
pub const PYTHON_REPLY: &str = "Go away, you evil person";
pub const JAVA_REPLY: &str = "I don't mind coding in Java, as long as it's the island in Indonesia";
pub const NOT_INITIALIZED_REPLY: &str = "This bot isn't initialized";

/// Turns classified events into Send API calls.
///
/// Every send is independent: a failed call is logged and the rest of the
/// reply still goes out. State locks are never held across a send.
pub struct ReplyDispatcher {
    mode: BotMode,
    state: SharedBotState,
    sender: Arc<dyn MessageSender>,
}

impl ReplyDispatcher {
    pub fn new(mode: BotMode, state: SharedBotState, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            mode,
            state,
            sender,
        }
    }

    pub fn mode(&self) -> BotMode {
        self.mode
    }

    pub fn state(&self) -> &SharedBotState {
        &self.state
    }

    pub async fn handle_message(&self, sender_id: &str, message: &Message) {
        let intent = classify(message.text_or_empty(), self.mode);
        debug!(sender = %sender_id, ?intent, "Classified message");
        self.reply(sender_id, intent).await;
    }

    pub async fn handle_postback(&self, sender_id: &str, postback: &Postback) {
        if postback.payload == GOPHER_PAYLOAD {
            self.reply(sender_id, Intent::Gopher).await;
        } else {
            debug!(sender = %sender_id, payload = %postback.payload, "Ignoring postback");
        }
    }

    async fn reply(&self, sender_id: &str, intent: Intent) {
        if intent == Intent::Init {
            self.initialize(sender_id).await;
            return;
        }

        if self.mode == BotMode::Privileged && self.state.lock().await.owner().is_none() {
            self.send_text(sender_id, NOT_INITIALIZED_REPLY).await;
            return;
        }

        match intent {
            Intent::Gopher => self.send_gopher(sender_id).await,
            Intent::Python => self.send_text(sender_id, PYTHON_REPLY).await,
            Intent::Java => self.send_text(sender_id, JAVA_REPLY).await,
            Intent::Unmatched | Intent::Init => {}
        }
    }

    /// Claim ownership and upload the rotation images as reusable attachments.
    async fn initialize(&self, sender_id: &str) {
        let urls = {
            let mut state = self.state.lock().await;
            if !state.claim_owner(sender_id) {
                info!(sender = %sender_id, "Init ignored, bot already has an owner");
                return;
            }
            state.rotation().urls().to_vec()
        };
        info!(owner = %sender_id, images = urls.len(), "Bot claimed, uploading images");

        let mut collected = Vec::with_capacity(urls.len());
        for url in &urls {
            let upload = Message::with_attachment(Attachment::image_url(url, true));
            let Some(response) = self.deliver(sender_id, upload).await else {
                continue;
            };
            match response.attachment_id {
                Some(id) => {
                    self.state.lock().await.rotation_mut().record_upload(id.clone());
                    collected.push(id);
                }
                None => warn!(url = %url, "Upload accepted without an attachment id"),
            }
        }

        let summary = format!(
            "The bot is initialized, attachment IDs are: [{}]",
            collected.join(" ")
        );
        self.send_text(sender_id, &summary).await;
    }

    async fn send_gopher(&self, sender_id: &str) {
        self.send_text(sender_id, GOPHER_INTRO).await;

        let pick = self.state.lock().await.rotation_mut().advance();
        let attachment = match pick {
            Some(RotationPick::Uploaded(id)) => Attachment::media_template(&id, gopher_buttons()),
            Some(RotationPick::Url(url)) => Attachment::image_url(&url, false),
            None => {
                warn!("No gopher images configured");
                return;
            }
        };
        self.deliver(sender_id, Message::with_attachment(attachment)).await;
    }

    async fn send_text(&self, sender_id: &str, text: &str) {
        self.deliver(sender_id, Message::with_text(text)).await;
    }

    async fn deliver(&self, sender_id: &str, message: Message) -> Option<SendResponse> {
        match self.sender.send(sender_id, message).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(to = %sender_id, error = %e, "Outbound send failed");
                None
            }
        }
    }
}

fn gopher_buttons() -> Vec<Button> {
    vec![
        Button::WebUrl {
            title: "Website".to_string(),
            url: "http://golang.org".to_string(),
        },
        Button::Postback {
            title: "I can go-pher more".to_string(),
            payload: GOPHER_PAYLOAD.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gopherbot_core::state::BotState;
    use gopherbot_core::types::AttachmentKind;
    use gopherbot_messenger::SendError;
    use std::sync::Mutex;

    /// Records every send; uploads of `is_reusable` images get `att-<url>` ids.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, Message)>>,
        failing_urls: Vec<String>,
    }

    impl RecordingSender {
        fn failing(urls: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing_urls: urls.iter().map(|u| u.to_string()).collect(),
            }
        }

        fn sent(&self) -> Vec<(String, Message)> {
            self.sent.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|(_, m)| m.text)
                .collect()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, recipient_id: &str, message: Message) -> Result<SendResponse, SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient_id.to_string(), message.clone()));

            let url = message
                .attachment
                .as_ref()
                .and_then(|a| a.payload["url"].as_str())
                .map(|s| s.to_string());
            if let Some(url) = &url {
                if self.failing_urls.contains(url) {
                    return Err(SendError::Network("connection reset".to_string()));
                }
            }

            let reusable = message
                .attachment
                .as_ref()
                .and_then(|a| a.payload["is_reusable"].as_bool())
                .unwrap_or(false);
            Ok(SendResponse {
                recipient_id: recipient_id.to_string(),
                message_id: "mid".to_string(),
                attachment_id: if reusable { url.map(|u| format!("att-{}", u)) } else { None },
            })
        }
    }

    fn images() -> Vec<String> {
        (0..4).map(|i| format!("img{}", i)).collect()
    }

    fn dispatcher(mode: BotMode, sender: Arc<RecordingSender>) -> ReplyDispatcher {
        ReplyDispatcher::new(mode, BotState::new(images()).shared(), sender)
    }

    fn text(t: &str) -> Message {
        Message::with_text(t)
    }

    fn template_attachment_id(message: &Message) -> Option<String> {
        let attachment = message.attachment.as_ref()?;
        if attachment.kind != AttachmentKind::Template {
            return None;
        }
        attachment.payload["elements"][0]["attachment_id"]
            .as_str()
            .map(|s| s.to_string())
    }

    #[tokio::test]
    async fn init_claims_owner_and_uploads_images_in_order() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Privileged, sender.clone());

        dispatcher.handle_message("alice", &text("_INIT")).await;

        assert_eq!(dispatcher.state().lock().await.owner(), Some("alice"));
        let sent = sender.sent();
        assert_eq!(sent.len(), 5);
        for (i, (to, message)) in sent.iter().take(4).enumerate() {
            assert_eq!(to, "alice");
            let attachment = message.attachment.as_ref().unwrap();
            assert_eq!(attachment.kind, AttachmentKind::Image);
            assert_eq!(attachment.payload["url"], format!("img{}", i));
            assert_eq!(attachment.payload["is_reusable"], true);
        }
        assert_eq!(
            sent[4].1.text.as_deref(),
            Some("The bot is initialized, attachment IDs are: [att-img0 att-img1 att-img2 att-img3]")
        );
        assert_eq!(dispatcher.state().lock().await.rotation().attachment_ids().len(), 4);
    }

    #[tokio::test]
    async fn second_init_is_a_noop() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Privileged, sender.clone());

        dispatcher.handle_message("alice", &text("_INIT")).await;
        let after_first = sender.sent().len();
        dispatcher.handle_message("mallory", &text("_INIT")).await;
        dispatcher.handle_message("alice", &text("_INIT")).await;

        assert_eq!(sender.sent().len(), after_first);
        assert_eq!(dispatcher.state().lock().await.owner(), Some("alice"));
    }

    #[tokio::test]
    async fn failed_upload_is_skipped() {
        let sender = Arc::new(RecordingSender::failing(&["img1"]));
        let dispatcher = dispatcher(BotMode::Privileged, sender.clone());

        dispatcher.handle_message("alice", &text("_INIT")).await;

        // all four uploads attempted, summary still sent
        assert_eq!(sender.sent().len(), 5);
        assert_eq!(
            sender.texts(),
            vec!["The bot is initialized, attachment IDs are: [att-img0 att-img2 att-img3]".to_string()]
        );
        assert_eq!(
            dispatcher.state().lock().await.rotation().attachment_ids(),
            &["att-img0".to_string(), "att-img2".to_string(), "att-img3".to_string()]
        );
    }

    #[tokio::test]
    async fn privileged_bot_refuses_until_initialized() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Privileged, sender.clone());

        dispatcher.handle_message("bob", &text("golang")).await;
        dispatcher.handle_message("bob", &text("hello")).await;
        dispatcher
            .handle_postback(
                "bob",
                &Postback {
                    payload: GOPHER_PAYLOAD.to_string(),
                    ..Postback::default()
                },
            )
            .await;

        assert_eq!(
            sender.texts(),
            vec![NOT_INITIALIZED_REPLY.to_string(); 3]
        );
    }

    #[tokio::test]
    async fn gopher_replies_cycle_through_uploaded_images() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Privileged, sender.clone());
        dispatcher.handle_message("alice", &text("_INIT")).await;
        let init_sends = sender.sent().len();

        for _ in 0..6 {
            dispatcher.handle_message("bob", &text("Show me a Gopher")).await;
        }

        let replies: Vec<(String, Message)> = sender.sent().into_iter().skip(init_sends).collect();
        assert_eq!(replies.len(), 12);
        let mut shown = Vec::new();
        for pair in replies.chunks(2) {
            assert_eq!(pair[0].0, "bob");
            assert_eq!(pair[0].1.text.as_deref(), Some(GOPHER_INTRO));
            shown.push(template_attachment_id(&pair[1].1).unwrap());
        }
        assert_eq!(
            shown,
            ["att-img0", "att-img1", "att-img2", "att-img3", "att-img0", "att-img1"]
        );

        let template = replies[1].1.attachment.as_ref().unwrap();
        let buttons = &template.payload["elements"][0]["buttons"];
        assert_eq!(buttons[0]["url"], "http://golang.org");
        assert_eq!(buttons[1]["payload"], GOPHER_PAYLOAD);
    }

    #[tokio::test]
    async fn keyword_replies_after_init() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Privileged, sender.clone());
        dispatcher.handle_message("alice", &text("_INIT")).await;
        let init_sends = sender.sent().len();

        dispatcher.handle_message("bob", &text("I write Python")).await;
        dispatcher.handle_message("bob", &text("java rocks")).await;
        dispatcher.handle_message("bob", &text("hello")).await;
        dispatcher.handle_message("bob", &Message::default()).await;

        let texts: Vec<Option<String>> = sender
            .sent()
            .into_iter()
            .skip(init_sends)
            .map(|(_, m)| m.text)
            .collect();
        assert_eq!(
            texts,
            vec![Some(PYTHON_REPLY.to_string()), Some(JAVA_REPLY.to_string())]
        );
    }

    #[tokio::test]
    async fn gopher_postback_matches_keyword_reply() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Open, sender.clone());

        dispatcher
            .handle_postback(
                "bob",
                &Postback {
                    title: "I can go-pher more".to_string(),
                    payload: GOPHER_PAYLOAD.to_string(),
                    referral: None,
                },
            )
            .await;
        dispatcher
            .handle_postback(
                "bob",
                &Postback {
                    payload: "SOMETHING_ELSE".to_string(),
                    ..Postback::default()
                },
            )
            .await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.text.as_deref(), Some(GOPHER_INTRO));
        let image = sent[1].1.attachment.as_ref().unwrap();
        assert_eq!(image.kind, AttachmentKind::Image);
        assert_eq!(image.payload["url"], "img0");
    }

    #[tokio::test]
    async fn open_mode_replies_without_owner_and_has_no_fallback() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = dispatcher(BotMode::Open, sender.clone());

        dispatcher.handle_message("bob", &text("_INIT")).await;
        dispatcher.handle_message("bob", &text("hello")).await;
        assert!(sender.sent().is_empty());
        assert_eq!(dispatcher.state().lock().await.owner(), None);

        for _ in 0..5 {
            dispatcher.handle_message("bob", &text("go")).await;
        }
        let urls: Vec<String> = sender
            .sent()
            .into_iter()
            .filter_map(|(_, m)| m.attachment)
            .map(|a| a.payload["url"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(urls, ["img0", "img1", "img2", "img3", "img0"]);
    }

    #[tokio::test]
    async fn failed_intro_does_not_stop_image() {
        struct FlakySender {
            calls: Mutex<usize>,
        }

        #[async_trait]
        impl MessageSender for FlakySender {
            async fn send(&self, recipient_id: &str, _message: Message) -> Result<SendResponse, SendError> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    return Err(SendError::Api {
                        status: 500,
                        body: "boom".to_string(),
                    });
                }
                Ok(SendResponse {
                    recipient_id: recipient_id.to_string(),
                    ..SendResponse::default()
                })
            }
        }

        let sender = Arc::new(FlakySender {
            calls: Mutex::new(0),
        });
        let dispatcher = ReplyDispatcher::new(
            BotMode::Open,
            BotState::new(images()).shared(),
            sender.clone(),
        );
        dispatcher.handle_message("bob", &text("gopher")).await;

        assert_eq!(*sender.calls.lock().unwrap(), 2);
        assert_eq!(dispatcher.state().lock().await.rotation().counter(), 1);
    }
}
