use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedBotState = Arc<Mutex<BotState>>;

/// Next image to show in a gopher reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationPick {
    /// Attachment id handed out by the Send API during init.
    Uploaded(String),
    /// Plain URL, used until anything was uploaded.
    Url(String),
}

/// Fixed list of images plus a cursor that wraps around.
///
/// Once uploads are recorded the rotation walks the uploaded ids instead of
/// the URLs, so a partially failed init only cycles through what exists.
#[derive(Debug, Clone, Default)]
pub struct ImageRotation {
    urls: Vec<String>,
    attachment_ids: Vec<String>,
    counter: usize,
}

impl ImageRotation {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            attachment_ids: Vec::new(),
            counter: 0,
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn attachment_ids(&self) -> &[String] {
        &self.attachment_ids
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn record_upload(&mut self, attachment_id: String) {
        self.attachment_ids.push(attachment_id);
    }

    pub fn len(&self) -> usize {
        if self.attachment_ids.is_empty() {
            self.urls.len()
        } else {
            self.attachment_ids.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image at the cursor; advances the cursor modulo the rotation length.
    pub fn advance(&mut self) -> Option<RotationPick> {
        let len = self.len();
        if len == 0 {
            return None;
        }

        let index = self.counter % len;
        let pick = if self.attachment_ids.is_empty() {
            RotationPick::Url(self.urls[index].clone())
        } else {
            RotationPick::Uploaded(self.attachment_ids[index].clone())
        };
        self.counter = (index + 1) % len;
        Some(pick)
    }
}

/// Everything the bot remembers between requests. Lost on restart.
#[derive(Debug, Clone, Default)]
pub struct BotState {
    me: Option<String>,
    owner: Option<String>,
    rotation: ImageRotation,
}

impl BotState {
    pub fn new(images: Vec<String>) -> Self {
        Self {
            me: None,
            owner: None,
            rotation: ImageRotation::new(images),
        }
    }

    pub fn shared(self) -> SharedBotState {
        Arc::new(Mutex::new(self))
    }

    /// The page id, learned from the first event's recipient.
    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    /// Capture the bot identity if it is still unknown. Returns true only on
    /// the call that set it.
    pub fn observe_recipient(&mut self, recipient_id: &str) -> bool {
        if self.me.is_some() || recipient_id.is_empty() {
            return false;
        }
        self.me = Some(recipient_id.to_string());
        true
    }

    /// True while identity is unknown, when `sender_id` is missing, or when
    /// it is the bot itself.
    pub fn should_ignore(&self, sender_id: &str) -> bool {
        if sender_id.is_empty() {
            return true;
        }
        match self.me.as_deref() {
            None => true,
            Some(me) => me == sender_id,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// First caller wins; later claims leave the owner unchanged.
    pub fn claim_owner(&mut self, sender_id: &str) -> bool {
        if self.owner.is_some() {
            return false;
        }
        self.owner = Some(sender_id.to_string());
        true
    }

    pub fn rotation(&self) -> &ImageRotation {
        &self.rotation
    }

    pub fn rotation_mut(&mut self) -> &mut ImageRotation {
        &mut self.rotation
    }
}
