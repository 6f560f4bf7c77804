// Test doubles shared by unit tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::AppContext;
use crate::ledger::{memory::MemoryLedger, Ledger};
use crate::models::NewMember;
use crate::services::notifier::{ChatTransport, InlineKeyboard, MessageRef, TransportError};

pub const ADMIN_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub photo: Option<String>,
    pub keyboard: Option<InlineKeyboard>,
}

impl Sent {
    pub fn button_data(&self) -> Vec<&str> {
        self.keyboard
            .iter()
            .flatten()
            .flatten()
            .map(|b| b.data.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edited {
    pub message: MessageRef,
    pub text: String,
}

/// Records everything the bot would have sent.
#[derive(Default)]
pub struct RecordingTransport {
    next_id: AtomicI64,
    sent: Mutex<Vec<Sent>>,
    edited: Mutex<Vec<Edited>>,
    acks: Mutex<Vec<(String, Option<String>)>>,
    unreachable: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries_to(&self, chat_id: i64) {
        self.unreachable.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    pub fn edited(&self) -> Vec<Edited> {
        self.edited.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<(String, Option<String>)> {
        self.acks.lock().unwrap().clone()
    }

    fn deliver(
        &self,
        chat_id: i64,
        text: &str,
        photo: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(TransportError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }

        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            message_id,
            text: text.to_string(),
            photo: photo.map(str::to_string),
            keyboard: keyboard.cloned(),
        });
        Ok(MessageRef {
            chat_id,
            message_id,
            has_media: photo.is_some(),
        })
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError> {
        self.deliver(chat_id, text, None, keyboard)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError> {
        self.deliver(chat_id, caption, Some(photo), keyboard)
    }

    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), TransportError> {
        if self.unreachable.lock().unwrap().contains(&message.chat_id) {
            return Err(TransportError::Api {
                code: 400,
                description: "Bad Request: message to edit not found".to_string(),
            });
        }
        self.edited.lock().unwrap().push(Edited {
            message: message.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn acknowledge(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.acks
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }

    async fn probe(&self) -> Result<String, TransportError> {
        Ok("gymkeeper_test_bot".to_string())
    }
}

/// A context over an initialised in-memory ledger and a recording transport.
pub async fn test_context() -> (Arc<AppContext>, Arc<MemoryLedger>, Arc<RecordingTransport>) {
    let store = Arc::new(MemoryLedger::new());
    let ledger = Ledger::new(store.clone());
    ledger.initialize().await.unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let ctx = AppContext::for_tests(ledger, transport.clone(), ADMIN_ID);
    (Arc::new(ctx), store, transport)
}

pub async fn register(ctx: &AppContext, id: i64, name: &str) {
    ctx.ledger
        .add_member(&NewMember {
            id,
            username: Some(format!("user{}", id)),
            name: name.to_string(),
            phone: "+996700123456".to_string(),
            schedule: "Mon/Wed/Fri evenings".to_string(),
        })
        .await
        .unwrap();
}
