use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::models::{Amount, ClaimKind};

/// Where a user is in a multi-step conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueState {
    RegistrationName,
    RegistrationPhone { name: String },
    RegistrationSchedule { name: String, phone: String },
    AwaitingAmount { kind: ClaimKind },
    AwaitingReceipt { amount: Amount },
}

/// Per-user dialogue state. Lost on restart, like any half-typed form.
#[derive(Default)]
pub struct Dialogues {
    states: Mutex<HashMap<i64, DialogueState>>,
}

impl Dialogues {
    pub async fn get(&self, user_id: i64) -> Option<DialogueState> {
        self.states.lock().await.get(&user_id).cloned()
    }

    pub async fn set(&self, user_id: i64, state: DialogueState) {
        self.states.lock().await.insert(user_id, state);
    }

    pub async fn clear(&self, user_id: i64) -> Option<DialogueState> {
        self.states.lock().await.remove(&user_id)
    }
}
