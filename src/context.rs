use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bot::dialogue::Dialogues;
use crate::config::Config;
use crate::ledger::Ledger;
use crate::services::notifier::{ChatTransport, Notifier};
use crate::services::token_codec::TokenCodec;

/// Bot-facing options taken from [`Config`].
#[derive(Debug, Clone)]
pub struct BotOptions {
    pub admin_id: i64,
    pub currency: String,
    pub payment_phone: Option<String>,
    pub payment_qr_photo: Option<String>,
}

impl From<&Config> for BotOptions {
    fn from(config: &Config) -> Self {
        Self {
            admin_id: config.admin_id,
            currency: config.currency.clone(),
            payment_phone: config.payment_phone.clone(),
            payment_qr_photo: config.payment_qr_photo.clone(),
        }
    }
}

/// Everything the handlers share, built once at startup and passed down
/// explicitly.
pub struct AppContext {
    pub options: BotOptions,
    pub ledger: Ledger,
    pub codec: TokenCodec,
    pub notifier: Notifier,
    pub dialogues: Dialogues,
    pub(crate) decide_lock: tokio::sync::Mutex<()>,
    ledger_ready: AtomicBool,
}

impl AppContext {
    pub fn new(options: BotOptions, ledger: Ledger, transport: Arc<dyn ChatTransport>) -> Self {
        let notifier = Notifier::new(transport, options.admin_id, options.currency.clone());
        Self {
            options,
            ledger,
            codec: TokenCodec::new(),
            notifier,
            dialogues: Dialogues::default(),
            decide_lock: tokio::sync::Mutex::new(()),
            ledger_ready: AtomicBool::new(false),
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.options.admin_id
    }

    /// False while the ledger could not be initialised ("limited mode").
    pub fn ledger_ready(&self) -> bool {
        self.ledger_ready.load(Ordering::Relaxed)
    }

    pub fn set_ledger_ready(&self, ready: bool) {
        self.ledger_ready.store(ready, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn for_tests(ledger: Ledger, transport: Arc<dyn ChatTransport>, admin_id: i64) -> Self {
        let ctx = Self::new(
            BotOptions {
                admin_id,
                currency: "som".to_string(),
                payment_phone: Some("+996 555 000 111".to_string()),
                payment_qr_photo: None,
            },
            ledger,
            transport,
        );
        ctx.set_ledger_ready(true);
        ctx
    }
}
