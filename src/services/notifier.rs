// Notification dispatcher - member acknowledgements and admin approval cards

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::models::{cell, Amount, ClaimKind, ClaimStatus, Decision, NewClaim, PaymentClaim};
use crate::services::token_codec::TokenPair;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Invalid chat API URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A delivered message that can later be edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
    /// Photo messages carry a caption instead of text.
    pub has_media: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Rows of buttons.
pub type InlineKeyboard = Vec<Vec<InlineButton>>;

/// Outbound side of the chat platform. Text is HTML formatted.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef, TransportError>;

    /// Replaces the text (or caption) of a message and drops its buttons.
    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), TransportError>;

    /// Answers a button press so the client stops its spinner.
    async fn acknowledge(&self, callback_id: &str, text: Option<&str>)
        -> Result<(), TransportError>;

    /// Checks the platform is reachable; returns the bot's own handle.
    async fn probe(&self) -> Result<String, TransportError>;
}

pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Fields shown on an admin approval card. Cards are rendered both right after
/// submission and again from the ledger by `/pending`.
pub struct ClaimCard<'a> {
    pub member_id: i64,
    pub member_name: &'a str,
    pub amount: Amount,
    pub kind: ClaimKind,
    pub submitted_at: Option<NaiveDateTime>,
    pub has_receipt: bool,
    pub sessions_at_submission: u32,
}

impl<'a> From<&'a NewClaim> for ClaimCard<'a> {
    fn from(claim: &'a NewClaim) -> Self {
        Self {
            member_id: claim.member_id,
            member_name: &claim.member_name,
            amount: claim.amount,
            kind: claim.kind,
            submitted_at: Some(claim.submitted_at),
            has_receipt: claim.receipt_ref.is_some(),
            sessions_at_submission: claim.sessions_at_submission,
        }
    }
}

impl<'a> From<&'a PaymentClaim> for ClaimCard<'a> {
    fn from(claim: &'a PaymentClaim) -> Self {
        Self {
            member_id: claim.member_id,
            member_name: &claim.member_name,
            amount: claim.amount,
            kind: claim.kind,
            submitted_at: claim.submitted_at,
            has_receipt: claim.receipt_ref.is_some(),
            sessions_at_submission: claim.sessions_at_submission,
        }
    }
}

pub fn approval_keyboard(tokens: &TokenPair) -> InlineKeyboard {
    vec![vec![
        InlineButton::new("✅ Confirm", tokens.approve.clone()),
        InlineButton::new("❌ Reject", tokens.reject.clone()),
    ]]
}

pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
    admin_id: i64,
    currency: String,
}

impl Notifier {
    pub fn new(transport: Arc<dyn ChatTransport>, admin_id: i64, currency: impl Into<String>) -> Self {
        Self {
            transport,
            admin_id,
            currency: currency.into(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    pub fn admin_id(&self) -> i64 {
        self.admin_id
    }

    pub fn money(&self, amount: Amount) -> String {
        format!("{} {}", amount, self.currency)
    }

    pub fn render_card(&self, card: &ClaimCard<'_>) -> String {
        let submitted = card
            .submitted_at
            .map(cell::format_datetime)
            .unwrap_or_else(|| "unknown".to_string());
        let receipt = if card.has_receipt { "attached" } else { "none" };

        format!(
            "💰 <b>Payment claim</b>\n\n\
             Member: {} (<code>{}</code>)\n\
             Amount: <b>{}</b>\n\
             Method: {}\n\
             Receipt: {}\n\
             Sessions since last payment: {}\n\
             Submitted: {}",
            escape(card.member_name),
            card.member_id,
            escape(&self.money(card.amount)),
            card.kind.label(),
            receipt,
            card.sessions_at_submission,
            submitted,
        )
    }

    /// Sends a message, logging instead of failing. Returns the delivered
    /// message when the platform accepted it.
    pub async fn send(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Option<MessageRef> {
        match self.transport.send_text(chat_id, text, keyboard).await {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Failed to deliver message");
                None
            }
        }
    }

    pub async fn notify_admin(&self, text: &str) -> Option<MessageRef> {
        self.send(self.admin_id, text, None).await
    }

    /// Sends an approval card, as a photo when a receipt is attached.
    pub async fn send_card(
        &self,
        card: &ClaimCard<'_>,
        receipt_ref: Option<&str>,
        tokens: &TokenPair,
    ) -> Option<MessageRef> {
        let text = self.render_card(card);
        let keyboard = approval_keyboard(tokens);

        let result = match receipt_ref {
            Some(photo) => {
                self.transport
                    .send_photo(self.admin_id, photo, &text, Some(&keyboard))
                    .await
            }
            None => {
                self.transport
                    .send_text(self.admin_id, &text, Some(&keyboard))
                    .await
            }
        };

        match result {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(member_id = card.member_id, error = %e, "Failed to deliver admin card");
                None
            }
        }
    }

    /// Acknowledges a freshly persisted claim to the member and hands the
    /// admin an actionable card.
    pub async fn claim_submitted(&self, claim: &NewClaim, tokens: &TokenPair) -> Option<MessageRef> {
        let ack = format!(
            "✅ Your payment of <b>{}</b> ({}) was sent for confirmation.\n\
             You will get a message once the administrator checks it.",
            escape(&self.money(claim.amount)),
            claim.kind.label().to_lowercase(),
        );
        self.send(claim.member_id, &ack, None).await;

        self.send_card(&ClaimCard::from(claim), claim.receipt_ref.as_deref(), tokens)
            .await
    }

    /// Tells the member the outcome and turns the admin card into a record of
    /// the decision. Both steps are best-effort.
    pub async fn claim_decided(
        &self,
        claim: &PaymentClaim,
        decision: Decision,
        approver_name: &str,
        decided_at: NaiveDateTime,
        card: Option<&MessageRef>,
        account_updated: bool,
    ) {
        let member_text = match decision {
            Decision::Confirm => format!(
                "✅ Your payment of <b>{}</b> is confirmed.\nYour membership is active. See you at the gym!",
                escape(&self.money(claim.amount)),
            ),
            Decision::Reject => format!(
                "❌ Your payment of <b>{}</b> was not confirmed.\nPlease contact the administrator.",
                escape(&self.money(claim.amount)),
            ),
        };
        self.send(claim.member_id, &member_text, None).await;

        let Some(card) = card else {
            return;
        };

        let mut text = self.decided_card_text(claim, decision.status(), approver_name, decided_at);
        if !account_updated {
            text.push_str("\n⚠️ The member account was not updated, run the action again or fix the Members sheet.");
        }

        if let Err(e) = self.transport.edit_message(card, &text).await {
            tracing::warn!(row = claim.row, error = %e, "Failed to update admin card");
        }
    }

    pub fn decided_card_text(
        &self,
        claim: &PaymentClaim,
        status: ClaimStatus,
        approver_name: &str,
        decided_at: NaiveDateTime,
    ) -> String {
        let mark = match status {
            ClaimStatus::Confirmed => "✅",
            ClaimStatus::Rejected => "❌",
            ClaimStatus::Pending => "⏳",
        };
        format!(
            "{}\n\n{} <b>{}</b> by {} at {}",
            self.render_card(&ClaimCard::from(claim)),
            mark,
            status.as_str().to_uppercase(),
            escape(approver_name),
            cell::format_datetime(decided_at),
        )
    }
}
