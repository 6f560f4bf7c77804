// Inline button presses

use crate::bot::dialogue::DialogueState;
use crate::bot::reply;
use crate::context::AppContext;
use crate::models::{ClaimKind, Decision};
use crate::services::claims::{self, AdminAction, Approver, ClaimError, DecideOutcome};
use crate::services::members::{self, MemberError};
use crate::services::notifier::escape;
use crate::services::telegram::CallbackQuery;
use crate::services::token_codec::{APPROVE_PREFIX, REJECT_PREFIX};

/// Every press is acknowledged exactly once so the client stops its spinner.
pub async fn handle_callback(ctx: &AppContext, query: CallbackQuery) {
    let data = query.data.clone().unwrap_or_default();
    tracing::debug!(user_id = query.from.id, data = %data, "Callback received");

    let answer = if !ctx.ledger_ready() {
        Some("Limited mode, try again later".to_string())
    } else {
        match data.as_str() {
            "pay_cash" => choose_payment_kind(ctx, &query, ClaimKind::Cash).await,
            "pay_transfer" => choose_payment_kind(ctx, &query, ClaimKind::Transfer).await,
            "quit_yes" => confirm_quit(ctx, &query).await,
            "quit_no" => {
                finish_prompt(ctx, &query, "👍 Glad you are staying!").await;
                None
            }
            token if token.starts_with(APPROVE_PREFIX) || token.starts_with(REJECT_PREFIX) => {
                Some(admin_action(ctx, &query, token).await)
            }
            other => {
                tracing::debug!(data = %other, "Unknown callback data");
                None
            }
        }
    };

    if let Err(e) = ctx
        .notifier
        .transport()
        .acknowledge(&query.id, answer.as_deref())
        .await
    {
        tracing::warn!(callback_id = %query.id, error = %e, "Failed to acknowledge callback");
    }
}

/// Replaces the prompt the button was on, or sends the text when the prompt
/// is gone.
async fn finish_prompt(ctx: &AppContext, query: &CallbackQuery, text: &str) {
    if let Some(message) = &query.message {
        match ctx
            .notifier
            .transport()
            .edit_message(&message.reference(), text)
            .await
        {
            Ok(()) => return,
            Err(e) => tracing::debug!(error = %e, "Prompt not editable, sending instead"),
        }
    }
    reply(ctx, query.from.id, text).await;
}

async fn choose_payment_kind(ctx: &AppContext, query: &CallbackQuery, kind: ClaimKind) -> Option<String> {
    let user_id = query.from.id;
    match ctx.ledger.get_member(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            reply(ctx, user_id, "You are not registered yet. Send /start to register.").await;
            return None;
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "Member lookup failed");
            return Some("Ledger unavailable, try again later".to_string());
        }
    }

    ctx.dialogues
        .set(user_id, DialogueState::AwaitingAmount { kind })
        .await;

    let bounds = ctx.ledger.payment_bounds().await;
    let range = format!("from {} to {} {}", bounds.min, bounds.max, escape(&ctx.options.currency));

    let text = match kind {
        ClaimKind::Cash => format!("💵 Enter the amount you paid in cash, {}.", range),
        ClaimKind::Transfer => {
            let phone = ctx
                .options
                .payment_phone
                .as_deref()
                .map(|p| format!("Transfer to <code>{}</code>.\n", escape(p)))
                .unwrap_or_default();
            format!(
                "💳 {}After the transfer, enter the amount you sent, {}.",
                phone, range
            )
        }
    };

    if kind == ClaimKind::Transfer {
        if let Some(qr) = &ctx.options.payment_qr_photo {
            if let Err(e) = ctx
                .notifier
                .transport()
                .send_photo(user_id, qr, "Scan to pay", None)
                .await
            {
                tracing::warn!(user_id, error = %e, "Failed to send payment QR");
            }
        }
    }

    reply(ctx, user_id, &text).await;
    None
}

async fn confirm_quit(ctx: &AppContext, query: &CallbackQuery) -> Option<String> {
    let text = match members::quit(ctx, query.from.id).await {
        Ok(_) => "👋 You are now inactive. Come back any time with /start.",
        Err(MemberError::NotRegistered(_)) => "You are not registered.",
        Err(e) => {
            tracing::error!(user_id = query.from.id, error = %e, "Quit failed");
            return Some("Ledger unavailable, try again later".to_string());
        }
    };
    finish_prompt(ctx, query, text).await;
    None
}

/// Confirm or reject pressed on an approval card. Returns the toast shown to
/// the admin.
async fn admin_action(ctx: &AppContext, query: &CallbackQuery, token: &str) -> String {
    if !ctx.is_admin(query.from.id) {
        tracing::warn!(user_id = query.from.id, "Non-admin pressed an approval button");
        return "Only the administrator can do this".to_string();
    }

    let action = AdminAction {
        token: token.to_string(),
        approver: Approver {
            id: query.from.id,
            display_name: query.from.display_name(),
        },
        card: query.message.as_ref().map(|m| m.reference()),
    };

    match claims::decide(ctx, action).await {
        Ok(DecideOutcome::Decided(decided)) => match decided.decision {
            Decision::Confirm => "Payment confirmed".to_string(),
            Decision::Reject => "Payment rejected".to_string(),
        },
        Ok(DecideOutcome::PartiallyApplied(decided)) => format!(
            "Claim {}, but the member account was not updated",
            decided.claim.status
        ),
        Err(ClaimError::AlreadyTerminal { status, .. }) => format!("Already {}", status),
        Err(ClaimError::ClaimNotFound { .. }) => "No matching pending payment".to_string(),
        Err(ClaimError::Token(_)) => "Unknown action".to_string(),
        Err(e @ (ClaimError::LedgerWrite(_) | ClaimError::LedgerRead(_))) => {
            tracing::error!(error = %e, "Admin action failed");
            "Ledger unavailable, nothing changed. Try again".to_string()
        }
        Err(e) => {
            tracing::error!(error = %e, "Admin action failed");
            "Action failed".to_string()
        }
    }
}
