// Text and photo messages: slash commands and dialogue steps

use crate::bot::dialogue::DialogueState;
use crate::bot::{reply, reply_with};
use crate::context::AppContext;
use crate::models::{Amount, ClaimKind, NewMember, SettingKey, SettingValue};
use crate::services::claims::{self, ClaimError, SubmitClaimRequest};
use crate::services::members::{self, MemberError, Profile, StartOutcome, Stats};
use crate::services::notifier::{escape, InlineButton};
use crate::services::telegram::{Message, User};

const PENDING_LIST_LIMIT: usize = 10;

const LIMITED_MODE_TEXT: &str =
    "⚠️ The bot is running in limited mode: the gym ledger is unavailable right now.\nPlease try again later.";
const NOT_REGISTERED_TEXT: &str = "You are not registered yet. Send /start to register.";
const LEDGER_ERROR_TEXT: &str = "⚠️ Could not reach the gym ledger, please try again later.";

/// Splits `/name@bot args` into a lowercase name and the trimmed arguments.
fn parse_command(text: &str) -> Option<(String, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, args.trim()))
}

pub async fn handle_message(ctx: &AppContext, message: Message) {
    let chat_id = message.chat.id;
    let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(chat_id);
    let text = message.text.as_deref().unwrap_or_default();

    if let Some((command, args)) = parse_command(text) {
        if command != "skip" {
            ctx.dialogues.clear(user_id).await;
        }
        if !ctx.ledger_ready() && command != "help" {
            reply(ctx, chat_id, LIMITED_MODE_TEXT).await;
            return;
        }
        tracing::debug!(user_id, command = %command, "Command received");
        handle_command(ctx, &message, user_id, &command, args).await;
        return;
    }

    let Some(state) = ctx.dialogues.get(user_id).await else {
        if message.photo.is_some() {
            reply(ctx, chat_id, "To report a payment, start with /payment.").await;
        } else {
            reply(ctx, chat_id, "I did not understand that. Send /help for the list of commands.").await;
        }
        return;
    };

    if !ctx.ledger_ready() {
        reply(ctx, chat_id, LIMITED_MODE_TEXT).await;
        return;
    }

    handle_dialogue_step(ctx, &message, user_id, state).await;
}

async fn handle_command(ctx: &AppContext, message: &Message, user_id: i64, command: &str, args: &str) {
    let chat_id = message.chat.id;
    let admin = ctx.is_admin(user_id);

    match command {
        "start" => start(ctx, chat_id, user_id).await,
        "help" => {
            reply(ctx, chat_id, &help_text(admin)).await;
        }
        "payment" => payment_menu(ctx, chat_id, user_id).await,
        "profile" => profile(ctx, chat_id, user_id).await,
        "sick" => sick(ctx, chat_id, user_id).await,
        "quit" => quit_prompt(ctx, chat_id, user_id).await,
        "rules" => setting_text(ctx, chat_id, SettingKey::GymRules).await,
        "schedule" => setting_text(ctx, chat_id, SettingKey::GymSchedule).await,
        "cancel" => {
            // the dialogue was already cleared above
            reply(ctx, chat_id, "Cancelled. Send /help for the list of commands.").await;
        }
        "skip" => skip(ctx, message, user_id).await,

        "pending" if admin => pending(ctx, chat_id).await,
        "stats" if admin => stats(ctx, chat_id).await,
        "settings" if admin => settings(ctx, chat_id).await,
        "set" if admin => set_setting(ctx, chat_id, args).await,
        "attended" if admin => attended(ctx, chat_id, args).await,
        "pending" | "stats" | "settings" | "set" | "attended" => {
            reply(ctx, chat_id, "This command is for the administrator only.").await;
        }

        _ => {
            reply(ctx, chat_id, "Unknown command. Send /help for the list of commands.").await;
        }
    }
}

fn help_text(admin: bool) -> String {
    let mut text = String::from(
        "<b>Commands</b>\n\
         /start - register or come back\n\
         /payment - report a payment\n\
         /profile - your membership\n\
         /sick - report a sick day\n\
         /schedule - gym schedule\n\
         /rules - gym rules\n\
         /quit - leave the program\n\
         /cancel - cancel the current step",
    );
    if admin {
        text.push_str(
            "\n\n<b>Administrator</b>\n\
             /pending - resend cards for pending payments\n\
             /stats - members and income\n\
             /settings - current settings\n\
             /set &lt;key&gt; &lt;value&gt; - change a setting\n\
             /attended &lt;telegram_id&gt; - record a visit",
        );
    }
    text
}

async fn start(ctx: &AppContext, chat_id: i64, user_id: i64) {
    let text = match members::start(ctx, user_id).await {
        Ok(StartOutcome::Welcome(member)) => format!(
            "👋 Welcome back, {}!\nSend /payment to report a payment or /profile to see your membership.",
            escape(&member.name)
        ),
        Ok(StartOutcome::Reactivated(member)) => format!(
            "🔄 Welcome back to the program, {}! Your membership is active again.",
            escape(&member.name)
        ),
        Ok(StartOutcome::ReactivationFailed(member)) => format!(
            "{}, your membership is inactive and could not be reactivated right now.\nPlease try /start again later.",
            escape(&member.name)
        ),
        Ok(StartOutcome::NeedsRegistration) => {
            ctx.dialogues.set(user_id, DialogueState::RegistrationName).await;
            "👋 Welcome to the gym! Let's get you registered.\n\nWhat is your name?".to_string()
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "Start failed");
            LEDGER_ERROR_TEXT.to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}

/// Looks the member up, replying on the caller's behalf when there is none.
async fn registered_member(ctx: &AppContext, chat_id: i64, user_id: i64) -> Option<crate::models::Member> {
    match ctx.ledger.get_member(user_id).await {
        Ok(Some(member)) => Some(member),
        Ok(None) => {
            reply(ctx, chat_id, NOT_REGISTERED_TEXT).await;
            None
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "Member lookup failed");
            reply(ctx, chat_id, LEDGER_ERROR_TEXT).await;
            None
        }
    }
}

async fn payment_menu(ctx: &AppContext, chat_id: i64, user_id: i64) {
    if registered_member(ctx, chat_id, user_id).await.is_none() {
        return;
    }
    let keyboard = vec![vec![
        InlineButton::new("💳 Transfer", "pay_transfer"),
        InlineButton::new("💵 Cash", "pay_cash"),
    ]];
    reply_with(ctx, chat_id, "How did you pay?", &keyboard).await;
}

fn render_profile(ctx: &AppContext, profile: &Profile) -> String {
    let member = &profile.member;
    let mut text = format!(
        "👤 <b>{}</b>\nStatus: {}\nPhone: {}\nSchedule: {}\n",
        escape(&member.name),
        member.status,
        escape(member.phone.as_deref().unwrap_or("-")),
        escape(member.schedule.as_deref().unwrap_or("-")),
    );
    if let Some(date) = member.registration_date {
        text.push_str(&format!("Registered: {}\n", date));
    }
    text.push_str(&format!(
        "\n🏋️ Sessions: {} used, {} left of {}\n",
        profile.sessions_used, profile.sessions_left, profile.sessions_per_month
    ));
    match &profile.last_payment {
        Some(last) => text.push_str(&format!(
            "💰 Last payment: {}{}\n",
            escape(&ctx.notifier.money(last.amount)),
            last.date.map(|d| format!(" on {}", d)).unwrap_or_default(),
        )),
        None => text.push_str("💰 No confirmed payments yet\n"),
    }
    if profile.pending_claims > 0 {
        text.push_str(&format!("⏳ Waiting for confirmation: {}\n", profile.pending_claims));
    }
    text.push_str(&format!(
        "Monthly price: {}",
        escape(&ctx.notifier.money(Amount::from(profile.monthly_price)))
    ));
    text
}

async fn profile(ctx: &AppContext, chat_id: i64, user_id: i64) {
    let text = match members::profile(ctx, user_id).await {
        Ok(profile) => render_profile(ctx, &profile),
        Err(MemberError::NotRegistered(_)) => NOT_REGISTERED_TEXT.to_string(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "Profile failed");
            LEDGER_ERROR_TEXT.to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}

async fn sick(ctx: &AppContext, chat_id: i64, user_id: i64) {
    let text = match members::report_sick(ctx, user_id).await {
        Ok(date) => format!("🤒 Sick day recorded for {}. Get well soon!", date),
        Err(MemberError::NotRegistered(_)) => NOT_REGISTERED_TEXT.to_string(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "Sick day not recorded");
            LEDGER_ERROR_TEXT.to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}

async fn quit_prompt(ctx: &AppContext, chat_id: i64, user_id: i64) {
    if registered_member(ctx, chat_id, user_id).await.is_none() {
        return;
    }
    let keyboard = vec![vec![
        InlineButton::new("Yes, leave", "quit_yes"),
        InlineButton::new("No, stay", "quit_no"),
    ]];
    reply_with(
        ctx,
        chat_id,
        "Are you sure you want to leave the program? You can come back any time with /start.",
        &keyboard,
    )
    .await;
}

async fn setting_text(ctx: &AppContext, chat_id: i64, key: SettingKey) {
    let value = ctx.ledger.get_setting(key).await;
    reply(ctx, chat_id, &escape(&value.to_string())).await;
}

async fn skip(ctx: &AppContext, message: &Message, user_id: i64) {
    match ctx.dialogues.get(user_id).await {
        Some(DialogueState::AwaitingReceipt { amount }) => {
            ctx.dialogues.clear(user_id).await;
            submit_claim(ctx, message.chat.id, user_id, amount, ClaimKind::Transfer, None).await;
        }
        _ => {
            reply(ctx, message.chat.id, "Nothing to skip.").await;
        }
    }
}

async fn pending(ctx: &AppContext, chat_id: i64) {
    let claims = match claims::list_pending(ctx, PENDING_LIST_LIMIT).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::error!(error = %e, "Pending claims unavailable");
            reply(ctx, chat_id, LEDGER_ERROR_TEXT).await;
            return;
        }
    };

    if claims.is_empty() {
        reply(ctx, chat_id, "✅ No pending payments.").await;
        return;
    }

    reply(
        ctx,
        chat_id,
        &format!("⏳ Pending payments: {} (newest first)", claims.len()),
    )
    .await;
    let delivered = claims::resend_cards(ctx, &claims).await;
    if delivered < claims.len() {
        tracing::warn!(delivered, total = claims.len(), "Some pending cards were not delivered");
    }
}

fn render_stats(ctx: &AppContext, stats: &Stats) -> String {
    format!(
        "📊 <b>Statistics</b>\n\n\
         Members: {}\nActive: {}\nInactive: {}\n\n\
         {}: {} confirmed payments, {}\n\
         Waiting for confirmation: {}",
        stats.total_members,
        stats.active_members,
        stats.inactive_members,
        stats.month,
        stats.confirmed_this_month,
        Amount::new(stats.income_this_month)
            .map(|income| escape(&ctx.notifier.money(income)))
            .unwrap_or_default(),
        stats.pending_claims,
    )
}

async fn stats(ctx: &AppContext, chat_id: i64) {
    let text = match members::stats(ctx).await {
        Ok(stats) => render_stats(ctx, &stats),
        Err(e) => {
            tracing::error!(error = %e, "Stats unavailable");
            LEDGER_ERROR_TEXT.to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}

async fn settings(ctx: &AppContext, chat_id: i64) {
    let mut text = String::from("⚙️ <b>Settings</b>\n");
    for key in SettingKey::ALL.into_iter().filter(|k| k.is_integer()) {
        let value = ctx.ledger.get_setting(key).await;
        text.push_str(&format!("\n<code>{}</code> = {}", key, value));
    }
    text.push_str("\n\nSchedule and rules: /schedule, /rules\nChange with /set &lt;key&gt; &lt;value&gt;");
    reply(ctx, chat_id, &text).await;
}

/// `/set <key> <value>`. Payment bounds must keep `min <= max`.
async fn set_setting(ctx: &AppContext, chat_id: i64, args: &str) {
    let usage = || {
        let keys: Vec<&str> = SettingKey::ALL.iter().map(|k| k.as_str()).collect();
        format!("Usage: /set &lt;key&gt; &lt;value&gt;\nKeys: {}", keys.join(", "))
    };

    let Some((key, input)) = args.split_once(char::is_whitespace) else {
        reply(ctx, chat_id, &usage()).await;
        return;
    };
    let Some(key) = SettingKey::parse(key) else {
        reply(ctx, chat_id, &usage()).await;
        return;
    };
    let value = match key.value_from_input(input) {
        Ok(value) => value,
        Err(message) => {
            reply(ctx, chat_id, &escape(&message)).await;
            return;
        }
    };

    if let SettingValue::Integer(n) = value {
        let bounds = ctx.ledger.payment_bounds().await;
        let conflict = match key {
            SettingKey::MinPayment if n > bounds.max => Some(format!(
                "min_payment cannot exceed max_payment ({})",
                bounds.max
            )),
            SettingKey::MaxPayment if n < bounds.min => Some(format!(
                "max_payment cannot be below min_payment ({})",
                bounds.min
            )),
            _ => None,
        };
        if let Some(message) = conflict {
            reply(ctx, chat_id, &message).await;
            return;
        }
    }

    let text = match ctx.ledger.set_setting(key, &value).await {
        Ok(()) => {
            tracing::info!(key = key.as_str(), "Setting changed");
            format!("✅ <code>{}</code> updated", key)
        }
        Err(e) => {
            tracing::error!(key = key.as_str(), error = %e, "Setting not saved");
            LEDGER_ERROR_TEXT.to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}

async fn attended(ctx: &AppContext, chat_id: i64, args: &str) {
    let Ok(member_id) = args.parse::<i64>() else {
        reply(ctx, chat_id, "Usage: /attended &lt;telegram_id&gt;").await;
        return;
    };

    match members::mark_attended(ctx, member_id).await {
        Ok((member, used)) => {
            let per_month = ctx
                .ledger
                .get_integer_setting(SettingKey::SessionsPerMonth)
                .await;
            reply(
                ctx,
                chat_id,
                &format!(
                    "✅ Visit recorded for {}: {} of {} sessions",
                    escape(&member.name),
                    used,
                    per_month
                ),
            )
            .await;
            reply(
                ctx,
                member.id,
                &format!("🏋️ Session recorded: {} of {} sessions used.", used, per_month),
            )
            .await;
        }
        Err(MemberError::NotRegistered(id)) => {
            reply(ctx, chat_id, &format!("No member with ID <code>{}</code>", id)).await;
        }
        Err(e) => {
            tracing::error!(member_id, error = %e, "Attendance not recorded");
            reply(ctx, chat_id, LEDGER_ERROR_TEXT).await;
        }
    }
}

async fn handle_dialogue_step(ctx: &AppContext, message: &Message, user_id: i64, state: DialogueState) {
    let chat_id = message.chat.id;
    let text = message.text.as_deref().unwrap_or_default();

    match state {
        DialogueState::RegistrationName => match members::validate_name(text) {
            Ok(name) => {
                ctx.dialogues
                    .set(user_id, DialogueState::RegistrationPhone { name })
                    .await;
                reply(ctx, chat_id, "📱 Your phone number?").await;
            }
            Err(e) => {
                reply(ctx, chat_id, &e.to_string()).await;
            }
        },

        DialogueState::RegistrationPhone { name } => match members::validate_phone(text) {
            Ok(phone) => {
                ctx.dialogues
                    .set(user_id, DialogueState::RegistrationSchedule { name, phone })
                    .await;
                reply(
                    ctx,
                    chat_id,
                    "🗓 Which days and times suit you? For example: Mon/Wed/Fri evenings",
                )
                .await;
            }
            Err(e) => {
                reply(ctx, chat_id, &e.to_string()).await;
            }
        },

        DialogueState::RegistrationSchedule { name, phone } => {
            let schedule = match members::validate_schedule(text) {
                Ok(schedule) => schedule,
                Err(e) => {
                    reply(ctx, chat_id, &e.to_string()).await;
                    return;
                }
            };
            ctx.dialogues.clear(user_id).await;
            register(ctx, chat_id, message.from.as_ref(), user_id, name, phone, schedule).await;
        }

        DialogueState::AwaitingAmount { kind } => {
            let amount = match Amount::parse(text) {
                Ok(amount) => amount,
                Err(_) => {
                    reply(ctx, chat_id, "Please send the amount as a number, for example 8000.").await;
                    return;
                }
            };
            if let Err(e) = claims::check_bounds(amount, ctx.ledger.payment_bounds().await) {
                reply(ctx, chat_id, &e.to_string()).await;
                return;
            }

            match kind {
                ClaimKind::Cash => {
                    ctx.dialogues.clear(user_id).await;
                    submit_claim(ctx, chat_id, user_id, amount, kind, None).await;
                }
                ClaimKind::Transfer => {
                    ctx.dialogues
                        .set(user_id, DialogueState::AwaitingReceipt { amount })
                        .await;
                    reply(
                        ctx,
                        chat_id,
                        "📎 Send a photo of the transfer receipt, or /skip to send without one.",
                    )
                    .await;
                }
            }
        }

        DialogueState::AwaitingReceipt { amount } => match message.largest_photo() {
            Some(photo) => {
                ctx.dialogues.clear(user_id).await;
                submit_claim(
                    ctx,
                    chat_id,
                    user_id,
                    amount,
                    ClaimKind::Transfer,
                    Some(photo.to_string()),
                )
                .await;
            }
            None => {
                reply(ctx, chat_id, "Please send a photo of the receipt, or /skip.").await;
            }
        },
    }
}

async fn register(
    ctx: &AppContext,
    chat_id: i64,
    user: Option<&User>,
    user_id: i64,
    name: String,
    phone: String,
    schedule: String,
) {
    let member = NewMember {
        id: user_id,
        username: user.and_then(|u| u.username.clone()),
        name,
        phone,
        schedule,
    };

    let text = match members::complete_registration(ctx, &member).await {
        Ok(()) => {
            tracing::info!(user_id, "Member registered");
            format!(
                "🎉 Registration complete, {}!\nSend /payment to report a payment, /rules to read the gym rules.",
                escape(&member.name)
            )
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "Registration failed");
            "⚠️ Registration failed, please try again later with /start.".to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}

/// Submits the claim; on success the member acknowledgement is sent by the
/// claim service.
async fn submit_claim(
    ctx: &AppContext,
    chat_id: i64,
    user_id: i64,
    amount: Amount,
    kind: ClaimKind,
    receipt_ref: Option<String>,
) {
    let request = SubmitClaimRequest {
        member_id: user_id,
        amount,
        kind,
        receipt_ref,
    };

    let text = match claims::submit(ctx, request).await {
        Ok(_) => return,
        Err(ClaimError::Validation(message)) => message,
        Err(ClaimError::MemberNotFound(_)) => NOT_REGISTERED_TEXT.to_string(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "Payment claim not recorded");
            "⚠️ Your payment could not be saved, please try /payment again later.".to_string()
        }
    };
    reply(ctx, chat_id, &text).await;
}
