// Member operations: registration, opt-out, profile, sickness and attendance

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::context::AppContext;
use crate::ledger::LedgerError;
use crate::models::{
    Amount, AttendanceEvent, AttendanceStatus, ClaimStatus, Member, MemberStatus, NewMember,
    PaymentClaim, SettingKey,
};
use crate::services::notifier::escape;

const MIN_NAME_LEN: usize = 2;
const MIN_PHONE_LEN: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum MemberError {
    #[error("{0}")]
    Validation(String),

    #[error("Member {0} is not registered")]
    NotRegistered(i64),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub fn validate_name(input: &str) -> Result<String, MemberError> {
    let name = input.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(MemberError::Validation(
            "Please enter a valid name (at least 2 characters)".to_string(),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_phone(input: &str) -> Result<String, MemberError> {
    let phone = input.trim();
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if phone.chars().count() < MIN_PHONE_LEN || digits == 0 {
        return Err(MemberError::Validation(
            "Please enter a valid phone number".to_string(),
        ));
    }
    Ok(phone.to_string())
}

pub fn validate_schedule(input: &str) -> Result<String, MemberError> {
    let schedule = input.trim();
    if schedule.is_empty() {
        return Err(MemberError::Validation(
            "Please enter your preferred schedule".to_string(),
        ));
    }
    Ok(schedule.to_string())
}

#[derive(Debug)]
pub enum StartOutcome {
    Welcome(Member),
    /// An inactive member came back and was set active again.
    Reactivated(Member),
    /// An inactive member came back but the status write failed.
    ReactivationFailed(Member),
    NeedsRegistration,
}

pub async fn start(ctx: &AppContext, user_id: i64) -> Result<StartOutcome, MemberError> {
    let Some(member) = ctx.ledger.get_member(user_id).await? else {
        return Ok(StartOutcome::NeedsRegistration);
    };

    if member.is_active() {
        return Ok(StartOutcome::Welcome(member));
    }

    match ctx
        .ledger
        .upsert_member_status(user_id, MemberStatus::Active)
        .await
    {
        Ok(true) => {
            ctx.notifier
                .notify_admin(&format!(
                    "🔄 {} is back in the program!\nID: <code>{}</code>",
                    escape(&member.name),
                    member.id
                ))
                .await;
            Ok(StartOutcome::Reactivated(Member {
                status: MemberStatus::Active,
                ..member
            }))
        }
        Ok(false) | Err(_) => Ok(StartOutcome::ReactivationFailed(member)),
    }
}

pub async fn complete_registration(ctx: &AppContext, member: &NewMember) -> Result<(), MemberError> {
    ctx.ledger.add_member(member).await?;

    let username = member
        .username
        .as_deref()
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| "none".to_string());
    ctx.notifier
        .notify_admin(&format!(
            "👤 New member registered!\n\n\
             Name: {}\nPhone: {}\nSchedule: {}\nID: <code>{}</code>\nUsername: {}",
            escape(&member.name),
            escape(&member.phone),
            escape(&member.schedule),
            member.id,
            escape(&username),
        ))
        .await;
    Ok(())
}

/// Marks the member inactive. Members are never deleted.
pub async fn quit(ctx: &AppContext, user_id: i64) -> Result<Member, MemberError> {
    let member = ctx
        .ledger
        .get_member(user_id)
        .await?
        .ok_or(MemberError::NotRegistered(user_id))?;

    if !ctx
        .ledger
        .upsert_member_status(user_id, MemberStatus::Inactive)
        .await?
    {
        return Err(MemberError::NotRegistered(user_id));
    }

    ctx.notifier
        .notify_admin(&format!(
            "👋 {} left the program.\nID: <code>{}</code>",
            escape(&member.name),
            member.id
        ))
        .await;
    Ok(Member {
        status: MemberStatus::Inactive,
        ..member
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastPayment {
    pub amount: Amount,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub member: Member,
    pub sessions_used: u32,
    pub sessions_left: u32,
    pub last_payment: Option<LastPayment>,
    pub pending_claims: usize,
    pub monthly_price: i64,
    pub sessions_per_month: i64,
}

fn last_confirmed(claims: &[PaymentClaim], member_id: i64) -> Option<LastPayment> {
    claims
        .iter()
        .filter(|c| c.member_id == member_id && c.status == ClaimStatus::Confirmed)
        .max_by_key(|c| c.recency_key())
        .map(|c| LastPayment {
            amount: c.amount,
            date: c
                .confirmed_at
                .or(c.submitted_at)
                .map(|dt| dt.date()),
        })
}

pub async fn profile(ctx: &AppContext, user_id: i64) -> Result<Profile, MemberError> {
    let member = ctx
        .ledger
        .get_member(user_id)
        .await?
        .ok_or(MemberError::NotRegistered(user_id))?;

    let sessions_used = ctx.ledger.sessions_since_last_payment(&member).await?;
    let claims = ctx.ledger.list_claims().await?;
    let sessions_per_month = ctx.ledger.get_integer_setting(SettingKey::SessionsPerMonth).await;
    let monthly_price = ctx.ledger.get_integer_setting(SettingKey::MonthlyPrice).await;

    let sessions_left = u32::try_from(sessions_per_month.max(0))
        .unwrap_or(u32::MAX)
        .saturating_sub(sessions_used);

    Ok(Profile {
        last_payment: last_confirmed(&claims, user_id),
        pending_claims: claims
            .iter()
            .filter(|c| c.member_id == user_id && c.status == ClaimStatus::Pending)
            .count(),
        member,
        sessions_used,
        sessions_left,
        monthly_price,
        sessions_per_month,
    })
}

/// Records a sick day for today and tells the admin.
pub async fn report_sick(ctx: &AppContext, user_id: i64) -> Result<NaiveDate, MemberError> {
    let member = ctx
        .ledger
        .get_member(user_id)
        .await?
        .ok_or(MemberError::NotRegistered(user_id))?;

    let today = chrono::Local::now().date_naive();
    ctx.ledger
        .append_attendance(&AttendanceEvent {
            date: today,
            member_id: member.id,
            member_name: member.name.clone(),
            status: AttendanceStatus::Sick,
            reason: Some("Reported sick by the member".to_string()),
        })
        .await?;

    ctx.notifier
        .notify_admin(&format!(
            "🤒 {} reported sick\nDate: {}\nID: <code>{}</code>",
            escape(&member.name),
            today,
            member.id
        ))
        .await;
    Ok(today)
}

/// Records an attended session for today. Returns the member and the
/// sessions now used in the current period.
pub async fn mark_attended(ctx: &AppContext, member_id: i64) -> Result<(Member, u32), MemberError> {
    let member = ctx
        .ledger
        .get_member(member_id)
        .await?
        .ok_or(MemberError::NotRegistered(member_id))?;

    ctx.ledger
        .append_attendance(&AttendanceEvent {
            date: chrono::Local::now().date_naive(),
            member_id: member.id,
            member_name: member.name.clone(),
            status: AttendanceStatus::Attended,
            reason: None,
        })
        .await?;
    tracing::info!(member_id, "Attendance recorded");

    let used = ctx.ledger.sessions_since_last_payment(&member).await?;
    Ok((member, used))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Stats {
    pub total_members: usize,
    pub active_members: usize,
    pub inactive_members: usize,
    /// `YYYY-MM`
    pub month: String,
    pub confirmed_this_month: usize,
    pub income_this_month: f64,
    pub pending_claims: usize,
}

pub async fn stats(ctx: &AppContext) -> Result<Stats, LedgerError> {
    let members = ctx.ledger.list_members().await?;
    let claims = ctx.ledger.list_claims().await?;
    let today = chrono::Local::now().date_naive();

    let in_month = |c: &&PaymentClaim| {
        c.submitted_at
            .map(|at| at.year() == today.year() && at.month() == today.month())
            .unwrap_or(false)
    };
    let confirmed: Vec<&PaymentClaim> = claims
        .iter()
        .filter(|c| c.status == ClaimStatus::Confirmed)
        .filter(in_month)
        .collect();

    let active_members = members.iter().filter(|m| m.is_active()).count();
    Ok(Stats {
        total_members: members.len(),
        active_members,
        inactive_members: members.len() - active_members,
        month: today.format("%Y-%m").to_string(),
        confirmed_this_month: confirmed.len(),
        income_this_month: confirmed.iter().map(|c| c.amount.value()).sum(),
        pending_claims: claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Pending)
            .count(),
    })
}
