// Payment claim lifecycle: submission and admin decisions

use crate::context::AppContext;
use crate::ledger::LedgerError;
use crate::models::{
    Amount, ClaimKind, ClaimStatus, Decision, NewClaim, PaymentBounds, PaymentClaim,
};
use crate::services::matcher::{locate_claim, MatchOutcome, MatchRule};
use crate::services::notifier::MessageRef;
use crate::services::token_codec::{ActionKind, TokenError, TokenPair, TokenTarget};

#[derive(thiserror::Error, Debug)]
pub enum ClaimError {
    #[error("{0}")]
    Validation(String),

    #[error("Member {0} is not registered")]
    MemberNotFound(i64),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("No pending claim of {amount} for member {member_id}")]
    ClaimNotFound { member_id: i64, amount: Amount },

    #[error("Claim in row {row} is already {status}")]
    AlreadyTerminal { status: ClaimStatus, row: u32 },

    #[error("Ledger write failed: {0}")]
    LedgerWrite(LedgerError),

    #[error("Ledger read failed: {0}")]
    LedgerRead(LedgerError),
}

pub struct SubmitClaimRequest {
    pub member_id: i64,
    pub amount: Amount,
    pub kind: ClaimKind,
    pub receipt_ref: Option<String>,
}

#[derive(Debug)]
pub struct ClaimAccepted {
    pub claim: NewClaim,
    pub tokens: TokenPair,
    /// `None` when the card could not be delivered; the claim stays pending
    /// and can be re-rendered with `/pending`.
    pub admin_card: Option<MessageRef>,
}

#[derive(Debug, Clone)]
pub struct Approver {
    pub id: i64,
    pub display_name: String,
}

pub struct AdminAction {
    pub token: String,
    pub approver: Approver,
    /// The card the action was triggered from.
    pub card: Option<MessageRef>,
}

#[derive(Debug, Clone)]
pub struct DecidedClaim {
    /// The claim as it now reads in the ledger.
    pub claim: PaymentClaim,
    pub decision: Decision,
    pub rule: MatchRule,
}

#[derive(Debug, Clone)]
pub enum DecideOutcome {
    Decided(DecidedClaim),
    /// The claim is terminal but the member account update failed.
    PartiallyApplied(DecidedClaim),
}

impl DecideOutcome {
    pub fn decided(&self) -> &DecidedClaim {
        match self {
            DecideOutcome::Decided(d) | DecideOutcome::PartiallyApplied(d) => d,
        }
    }
}

pub fn check_bounds(amount: Amount, bounds: PaymentBounds) -> Result<(), ClaimError> {
    if amount.value() <= 0.0 {
        return Err(ClaimError::Validation(
            "The amount must be greater than zero".to_string(),
        ));
    }
    if amount.value() < bounds.min as f64 || amount.value() > bounds.max as f64 {
        return Err(ClaimError::Validation(format!(
            "The amount must be between {} and {}",
            bounds.min, bounds.max
        )));
    }
    Ok(())
}

/// Persists a pending claim and notifies the member and the admin.
#[tracing::instrument(skip(ctx, request), fields(member_id = request.member_id, amount = %request.amount))]
pub async fn submit(ctx: &AppContext, request: SubmitClaimRequest) -> Result<ClaimAccepted, ClaimError> {
    check_bounds(request.amount, ctx.ledger.payment_bounds().await)?;

    let member = ctx
        .ledger
        .get_member(request.member_id)
        .await
        .map_err(ClaimError::LedgerRead)?
        .ok_or(ClaimError::MemberNotFound(request.member_id))?;

    let sessions = match ctx.ledger.sessions_since_last_payment(&member).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "Session count unavailable, recording 0");
            0
        }
    };

    let claim = NewClaim {
        submitted_at: chrono::Local::now().naive_local(),
        member_id: member.id,
        member_name: member.name.clone(),
        amount: request.amount,
        kind: request.kind,
        receipt_ref: request.receipt_ref,
        sessions_at_submission: sessions,
    };

    ctx.ledger
        .append_claim(&claim)
        .await
        .map_err(ClaimError::LedgerWrite)?;
    tracing::info!(kind = claim.kind.as_str(), "Payment claim recorded as pending");

    let tokens = ctx.codec.encode_pair(TokenTarget {
        member_id: claim.member_id,
        amount: claim.amount,
    });
    let admin_card = ctx.notifier.claim_submitted(&claim, &tokens).await;

    Ok(ClaimAccepted {
        claim,
        tokens,
        admin_card,
    })
}

/// Applies an admin's confirm or reject action to the claim its token points
/// at.
///
/// The claim's terminal write must succeed before the member account is
/// touched or anyone is notified. A claim that is already terminal is
/// reported as [`ClaimError::AlreadyTerminal`] and nothing is sent.
#[tracing::instrument(skip(ctx, action), fields(token = %action.token, approver = action.approver.id))]
pub async fn decide(ctx: &AppContext, action: AdminAction) -> Result<DecideOutcome, ClaimError> {
    let (kind, target) = ctx.codec.decode(&action.token)?;
    let decision = match kind {
        ActionKind::Approve => Decision::Confirm,
        ActionKind::Reject => Decision::Reject,
    };

    let (decided, account_updated, decided_at) = {
        // Held across read and write so two actions in this process cannot
        // both see the claim as pending.
        let _guard = ctx.decide_lock.lock().await;
        let decided_at = chrono::Local::now().naive_local();

        let claims = ctx.ledger.list_claims().await.map_err(ClaimError::LedgerRead)?;
        let (claim, rule) = match locate_claim(&claims, &target) {
            MatchOutcome::Pending { claim, rule } => (claim, rule),
            MatchOutcome::AlreadyTerminal(claim) => {
                tracing::info!(row = claim.row, status = %claim.status, "Claim already decided");
                return Err(ClaimError::AlreadyTerminal {
                    status: claim.status,
                    row: claim.row,
                });
            }
            MatchOutcome::NotFound => {
                tracing::warn!(member_id = target.member_id, amount = %target.amount, "No claim for action");
                return Err(ClaimError::ClaimNotFound {
                    member_id: target.member_id,
                    amount: target.amount,
                });
            }
        };

        let approver = action.approver.id.to_string();
        ctx.ledger
            .update_claim_terminal(claim.row, decision, &approver, decided_at)
            .await
            .map_err(ClaimError::LedgerWrite)?;

        let account_updated = match decision {
            Decision::Reject => true,
            Decision::Confirm => match ctx
                .ledger
                .record_member_payment(claim.member_id, decided_at.date(), claim.amount)
                .await
            {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(member_id = claim.member_id, "Confirmed claim for unknown member");
                    false
                }
                Err(_) => false,
            },
        };

        let decided = DecidedClaim {
            claim: PaymentClaim {
                status: decision.status(),
                confirmed_by: Some(approver),
                confirmed_at: Some(decided_at),
                ..claim
            },
            decision,
            rule,
        };
        (decided, account_updated, decided_at)
    };

    ctx.notifier
        .claim_decided(
            &decided.claim,
            decision,
            &action.approver.display_name,
            decided_at,
            action.card.as_ref(),
            account_updated,
        )
        .await;

    if account_updated {
        Ok(DecideOutcome::Decided(decided))
    } else {
        tracing::error!(row = decided.claim.row, "Claim decided but member account is stale");
        Ok(DecideOutcome::PartiallyApplied(decided))
    }
}

/// Most recently submitted pending claims first.
pub async fn list_pending(ctx: &AppContext, limit: usize) -> Result<Vec<PaymentClaim>, LedgerError> {
    let mut pending: Vec<PaymentClaim> = ctx
        .ledger
        .list_claims()
        .await?
        .into_iter()
        .filter(|c| c.status == ClaimStatus::Pending)
        .collect();
    pending.sort_by_key(|c| std::cmp::Reverse(c.recency_key()));
    pending.truncate(limit);
    Ok(pending)
}

/// Sends fresh approval cards for the given claims. Tokens are rebuilt the
/// same way as at submission, so old and new cards are interchangeable.
pub async fn resend_cards(ctx: &AppContext, claims: &[PaymentClaim]) -> usize {
    let mut delivered = 0;
    for claim in claims {
        let tokens = ctx.codec.encode_pair(TokenTarget {
            member_id: claim.member_id,
            amount: claim.amount,
        });
        let card = crate::services::notifier::ClaimCard::from(claim);
        if ctx
            .notifier
            .send_card(&card, claim.receipt_ref.as_deref(), &tokens)
            .await
            .is_some()
        {
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerStore, MEMBERS_SHEET, PAYMENTS_SHEET};
    use crate::models::MemberStatus;
    use crate::testing::{register, test_context, RecordingTransport, ADMIN_ID};
    use serde_json::json;

    const MEMBER: i64 = 5001;

    fn request(amount: f64, kind: ClaimKind) -> SubmitClaimRequest {
        SubmitClaimRequest {
            member_id: MEMBER,
            amount: Amount::new(amount).unwrap(),
            kind,
            receipt_ref: match kind {
                ClaimKind::Transfer => Some("AgACreceipt".to_string()),
                ClaimKind::Cash => None,
            },
        }
    }

    fn admin_action(token: &str, card: Option<MessageRef>) -> AdminAction {
        AdminAction {
            token: token.to_string(),
            approver: Approver {
                id: ADMIN_ID,
                display_name: "Coach".to_string(),
            },
            card,
        }
    }

    /// Buttons of the most recent admin card.
    fn last_card(transport: &RecordingTransport) -> (String, String, MessageRef) {
        let card = transport
            .sent_to(ADMIN_ID)
            .into_iter()
            .rev()
            .find(|m| m.keyboard.is_some())
            .expect("an admin card");
        let data = card.button_data();
        (
            data[0].to_string(),
            data[1].to_string(),
            MessageRef {
                chat_id: card.chat_id,
                message_id: card.message_id,
                has_media: card.photo.is_some(),
            },
        )
    }

    #[tokio::test]
    async fn test_submit_in_bounds_creates_one_pending_claim_and_card() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;

        for amount in [1000.0, 20000.0, 4321.5] {
            let accepted = submit(&ctx, request(amount, ClaimKind::Cash)).await.unwrap();
            assert!(accepted.admin_card.is_some());
            assert_ne!(accepted.tokens.approve, accepted.tokens.reject);
            for token in [&accepted.tokens.approve, &accepted.tokens.reject] {
                let (_, target) = ctx.codec.decode(token).unwrap();
                assert_eq!(target.member_id, MEMBER);
                assert_eq!(target.amount, Amount::new(amount).unwrap());
            }
        }

        let claims = ctx.ledger.list_claims().await.unwrap();
        assert_eq!(claims.len(), 3);
        assert!(claims.iter().all(|c| c.status == ClaimStatus::Pending));
        assert_eq!(store.snapshot(PAYMENTS_SHEET).len(), 4);
        assert_eq!(
            transport
                .sent_to(ADMIN_ID)
                .iter()
                .filter(|m| m.keyboard.is_some())
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_out_of_bounds_amount_writes_nothing() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;

        for amount in [999.99, 25000.0, 0.0, -5.0] {
            let err = submit(&ctx, request(amount, ClaimKind::Cash)).await.unwrap_err();
            assert!(matches!(err, ClaimError::Validation(_)), "{}", amount);
        }

        assert_eq!(store.snapshot(PAYMENTS_SHEET).len(), 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_member_cannot_submit() {
        let (ctx, _store, _transport) = test_context().await;
        assert!(matches!(
            submit(&ctx, request(8000.0, ClaimKind::Cash)).await,
            Err(ClaimError::MemberNotFound(MEMBER))
        ));
    }

    #[tokio::test]
    async fn test_failed_claim_write_sends_no_card() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        store.reject_writes_to(PAYMENTS_SHEET);

        assert!(matches!(
            submit(&ctx, request(8000.0, ClaimKind::Cash)).await,
            Err(ClaimError::LedgerWrite(_))
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cash_claim_approved() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        ctx.ledger
            .upsert_member_status(MEMBER, MemberStatus::Inactive)
            .await
            .unwrap();

        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let pending = ctx.ledger.list_claims().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ClaimKind::Cash);
        assert_eq!(pending[0].amount, Amount::new(8000.0).unwrap());

        let (approve, _, card) = last_card(&transport);
        let outcome = decide(&ctx, admin_action(&approve, Some(card.clone()))).await.unwrap();
        assert!(matches!(outcome, DecideOutcome::Decided(_)));
        assert_eq!(outcome.decided().rule, MatchRule::Exact);

        let claim = &ctx.ledger.list_claims().await.unwrap()[0];
        assert_eq!(claim.status, ClaimStatus::Confirmed);
        assert_eq!(claim.confirmed_by.as_deref(), Some("1"));
        assert!(claim.confirmed_at.is_some());

        let member = ctx.ledger.get_member(MEMBER).await.unwrap().unwrap();
        assert_eq!(member.last_payment_amount, Some(Amount::new(8000.0).unwrap()));
        assert_eq!(member.status, MemberStatus::Active);
        assert!(member.last_payment_date.is_some());

        let edits = transport.edited();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].message, card);
        assert!(edits[0].text.contains("<b>CONFIRMED</b> by Coach"));
        assert!(transport.sent_to(MEMBER).last().unwrap().text.contains("is confirmed"));
    }

    #[tokio::test]
    async fn test_duplicate_transfers_approve_most_recent() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;

        submit(&ctx, request(1500.0, ClaimKind::Transfer)).await.unwrap();
        submit(&ctx, request(1500.0, ClaimKind::Transfer)).await.unwrap();

        let (approve, _, card) = last_card(&transport);
        assert!(card.has_media);
        let outcome = decide(&ctx, admin_action(&approve, Some(card))).await.unwrap();
        assert_eq!(outcome.decided().claim.row, 3);

        let claims = ctx.ledger.list_claims().await.unwrap();
        let pending: Vec<_> = claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Pending)
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].row, 2);
        assert_eq!(pending[0].amount, Amount::new(1500.0).unwrap());
    }

    #[tokio::test]
    async fn test_reject_after_concurrent_approve_is_already_terminal() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();

        let (approve, reject, card) = last_card(&transport);
        decide(&ctx, admin_action(&approve, Some(card.clone()))).await.unwrap();
        let member_messages = transport.sent_to(MEMBER).len();

        let err = decide(&ctx, admin_action(&reject, Some(card))).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::AlreadyTerminal {
                status: ClaimStatus::Confirmed,
                row: 2
            }
        ));
        assert_eq!(transport.sent_to(MEMBER).len(), member_messages);
        assert_eq!(
            ctx.ledger.list_claims().await.unwrap()[0].status,
            ClaimStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_concurrent_actions_apply_once() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve, reject, _) = last_card(&transport);

        let (a, b) = tokio::join!(
            decide(&ctx, admin_action(&approve, None)),
            decide(&ctx, admin_action(&reject, None))
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ClaimError::AlreadyTerminal { .. })))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_second_approve_never_double_applies() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve, _, _) = last_card(&transport);

        decide(&ctx, admin_action(&approve, None)).await.unwrap();
        let members_after_first = store.snapshot(MEMBERS_SHEET);

        assert!(matches!(
            decide(&ctx, admin_action(&approve, None)).await,
            Err(ClaimError::AlreadyTerminal { .. })
        ));
        assert_eq!(store.snapshot(MEMBERS_SHEET), members_after_first);
    }

    #[tokio::test]
    async fn test_old_card_does_not_confirm_newer_claim() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;

        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve_8000, _, _) = last_card(&transport);
        decide(&ctx, admin_action(&approve_8000, None)).await.unwrap();

        submit(&ctx, request(5000.0, ClaimKind::Cash)).await.unwrap();
        let members_before = store.snapshot(MEMBERS_SHEET);

        assert!(matches!(
            decide(&ctx, admin_action(&approve_8000, None)).await,
            Err(ClaimError::AlreadyTerminal {
                status: ClaimStatus::Confirmed,
                row: 2
            })
        ));

        let claims = ctx.ledger.list_claims().await.unwrap();
        assert_eq!(claims[1].row, 3);
        assert_eq!(claims[1].status, ClaimStatus::Pending);
        assert_eq!(store.snapshot(MEMBERS_SHEET), members_before);
        assert_eq!(
            ctx.ledger.get_member(MEMBER).await.unwrap().unwrap().last_payment_amount,
            Some(Amount::new(8000.0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_decision_time_is_taken_after_waiting_for_the_lock() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve, _, _) = last_card(&transport);

        let guard = ctx.decide_lock.lock().await;
        let pending = decide(&ctx, admin_action(&approve, None));
        tokio::pin!(pending);
        assert!(poll_once(&mut pending).await.is_none());
        let released_at = chrono::Local::now().naive_local();
        drop(guard);

        let outcome = pending.await.unwrap();
        let confirmed_at = outcome.decided().claim.confirmed_at.unwrap();
        assert!(confirmed_at >= released_at);
    }

    /// Polls `fut` once, yielding its output if it completed.
    async fn poll_once<F: std::future::Future + Unpin>(fut: &mut F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            _ = std::future::ready(()) => None,
        }
    }

    #[tokio::test]
    async fn test_over_max_amount_is_rejected() {
        let (ctx, store, _transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;

        let err = submit(&ctx, request(25000.0, ClaimKind::Transfer)).await.unwrap_err();
        assert_eq!(err.to_string(), "The amount must be between 1000 and 20000");
        assert_eq!(store.snapshot(PAYMENTS_SHEET).len(), 1);
    }

    #[tokio::test]
    async fn test_locale_formatted_amounts_match() {
        let (ctx, store, _transport) = test_context().await;
        for (i, stored) in [json!("1 000,50"), json!("1000.50"), json!(1000.5)].into_iter().enumerate() {
            let member_id = 7000 + i as i64;
            register(&ctx, member_id, "Drift").await;
            store
                .append_row(
                    PAYMENTS_SHEET,
                    vec![
                        json!("2024-06-01 10:00:00"),
                        json!("Drift"),
                        json!(member_id),
                        stored,
                        json!("transfer"),
                        json!("pending"),
                    ],
                )
                .await
                .unwrap();

            let token = format!("pay_ok_{}_1000.5", member_id);
            let outcome = decide(&ctx, admin_action(&token, None)).await.unwrap();
            assert!(matches!(
                outcome.decided().rule,
                MatchRule::Exact | MatchRule::Approximate
            ));
            assert_eq!(outcome.decided().claim.member_id, member_id);
        }
    }

    #[tokio::test]
    async fn test_hashed_token_resolves_through_decide() {
        let (ctx, store, _transport) = test_context().await;
        let member_id = i64::MAX;
        register(&ctx, member_id, "Long").await;
        let amount = Amount::new(1.0e40).unwrap();
        store
            .append_row(
                PAYMENTS_SHEET,
                vec![
                    json!("2024-06-01 10:00:00"),
                    json!("Long"),
                    json!(member_id),
                    amount.to_cell(),
                    json!("cash"),
                    json!("pending"),
                ],
            )
            .await
            .unwrap();

        let token = ctx.codec.encode(ActionKind::Reject, TokenTarget { member_id, amount });
        assert!(!token.contains(&member_id.to_string()));

        let outcome = decide(&ctx, admin_action(&token, None)).await.unwrap();
        assert_eq!(outcome.decided().decision, Decision::Reject);
        assert_eq!(
            ctx.ledger.list_claims().await.unwrap()[0].status,
            ClaimStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_member_update_failure_is_partial_success() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve, _, card) = last_card(&transport);

        store.reject_writes_to(MEMBERS_SHEET);
        let outcome = decide(&ctx, admin_action(&approve, Some(card))).await.unwrap();

        assert!(matches!(outcome, DecideOutcome::PartiallyApplied(_)));
        assert_eq!(
            ctx.ledger.list_claims().await.unwrap()[0].status,
            ClaimStatus::Confirmed
        );
        assert!(transport.edited()[0].text.contains("member account was not updated"));
    }

    #[tokio::test]
    async fn test_claim_write_failure_leaves_claim_pending() {
        let (ctx, store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve, _, card) = last_card(&transport);
        let member_messages = transport.sent_to(MEMBER).len();

        store.reject_writes_to(PAYMENTS_SHEET);
        assert!(matches!(
            decide(&ctx, admin_action(&approve, Some(card.clone()))).await,
            Err(ClaimError::LedgerWrite(_))
        ));
        assert_eq!(
            ctx.ledger.list_claims().await.unwrap()[0].status,
            ClaimStatus::Pending
        );
        assert_eq!(transport.sent_to(MEMBER).len(), member_messages);
        assert!(transport.edited().is_empty());

        store.accept_writes_to(PAYMENTS_SHEET);
        assert!(matches!(
            decide(&ctx, admin_action(&approve, Some(card))).await,
            Ok(DecideOutcome::Decided(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_decision() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(8000.0, ClaimKind::Cash)).await.unwrap();
        let (approve, _, card) = last_card(&transport);

        transport.fail_deliveries_to(MEMBER);
        transport.fail_deliveries_to(ADMIN_ID);
        let outcome = decide(&ctx, admin_action(&approve, Some(card))).await.unwrap();

        assert!(matches!(outcome, DecideOutcome::Decided(_)));
        assert_eq!(
            ctx.ledger.list_claims().await.unwrap()[0].status,
            ClaimStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_pending_cards_are_resent_newest_first() {
        let (ctx, _store, transport) = test_context().await;
        register(&ctx, MEMBER, "Aida").await;
        submit(&ctx, request(1000.0, ClaimKind::Cash)).await.unwrap();
        submit(&ctx, request(2000.0, ClaimKind::Cash)).await.unwrap();
        let original = transport.sent_to(ADMIN_ID);

        let pending = list_pending(&ctx, 10).await.unwrap();
        assert_eq!(pending.iter().map(|c| c.row).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(resend_cards(&ctx, &pending).await, 2);

        let resent = transport.sent_to(ADMIN_ID);
        assert_eq!(resent[2].button_data(), original[1].button_data());
    }

    #[tokio::test]
    async fn test_foreign_token_is_reported() {
        let (ctx, _store, _transport) = test_context().await;
        assert!(matches!(
            decide(&ctx, admin_action("pay_ok_garbage", None)).await,
            Err(ClaimError::Token(TokenError::Malformed(_)))
        ));
        assert!(matches!(
            decide(&ctx, admin_action("pay_ok_5001_8000", None)).await,
            Err(ClaimError::ClaimNotFound { member_id: 5001, .. })
        ));
    }
}
