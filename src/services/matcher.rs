use crate::models::{ClaimStatus, PaymentClaim};
use crate::services::token_codec::TokenTarget;

/// Which rule selected the pending claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Exact,
    Approximate,
    MostRecentPending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Pending {
        claim: PaymentClaim,
        rule: MatchRule,
    },
    /// No pending claim fits, but a matching claim was already decided.
    AlreadyTerminal(PaymentClaim),
    NotFound,
}

/// Picks the claim an admin action refers to.
///
/// Only the target member's claims are considered. Among pending claims an
/// exact amount match wins, then a match within the amount tolerance, the most
/// recently submitted claim winning ties. Failing both, the member's most
/// recent claim is taken if it is still pending, unless a decided claim
/// matches the amount: a repeated action on an already decided claim resolves
/// to [`MatchOutcome::AlreadyTerminal`] before any fallback is tried.
pub fn locate_claim(claims: &[PaymentClaim], target: &TokenTarget) -> MatchOutcome {
    let own: Vec<&PaymentClaim> = claims
        .iter()
        .filter(|c| c.member_id == target.member_id)
        .collect();

    let pending = |c: &PaymentClaim| c.status == ClaimStatus::Pending;

    if let Some(claim) = most_recent(&own, |c| pending(c) && c.amount.exactly_matches(target.amount)) {
        return MatchOutcome::Pending {
            claim: claim.clone(),
            rule: MatchRule::Exact,
        };
    }

    if let Some(claim) = most_recent(&own, |c| pending(c) && c.amount.approx_matches(target.amount)) {
        return MatchOutcome::Pending {
            claim: claim.clone(),
            rule: MatchRule::Approximate,
        };
    }

    // A decided claim at this amount means the action was already applied.
    if let Some(decided) = most_recent(&own, |c| !pending(c) && c.amount.approx_matches(target.amount)) {
        return MatchOutcome::AlreadyTerminal(decided.clone());
    }

    match most_recent(&own, |_| true) {
        Some(latest) if pending(latest) => {
            tracing::warn!(
                member_id = target.member_id,
                token_amount = %target.amount,
                claim_amount = %latest.amount,
                row = latest.row,
                "No claim matches the action amount, using the most recent pending claim"
            );
            MatchOutcome::Pending {
                claim: latest.clone(),
                rule: MatchRule::MostRecentPending,
            }
        }
        _ => MatchOutcome::NotFound,
    }
}

fn most_recent<'a>(
    claims: &[&'a PaymentClaim],
    pred: impl Fn(&PaymentClaim) -> bool,
) -> Option<&'a PaymentClaim> {
    claims
        .iter()
        .copied()
        .filter(|c| pred(c))
        .max_by_key(|c| c.recency_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amount, ClaimKind};
    use chrono::NaiveDate;

    fn claim(row: u32, member_id: i64, amount: f64, status: ClaimStatus, hour: u32) -> PaymentClaim {
        PaymentClaim {
            row,
            submitted_at: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0),
            member_id,
            member_name: "Aida".to_string(),
            amount: Amount::new(amount).unwrap(),
            kind: ClaimKind::Cash,
            status,
            receipt_ref: None,
            confirmed_by: None,
            confirmed_at: None,
            sessions_at_submission: 0,
        }
    }

    fn target(member_id: i64, amount: f64) -> TokenTarget {
        TokenTarget {
            member_id,
            amount: Amount::new(amount).unwrap(),
        }
    }

    fn picked(outcome: MatchOutcome) -> (u32, MatchRule) {
        match outcome {
            MatchOutcome::Pending { claim, rule } => (claim.row, rule),
            other => panic!("expected a pending match, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_match_prefers_most_recent() {
        let claims = vec![
            claim(2, 7, 8000.0, ClaimStatus::Pending, 9),
            claim(3, 7, 8000.0, ClaimStatus::Pending, 11),
            claim(4, 8, 8000.0, ClaimStatus::Pending, 12),
        ];
        assert_eq!(picked(locate_claim(&claims, &target(7, 8000.0))), (3, MatchRule::Exact));
    }

    #[test]
    fn test_exact_beats_more_recent_approximate() {
        let claims = vec![
            claim(2, 7, 1000.5, ClaimStatus::Pending, 9),
            claim(3, 7, 1000.505, ClaimStatus::Pending, 11),
        ];
        assert_eq!(picked(locate_claim(&claims, &target(7, 1000.5))), (2, MatchRule::Exact));
    }

    #[test]
    fn test_approximate_match_within_tolerance() {
        let claims = vec![claim(2, 7, 1000.504, ClaimStatus::Pending, 9)];
        assert_eq!(
            picked(locate_claim(&claims, &target(7, 1000.5))),
            (2, MatchRule::Approximate)
        );
    }

    #[test]
    fn test_falls_back_to_most_recent_pending() {
        let claims = vec![
            claim(2, 7, 5000.0, ClaimStatus::Pending, 9),
            claim(3, 7, 6000.0, ClaimStatus::Pending, 10),
        ];
        assert_eq!(
            picked(locate_claim(&claims, &target(7, 8000.0))),
            (3, MatchRule::MostRecentPending)
        );
    }

    #[test]
    fn test_no_fallback_when_latest_claim_is_decided() {
        let claims = vec![
            claim(2, 7, 5000.0, ClaimStatus::Pending, 9),
            claim(3, 7, 6000.0, ClaimStatus::Rejected, 10),
        ];
        assert_eq!(locate_claim(&claims, &target(7, 8000.0)), MatchOutcome::NotFound);
    }

    #[test]
    fn test_repeated_action_sees_terminal_claim() {
        let claims = vec![
            claim(2, 7, 8000.0, ClaimStatus::Confirmed, 9),
            claim(3, 9, 8000.0, ClaimStatus::Pending, 10),
        ];
        assert!(matches!(
            locate_claim(&claims, &target(7, 8000.0)),
            MatchOutcome::AlreadyTerminal(c) if c.row == 2
        ));
    }

    #[test]
    fn test_repeated_action_does_not_fall_back_to_newer_pending_claim() {
        let claims = vec![
            claim(2, 7, 8000.0, ClaimStatus::Confirmed, 9),
            claim(3, 7, 5000.0, ClaimStatus::Pending, 10),
        ];
        assert!(matches!(
            locate_claim(&claims, &target(7, 8000.0)),
            MatchOutcome::AlreadyTerminal(c) if c.row == 2
        ));
        assert_eq!(picked(locate_claim(&claims, &target(7, 5000.0))), (3, MatchRule::Exact));
    }

    #[test]
    fn test_other_members_claims_are_ignored() {
        let claims = vec![claim(2, 8, 8000.0, ClaimStatus::Pending, 9)];
        assert_eq!(locate_claim(&claims, &target(7, 8000.0)), MatchOutcome::NotFound);
    }

    #[test]
    fn test_row_breaks_timestamp_ties() {
        let claims = vec![
            claim(5, 7, 8000.0, ClaimStatus::Pending, 9),
            claim(6, 7, 8000.0, ClaimStatus::Pending, 9),
        ];
        assert_eq!(picked(locate_claim(&claims, &target(7, 8000.0))), (6, MatchRule::Exact));
    }
}
