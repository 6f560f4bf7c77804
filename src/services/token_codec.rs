// Reference codec for admin action buttons.
//
// The chat platform caps callback data at 64 bytes. A token carries the action
// and the (member, amount) pair that identifies the claim. When the direct
// form does not fit, a hashed form is issued and remembered in-process.

use ring::digest::{digest, SHA256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::models::Amount;

pub const MAX_TOKEN_LEN: usize = 64;
pub const APPROVE_PREFIX: &str = "pay_ok";
pub const REJECT_PREFIX: &str = "pay_no";

const MEMBER_HASH_LEN: usize = 8;
const AMOUNT_HASH_LEN: usize = 6;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Unknown action in token {0:?}")]
    UnknownAction(String),

    #[error("Malformed token {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Approve,
    Reject,
}

impl ActionKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ActionKind::Approve => APPROVE_PREFIX,
            ActionKind::Reject => REJECT_PREFIX,
        }
    }
}

/// The claim a token points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenTarget {
    pub member_id: i64,
    pub amount: Amount,
}

/// Both buttons of an admin card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub approve: String,
    pub reject: String,
}

#[derive(Default)]
pub struct TokenCodec {
    hashed: RwLock<HashMap<String, TokenTarget>>,
}

fn short_hash(input: &str, len: usize) -> String {
    let mut encoded = hex::encode(digest(&SHA256, input.as_bytes()));
    encoded.truncate(len);
    encoded
}

impl TokenCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self, action: ActionKind, target: TokenTarget) -> String {
        let direct = format!("{}_{}_{}", action.prefix(), target.member_id, target.amount);
        if direct.len() <= MAX_TOKEN_LEN {
            return direct;
        }

        let hashed = format!(
            "{}_{}_{}",
            action.prefix(),
            short_hash(&target.member_id.to_string(), MEMBER_HASH_LEN),
            short_hash(&target.amount.to_string(), AMOUNT_HASH_LEN),
        );
        self.hashed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hashed.clone(), target);
        tracing::debug!(token = %hashed, "Issued hashed action token");
        hashed
    }

    pub fn encode_pair(&self, target: TokenTarget) -> TokenPair {
        TokenPair {
            approve: self.encode(ActionKind::Approve, target),
            reject: self.encode(ActionKind::Reject, target),
        }
    }

    pub fn decode(&self, token: &str) -> Result<(ActionKind, TokenTarget), TokenError> {
        let (action, rest) = if let Some(rest) = strip_action(token, APPROVE_PREFIX) {
            (ActionKind::Approve, rest)
        } else if let Some(rest) = strip_action(token, REJECT_PREFIX) {
            (ActionKind::Reject, rest)
        } else {
            return Err(TokenError::UnknownAction(token.to_string()));
        };

        // Hashed entries take precedence over parsing.
        if let Some(target) = self
            .hashed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
        {
            return Ok((action, *target));
        }

        let malformed = || TokenError::Malformed(token.to_string());
        let (member, amount) = rest.split_once('_').ok_or_else(malformed)?;
        let member_id = member.parse::<i64>().map_err(|_| malformed())?;
        let amount = Amount::parse(amount).map_err(|_| malformed())?;

        Ok((action, TokenTarget { member_id, amount }))
    }
}

fn strip_action<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    token.strip_prefix(prefix)?.strip_prefix('_')
}
