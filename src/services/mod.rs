// Services module - Business logic

pub mod claims;
pub mod matcher;
pub mod members;
pub mod notifier;
pub mod telegram;
pub mod token_codec;
