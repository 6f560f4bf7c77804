// Models module - typed ledger records and the cell parsing boundary

pub mod amount;
pub mod attendance;
pub mod cell;
pub mod claim;
pub mod member;
pub mod settings;

pub use amount::Amount;
pub use attendance::{AttendanceEvent, AttendanceStatus};
pub use claim::{ClaimKind, ClaimStatus, Decision, NewClaim, PaymentClaim};
pub use member::{Member, MemberStatus, NewMember};
pub use settings::{PaymentBounds, SettingKey, SettingValue};
