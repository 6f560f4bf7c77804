use serde_json::Value;
use std::fmt;

use super::cell;

pub const HEADERS: [&str; 3] = ["parameter", "value", "description"];

pub mod columns {
    pub const KEY: usize = 1;
    pub const VALUE: usize = 2;
}

const DEFAULT_SCHEDULE: &str = "Mon-Wed-Fri: 7:00-12:00 (group)\nTue-Thu-Sat: by appointment";

const DEFAULT_RULES: &str = "GYM RULES

PAYMENT
- Monthly pass: 8000 for 10 sessions
- Payments by transfer (with receipt) or in cash
- Every payment is confirmed by the administrator

FREEZING
- Without a reason: up to 7 sessions in a row
- When sick: up to 3 sessions in a row, marked in the bot with /sick

ATTENDANCE
- Come on schedule or by appointment
- Cancelling less than 2 hours before a session burns the session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MinPayment,
    MaxPayment,
    MonthlyPrice,
    SessionsPerMonth,
    FreeDaysLimit,
    SickDaysLimit,
    GymSchedule,
    GymRules,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::MinPayment,
        SettingKey::MaxPayment,
        SettingKey::MonthlyPrice,
        SettingKey::SessionsPerMonth,
        SettingKey::FreeDaysLimit,
        SettingKey::SickDaysLimit,
        SettingKey::GymSchedule,
        SettingKey::GymRules,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::MinPayment => "min_payment",
            SettingKey::MaxPayment => "max_payment",
            SettingKey::MonthlyPrice => "monthly_price",
            SettingKey::SessionsPerMonth => "sessions_per_month",
            SettingKey::FreeDaysLimit => "free_days_limit",
            SettingKey::SickDaysLimit => "sick_days_limit",
            SettingKey::GymSchedule => "gym_schedule",
            SettingKey::GymRules => "gym_rules",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key.trim())
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, SettingKey::GymSchedule | SettingKey::GymRules)
    }

    pub fn default_value(self) -> SettingValue {
        match self {
            SettingKey::MinPayment => SettingValue::Integer(1000),
            SettingKey::MaxPayment => SettingValue::Integer(20000),
            SettingKey::MonthlyPrice => SettingValue::Integer(8000),
            SettingKey::SessionsPerMonth => SettingValue::Integer(10),
            SettingKey::FreeDaysLimit => SettingValue::Integer(7),
            SettingKey::SickDaysLimit => SettingValue::Integer(3),
            SettingKey::GymSchedule => SettingValue::Text(DEFAULT_SCHEDULE.to_string()),
            SettingKey::GymRules => SettingValue::Text(DEFAULT_RULES.to_string()),
        }
    }

    /// Converts a stored cell into this key's type; `None` when the stored
    /// value does not fit the key.
    pub fn value_from_cell(self, cell_value: &Value) -> Option<SettingValue> {
        if self.is_integer() {
            cell::integer(cell_value).map(SettingValue::Integer)
        } else {
            cell::optional_text(cell_value).map(SettingValue::Text)
        }
    }

    /// Validates operator input for this key.
    pub fn value_from_input(self, input: &str) -> Result<SettingValue, String> {
        let input = input.trim();
        if self.is_integer() {
            let value = cell::integer(&Value::from(input))
                .ok_or_else(|| format!("{} expects a whole number", self.as_str()))?;
            if value < 0 {
                return Err(format!("{} cannot be negative", self.as_str()));
            }
            Ok(SettingValue::Integer(value))
        } else if input.is_empty() {
            Err(format!("{} cannot be empty", self.as_str()))
        } else {
            Ok(SettingValue::Text(input.to_string()))
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Integer(i64),
    Text(String),
}

impl SettingValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(n) => Some(*n),
            SettingValue::Text(_) => None,
        }
    }

    pub fn to_cell(&self) -> Value {
        match self {
            SettingValue::Integer(n) => Value::from(*n),
            SettingValue::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(n) => write!(f, "{}", n),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

/// Inclusive bounds for a single payment claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentBounds {
    pub min: i64,
    pub max: i64,
}
