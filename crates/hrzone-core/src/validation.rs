use std::{fmt, num::IntErrorKind, ops::RangeInclusive};

pub const AGE_RANGE: RangeInclusive<i64> = 1..=150;
pub const RESTING_HR_RANGE: RangeInclusive<i64> = 20..=100;

/// Which dialogue field a value was entered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Age,
    RestingHeartRate,
}

impl Field {
    pub fn range(self) -> RangeInclusive<i64> {
        match self {
            Field::Age => AGE_RANGE,
            Field::RestingHeartRate => RESTING_HR_RANGE,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Age => f.write_str("age"),
            Field::RestingHeartRate => f.write_str("resting heart rate"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInput {
    #[error("{field} is not a number")]
    NotANumber { field: Field },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: Field, min: i64, max: i64 },
}

impl InvalidInput {
    pub fn field(&self) -> Field {
        match self {
            InvalidInput::NotANumber { field } | InvalidInput::OutOfRange { field, .. } => *field,
        }
    }
}

pub fn parse_age(raw: &str) -> Result<u32, InvalidInput> {
    parse_field(raw, Field::Age)
}

pub fn parse_resting_hr(raw: &str) -> Result<u32, InvalidInput> {
    parse_field(raw, Field::RestingHeartRate)
}

fn parse_field(raw: &str, field: Field) -> Result<u32, InvalidInput> {
    let range = field.range();
    let out_of_range = InvalidInput::OutOfRange {
        field,
        min: *range.start(),
        max: *range.end(),
    };

    let value = match raw.trim().parse::<i64>() {
        Ok(v) => v,
        // An integer literal too large for i64 is still a number, just not a plausible one.
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            return Err(out_of_range)
        }
        Err(_) => return Err(InvalidInput::NotANumber { field }),
    };

    if !range.contains(&value) {
        return Err(out_of_range);
    }
    u32::try_from(value).map_err(|_| out_of_range)
}
