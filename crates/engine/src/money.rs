use std::{
    fmt,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Signed money amount represented as **integer kobo** (₦1 = 100 kobo).
///
/// Use this type for **all** monetary values in the engine (balances,
/// transaction amounts, allocation results) to avoid floating-point drift.
/// Conversion to a decimal display value happens only here, at the
/// presentation boundary, never inside a calculation.
///
/// The value is signed:
/// - positive = money owed / received
/// - negative = reversal / decrease
///
/// # Examples
///
/// ```rust
/// use engine::Kobo;
///
/// let amount = Kobo::new(12_34);
/// assert_eq!(amount.kobo(), 1234);
/// assert_eq!(amount.to_string(), "₦12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator and an
/// optional leading `₦`; rejects > 2 decimals):
///
/// ```rust
/// use engine::Kobo;
///
/// assert_eq!("10".parse::<Kobo>().unwrap().kobo(), 1000);
/// assert_eq!("₦10,5".parse::<Kobo>().unwrap().kobo(), 1050);
/// assert!("12.345".parse::<Kobo>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Kobo(i64);

impl Kobo {
    pub const ZERO: Kobo = Kobo(0);

    /// Creates a new amount from integer kobo.
    #[must_use]
    pub const fn new(kobo: i64) -> Self {
        Self(kobo)
    }

    /// Returns the raw value in kobo.
    #[must_use]
    pub const fn kobo(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Returns the smaller of two amounts.
    #[must_use]
    pub fn min(self, rhs: Kobo) -> Kobo {
        Kobo(self.0.min(rhs.0))
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Kobo) -> Option<Kobo> {
        self.0.checked_add(rhs.0).map(Kobo)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Kobo) -> Option<Kobo> {
        self.0.checked_sub(rhs.0).map(Kobo)
    }

    /// Subtraction clamped at zero, for running balances that must never go
    /// negative (debt replay, credit consumption).
    #[must_use]
    pub fn sub_clamped(self, rhs: Kobo) -> Kobo {
        Kobo((self.0 - rhs.0).max(0))
    }
}

impl fmt::Display for Kobo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let naira = abs / 100;
        let kobo = abs % 100;
        write!(f, "{sign}₦{naira}.{kobo:02}")
    }
}

impl From<i64> for Kobo {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Kobo> for i64 {
    fn from(value: Kobo) -> Self {
        value.0
    }
}

impl Add for Kobo {
    type Output = Kobo;

    fn add(self, rhs: Kobo) -> Self::Output {
        Kobo(self.0 + rhs.0)
    }
}

impl AddAssign for Kobo {
    fn add_assign(&mut self, rhs: Kobo) {
        self.0 += rhs.0;
    }
}

impl Sub for Kobo {
    type Output = Kobo;

    fn sub(self, rhs: Kobo) -> Self::Output {
        Kobo(self.0 - rhs.0)
    }
}

impl SubAssign for Kobo {
    fn sub_assign(&mut self, rhs: Kobo) {
        self.0 -= rhs.0;
    }
}

impl Neg for Kobo {
    type Output = Kobo;

    fn neg(self) -> Self::Output {
        Kobo(-self.0)
    }
}

impl FromStr for Kobo {
    type Err = LedgerError;

    /// Parses a decimal naira string into kobo.
    ///
    /// Accepts `.` or `,` as decimal separator, an optional leading `+`/`-`
    /// and an optional `₦` prefix.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`), so no rounding ever
    ///   happens here
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || LedgerError::InvalidAmount("empty amount".to_string());
        let invalid = || LedgerError::InvalidAmount("invalid amount".to_string());
        let overflow = || LedgerError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (sign, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (-1i64, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (1i64, stripped)
        } else {
            (1i64, trimmed)
        };

        let rest = rest.trim().trim_start_matches('₦').trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let naira_str = parts.next().ok_or_else(invalid)?;
        let kobo_str = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if naira_str.is_empty() || !naira_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let naira: i64 = naira_str.parse().map_err(|_| invalid())?;

        let kobo: i64 = match kobo_str {
            None => 0,
            Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                match frac.len() {
                    0 => 0,
                    1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                    2 => frac.parse::<i64>().map_err(|_| invalid())?,
                    _ => {
                        return Err(LedgerError::InvalidAmount(
                            "too many decimals".to_string(),
                        ));
                    }
                }
            }
        };

        let total = naira
            .checked_mul(100)
            .and_then(|v| v.checked_add(kobo))
            .ok_or_else(overflow)?;

        let signed = if sign < 0 {
            total.checked_neg().ok_or_else(overflow)?
        } else {
            total
        };

        Ok(Kobo(signed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_naira() {
        assert_eq!(Kobo::new(0).to_string(), "₦0.00");
        assert_eq!(Kobo::new(1).to_string(), "₦0.01");
        assert_eq!(Kobo::new(10).to_string(), "₦0.10");
        assert_eq!(Kobo::new(1050).to_string(), "₦10.50");
        assert_eq!(Kobo::new(-1050).to_string(), "-₦10.50");
    }

    #[test]
    fn parse_accepts_dot_comma_and_naira_sign() {
        assert_eq!("10".parse::<Kobo>().unwrap().kobo(), 1000);
        assert_eq!("10.5".parse::<Kobo>().unwrap().kobo(), 1050);
        assert_eq!("10,50".parse::<Kobo>().unwrap().kobo(), 1050);
        assert_eq!("₦250.00".parse::<Kobo>().unwrap().kobo(), 25000);
        assert_eq!("-0.01".parse::<Kobo>().unwrap().kobo(), -1);
        assert_eq!("  ₦2.30 ".parse::<Kobo>().unwrap().kobo(), 230);
    }

    #[test]
    fn parse_rejects_more_than_two_decimals() {
        assert!("12.345".parse::<Kobo>().is_err());
        assert!("0.001".parse::<Kobo>().is_err());
    }

    #[test]
    fn display_parse_round_trip_preserves_kobo() {
        for kobo in [0, 1, 99, 100, 12_567, 25_000, 1_000_000_001] {
            let rendered = Kobo::new(kobo).to_string();
            assert_eq!(rendered.parse::<Kobo>().unwrap().kobo(), kobo);
        }
    }

    #[test]
    fn sub_clamped_never_goes_negative() {
        assert_eq!(Kobo::new(100).sub_clamped(Kobo::new(40)).kobo(), 60);
        assert_eq!(Kobo::new(100).sub_clamped(Kobo::new(250)).kobo(), 0);
    }
}
