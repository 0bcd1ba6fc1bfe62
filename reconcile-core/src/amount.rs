//! Exact decimal amounts for line totals
//!
//! Form inputs carry quantities and prices as JSON numbers or numeric
//! strings. Totals must not drift, so values are kept as scaled integers:
//! a product keeps the summed scale of its factors and a sum aligns to the
//! larger scale. Nothing is rounded.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Largest scale kept; i128 holds 38 significant digits.
const MAX_SCALE: u32 = 28;

/// Exact decimal: `units / 10^scale`.
#[derive(Debug, Clone, Copy)]
pub struct Amount {
    units: i128,
    scale: u32,
}

impl Amount {
    pub const ZERO: Amount = Amount { units: 0, scale: 0 };

    pub fn new(units: i128, scale: u32) -> Self {
        Self { units, scale }
    }

    pub fn units(&self) -> i128 {
        self.units
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Read a field value. `None` for anything that is not a finite decimal
    /// (null, bool, empty or partially typed strings such as `"-"`).
    /// A trailing dot reads as the integer typed so far: `"1."` is 1.
    pub fn from_json(value: &Value) -> Option<Amount> {
        match value {
            Value::Number(n) => Self::parse(&n.to_string()),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Parse decimal text, with optional sign and exponent.
    pub fn parse(raw: &str) -> Option<Amount> {
        let text = raw.trim();
        let (negative, text) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let (mantissa, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
            None => (text, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut units: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            units = units.checked_mul(10)?.checked_add((b - b'0') as i128)?;
        }
        let mut scale = frac_part.len() as i64 - exponent as i64;
        if scale < 0 {
            units = units.checked_mul(pow10(u32::try_from(-scale).ok()?)?)?;
            scale = 0;
        }
        let amount = Amount {
            units: if negative { -units } else { units },
            scale: u32::try_from(scale).ok()?,
        };
        if amount.scale > MAX_SCALE {
            let reduced = amount.normalized();
            return (reduced.scale <= MAX_SCALE).then_some(reduced);
        }
        Some(amount)
    }

    /// Sum, aligned to the larger scale.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        let scale = self.scale.max(other.scale);
        let a = self.rescaled(scale)?;
        let b = other.rescaled(scale)?;
        Some(Amount {
            units: a.checked_add(b)?,
            scale,
        })
    }

    /// Product, keeping the summed scale of both factors.
    pub fn checked_mul(self, other: Amount) -> Option<Amount> {
        let (a, b) = if self.scale + other.scale > MAX_SCALE {
            (self.normalized(), other.normalized())
        } else {
            (self, other)
        };
        let scale = a.scale + b.scale;
        if scale > MAX_SCALE {
            return None;
        }
        Some(Amount {
            units: a.units.checked_mul(b.units)?,
            scale,
        })
    }

    /// Same value with trailing fractional zeros removed.
    pub fn normalized(self) -> Amount {
        let mut out = self;
        while out.scale > 0 && out.units % 10 == 0 {
            out.units /= 10;
            out.scale -= 1;
        }
        out
    }

    pub fn to_f64(&self) -> f64 {
        self.units as f64 / 10f64.powi(self.scale as i32)
    }

    fn rescaled(&self, scale: u32) -> Option<i128> {
        self.units.checked_mul(pow10(scale - self.scale)?)
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

impl Default for Amount {
    fn default() -> Self {
        Amount::ZERO
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount {
            units: value as i128,
            scale: 0,
        }
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Amount {}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.normalized();
        let b = other.normalized();
        let scale = a.scale.max(b.scale);
        match (a.rescaled(scale), b.rescaled(scale)) {
            (Some(x), Some(y)) => x.cmp(&y),
            // Only reachable near i128 limits; compare approximately
            _ => a.to_f64().total_cmp(&b.to_f64()),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.units < 0 { "-" } else { "" };
        let digits = self.units.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Amount::parse(s).ok_or_else(|| format!("not a decimal: {}", s))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Amount::from_json(&value).ok_or_else(|| D::Error::custom(format!("not a decimal: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn test_parse_numbers_and_strings() {
        assert_eq!(Amount::from_json(&json!(10)), Some(Amount::from(10)));
        assert_eq!(Amount::from_json(&json!("10.50")).unwrap().scale(), 2);
        assert_eq!(Amount::from_json(&json!(2.5)), Some(amt("2.5")));
        assert_eq!(amt("1e3"), Amount::from(1000));
        assert_eq!(amt("-0.25").units(), -25);
        assert_eq!(amt(".5"), amt("0.5"));
    }

    #[test]
    fn test_mid_edit_values() {
        assert!(Amount::from_json(&json!("")).is_none());
        assert!(Amount::from_json(&json!(".")).is_none());
        assert!(Amount::from_json(&json!("-")).is_none());
        assert!(Amount::from_json(&json!("-.")).is_none());
        assert!(Amount::from_json(&json!("12abc")).is_none());
        assert!(Amount::from_json(&json!(null)).is_none());
        assert!(Amount::from_json(&json!(true)).is_none());

        // Typing "1.5" passes through "1." without dropping to zero
        assert_eq!(Amount::from_json(&json!("1")), Some(Amount::from(1)));
        assert_eq!(Amount::from_json(&json!("1.")), Some(Amount::from(1)));
        assert_eq!(Amount::from_json(&json!("1.5")).unwrap().to_string(), "1.5");
        assert_eq!(Amount::from_json(&json!("-2.")), Some(Amount::from(-2)));
    }

    #[test]
    fn test_product_keeps_precision() {
        let line = amt("3").checked_mul(amt("10.50")).unwrap();
        assert_eq!(line.to_string(), "31.50");

        let line = amt("0.1").checked_mul(amt("0.2")).unwrap();
        assert_eq!(line.to_string(), "0.02");
    }

    #[test]
    fn test_sum_does_not_drift() {
        let mut total = Amount::ZERO;
        for _ in 0..10 {
            total = total.checked_add(amt("0.1")).unwrap();
        }
        assert_eq!(total, Amount::from(1));
        assert_eq!(total.to_string(), "1.0");
    }

    #[test]
    fn test_equality_ignores_trailing_zeros() {
        assert_eq!(amt("2.50"), amt("2.5"));
        assert!(amt("2.49") < amt("2.5"));
        assert_eq!(amt("-0.05").to_string(), "-0.05");
    }

    #[test]
    fn test_serializes_as_string() {
        assert_eq!(serde_json::to_value(amt("26.00")).unwrap(), json!("26.00"));
        let back: Amount = serde_json::from_value(json!("26.00")).unwrap();
        assert_eq!(back, Amount::from(26));
    }
}
