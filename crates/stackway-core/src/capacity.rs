use crate::error::CoreError;
use std::fmt;
use std::str::FromStr;

/// A capacity requirement or capability value such as `"2GHz"` or `"4GB"`:
/// a numeric amount followed by a unit suffix. Comparisons are only defined
/// between values carrying the same unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityValue {
    amount: f64,
    unit: String,
}

impl CapacityValue {
    pub fn new(amount: f64, unit: impl Into<String>) -> Self {
        Self {
            amount,
            unit: unit.into(),
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Whether a capability of `offered` satisfies this requested value.
    /// Mismatched units never satisfy.
    pub fn satisfied_by(&self, offered: &CapacityValue) -> bool {
        self.unit.eq_ignore_ascii_case(&offered.unit) && self.amount <= offered.amount
    }
}

impl fmt::Display for CapacityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

impl FromStr for CapacityValue {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        let amount: f64 = number
            .parse()
            .map_err(|_| CoreError::invalid_capacity(s))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(CoreError::invalid_capacity(s));
        }
        Ok(CapacityValue {
            amount,
            unit: unit.trim().to_string(),
        })
    }
}
