use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Whole percent in `0..=100`, used for the battery level and charge limits.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(pub u8);

impl Percent {
    /// Signed difference in percentage points.
    #[must_use]
    pub fn points_above(self, rhs: Self) -> i32 {
        i32::from(self.0) - i32::from(rhs.0)
    }
}

impl TryFrom<u8> for Percent {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        ensure!(value <= 100, "{value}% is out of range");
        Ok(Self(value))
    }
}

impl From<Percent> for u8 {
    fn from(percent: Percent) -> Self {
        percent.0
    }
}

impl FromStr for Percent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s
            .trim()
            .trim_end_matches('%')
            .parse()
            .with_context(|| format!("`{s}` is not a whole percent"))?;
        Self::try_from(value)
    }
}

impl Debug for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_above() {
        assert_eq!(Percent(80).points_above(Percent(40)), 40);
        assert_eq!(Percent(40).points_above(Percent(80)), -40);
    }

    #[test]
    fn test_from_str_ok() -> Result {
        assert_eq!(Percent::from_str("70")?, Percent(70));
        assert_eq!(Percent::from_str("100%")?, Percent(100));
        Ok(())
    }

    #[test]
    fn test_from_str_out_of_range() {
        assert!(Percent::from_str("101").is_err());
        assert!(Percent::from_str("-1").is_err());
        assert!(Percent::from_str("seventy").is_err());
    }

    #[test]
    fn test_deserialize_transparent() -> Result {
        assert_eq!(serde_json::from_str::<Percent>("55")?, Percent(55));
        assert_eq!(serde_json::to_string(&Percent(55))?, "55");
        Ok(())
    }

    #[test]
    fn test_deserialize_out_of_range() {
        assert!(serde_json::from_str::<Percent>("101").is_err());
    }
}
