use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// How busy a department is, derived from the number of pending tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl CrowdLevel {
    /// Pending counts strictly above this are [CrowdLevel::High]
    pub const HIGH_ABOVE: u32 = 20;
    /// Pending counts strictly above this are at least [CrowdLevel::Medium]
    pub const MEDIUM_ABOVE: u32 = 10;

    pub fn from_pending(pending: u32) -> Self {
        if pending > Self::HIGH_ABOVE {
            Self::High
        } else if pending > Self::MEDIUM_ABOVE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl Display for CrowdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrowdLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            other => Err(UnknownVariant::new("crowd level", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_exclusive() {
        assert_eq!(CrowdLevel::from_pending(0), CrowdLevel::Low);
        assert_eq!(CrowdLevel::from_pending(10), CrowdLevel::Low);
        assert_eq!(CrowdLevel::from_pending(11), CrowdLevel::Medium);
        assert_eq!(CrowdLevel::from_pending(20), CrowdLevel::Medium);
        assert_eq!(CrowdLevel::from_pending(21), CrowdLevel::High);
    }

    #[test]
    fn parses_stored_names() {
        assert_eq!("Medium".parse::<CrowdLevel>(), Ok(CrowdLevel::Medium));
        assert!("medium".parse::<CrowdLevel>().is_err());
    }
}
