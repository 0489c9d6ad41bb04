//! Plan tiers and monthly credit grants.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Monthly credit grants for each plan tier.
pub const CREATOR_MONTHLY_CREDITS: u32 = 500;
pub const STUDIO_MONTHLY_CREDITS: u32 = 2000;

/// Plan tier enumeration.
///
/// Free users (and anonymous visitors) are served pre-generated demo
/// materials only; creator/studio subscribers get live generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Creator,
    Studio,
}

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown values map to Free.
    pub fn parse_or_free(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "creator" => PlanTier::Creator,
            "studio" => PlanTier::Studio,
            _ => PlanTier::Free,
        }
    }

    /// Whether this tier is an active subscription with live generation.
    pub fn is_subscriber(&self) -> bool {
        matches!(self, PlanTier::Creator | PlanTier::Studio)
    }

    /// Subscription credits granted each month.
    pub fn monthly_credits(&self) -> u32 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Creator => CREATOR_MONTHLY_CREDITS,
            PlanTier::Studio => STUDIO_MONTHLY_CREDITS,
        }
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Creator => "creator",
            PlanTier::Studio => "studio",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_free() {
        assert_eq!(PlanTier::parse_or_free("creator"), PlanTier::Creator);
        assert_eq!(PlanTier::parse_or_free("STUDIO"), PlanTier::Studio);
        assert_eq!(PlanTier::parse_or_free("enterprise"), PlanTier::Free);
    }

    #[test]
    fn test_subscriber_check() {
        assert!(!PlanTier::Free.is_subscriber());
        assert!(PlanTier::Creator.is_subscriber());
        assert!(PlanTier::Studio.is_subscriber());
    }

    #[test]
    fn test_monthly_credits_match_constants() {
        assert_eq!(PlanTier::Creator.monthly_credits(), CREATOR_MONTHLY_CREDITS);
        assert_eq!(PlanTier::Studio.monthly_credits(), STUDIO_MONTHLY_CREDITS);
        assert_eq!(PlanTier::Free.monthly_credits(), 0);
    }
}
