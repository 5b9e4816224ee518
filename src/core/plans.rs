//! Paid plan catalog.
//!
//! | code | description | price | model | tokens | days |
//! |------|-------------|-------|-------|--------|------|
//! | gpt35_lite | GPT-3.5 Lite | 199 | gpt-3.5-turbo | 50 000 | 30 |
//! | gpt35_pro | GPT-3.5 Pro | 299 | gpt-3.5-turbo | 100 000 | 30 |
//! | gpt35_max | GPT-3.5 Max | 399 | gpt-3.5-turbo | 1 000 000 | 30 |
//! | gpt4o_lite | GPT-4o Lite | 299 | gpt-4o | 30 000 | 30 |
//! | gpt4o_pro | GPT-4o Pro | 499 | gpt-4o | 60 000 | 30 |
//! | gpt4o_max | GPT-4o Max | 999 | gpt-4o | 1 000 000 | 30 |
//! | business_pro | GPT-4o Business Pro | 2000 | gpt-4o | 2 000 000 | 30 |

use crate::infrastructure::entities::PlanTier;
use chrono::Duration;

pub const CURRENCY: &str = "RUB";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub tier: PlanTier,
    /// Checkout description; the webhook maps it back to the plan.
    pub description: &'static str,
    pub price: u32,
    pub model: &'static str,
    pub token_limit: i64,
    pub days: i64,
}

impl Plan {
    pub fn code(&self) -> &'static str {
        self.tier.as_str()
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.days)
    }

    /// Button caption: description and price in roubles.
    pub fn caption(&self) -> String {
        format!("{} — {}₽", self.description, self.price)
    }
}

pub const CATALOG: [Plan; 7] = [
    Plan {
        tier: PlanTier::Gpt35Lite,
        description: "GPT-3.5 Lite",
        price: 199,
        model: "gpt-3.5-turbo",
        token_limit: 50_000,
        days: 30,
    },
    Plan {
        tier: PlanTier::Gpt35Pro,
        description: "GPT-3.5 Pro",
        price: 299,
        model: "gpt-3.5-turbo",
        token_limit: 100_000,
        days: 30,
    },
    Plan {
        tier: PlanTier::Gpt35Max,
        description: "GPT-3.5 Max",
        price: 399,
        model: "gpt-3.5-turbo",
        token_limit: 1_000_000,
        days: 30,
    },
    Plan {
        tier: PlanTier::Gpt4oLite,
        description: "GPT-4o Lite",
        price: 299,
        model: "gpt-4o",
        token_limit: 30_000,
        days: 30,
    },
    Plan {
        tier: PlanTier::Gpt4oPro,
        description: "GPT-4o Pro",
        price: 499,
        model: "gpt-4o",
        token_limit: 60_000,
        days: 30,
    },
    Plan {
        tier: PlanTier::Gpt4oMax,
        description: "GPT-4o Max",
        price: 999,
        model: "gpt-4o",
        token_limit: 1_000_000,
        days: 30,
    },
    Plan {
        tier: PlanTier::BusinessPro,
        description: "GPT-4o Business Pro",
        price: 2000,
        model: "gpt-4o",
        token_limit: 2_000_000,
        days: 30,
    },
];

/// Granted when a paid description matches nothing in [`CATALOG`]: the smallest
/// budget in the table on the cheaper model.
pub const FALLBACK: Plan = Plan {
    tier: PlanTier::Fallback,
    description: "Standard",
    price: 0,
    model: "gpt-3.5-turbo",
    token_limit: 30_000,
    days: 30,
};

/// Finds a plan by checkout description or plan code, ignoring case and
/// surrounding whitespace.
pub fn lookup(key: &str) -> Option<&'static Plan> {
    let key = key.trim();
    CATALOG
        .iter()
        .find(|plan| plan.description.eq_ignore_ascii_case(key) || plan.code() == key)
}
