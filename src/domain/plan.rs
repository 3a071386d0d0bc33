use serde::{Deserialize, Serialize};

use super::subscription::SubscriptionTier;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionPlan {
    pub name: String,
    pub tier: SubscriptionTier,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
    pub credits_included: i64,
    pub max_duration_seconds: u32,
    pub priority_support: bool,
    pub api_access: bool,
    pub custom_branding: bool,
    pub provider_price_id: Option<String>,
}

impl SubscriptionPlan {
    fn new(
        name: &str,
        tier: SubscriptionTier,
        price_monthly_cents: i64,
        credits_included: i64,
        max_duration_seconds: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            tier,
            price_monthly_cents,
            // Yearly billing is ten months' price.
            price_yearly_cents: price_monthly_cents * 10,
            credits_included,
            max_duration_seconds,
            priority_support: false,
            api_access: false,
            custom_branding: false,
            provider_price_id: None,
        }
    }

    fn with_perks(mut self, priority_support: bool, api_access: bool, custom_branding: bool) -> Self {
        self.priority_support = priority_support;
        self.api_access = api_access;
        self.custom_branding = custom_branding;
        self
    }
}

/// Fixed set of plans offered to customers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCatalog {
    plans: Vec<SubscriptionPlan>,
}

impl PlanCatalog {
    pub fn standard() -> Self {
        Self {
            plans: vec![
                SubscriptionPlan::new("Free", SubscriptionTier::Free, 0, 10, 10),
                SubscriptionPlan::new("Starter", SubscriptionTier::Starter, 3_900, 50, 10),
                SubscriptionPlan::new("Pro", SubscriptionTier::Pro, 8_900, 100, 30)
                    .with_perks(true, false, true),
                SubscriptionPlan::new("Business", SubscriptionTier::Business, 19_900, 200, 60)
                    .with_perks(true, true, true),
                SubscriptionPlan::new("Enterprise", SubscriptionTier::Enterprise, 49_900, 500, 120)
                    .with_perks(true, true, true),
            ],
        }
    }

    /// Attach provider price references so invoices can be matched to plans.
    pub fn with_price_id(mut self, tier: SubscriptionTier, price_id: Option<String>) -> Self {
        if let Some(price_id) = price_id.filter(|p| !p.trim().is_empty()) {
            if let Some(plan) = self.plans.iter_mut().find(|p| p.tier == tier) {
                plan.provider_price_id = Some(price_id);
            }
        }
        self
    }

    pub fn plans(&self) -> &[SubscriptionPlan] {
        &self.plans
    }

    pub fn paid_plans(&self) -> impl Iterator<Item = &SubscriptionPlan> {
        self.plans.iter().filter(|p| p.tier.is_paid())
    }

    pub fn by_tier(&self, tier: SubscriptionTier) -> Option<&SubscriptionPlan> {
        self.plans.iter().find(|p| p.tier == tier)
    }

    pub fn by_price_ref(&self, price_ref: &str) -> Option<&SubscriptionPlan> {
        self.plans
            .iter()
            .find(|p| p.provider_price_id.as_deref() == Some(price_ref))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
