//! Plan Catalog
//!
//! Purchasable plans, filtered to what the signed-in role may buy.

use board_core::{Plan, PlanCategory, PlanId, Viewer};

use crate::api::BillingApi;
use crate::error::Result;

/// Plans fetched for this session
#[derive(Clone, Debug, Default)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Fetch the plan list from the backend
    pub async fn load(api: &dyn BillingApi) -> Result<Self> {
        let page = api.list_plans().await?;
        if page.total > page.items.len() {
            tracing::debug!(
                received = page.items.len(),
                total = page.total,
                "Plan list is paged; showing the first page"
            );
        }
        Ok(Self::new(page.items))
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn for_category(&self, category: PlanCategory) -> Vec<&Plan> {
        self.plans.iter().filter(|p| p.category == category).collect()
    }

    /// Plans the viewer may purchase, cheapest first
    pub fn for_viewer(&self, viewer: &Viewer) -> Vec<&Plan> {
        let Some(category) = viewer.plan_category() else {
            return Vec::new();
        };
        let mut plans: Vec<&Plan> = self
            .for_category(category)
            .into_iter()
            .filter(|p| p.id().is_some())
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price).then(a.duration_days.cmp(&b.duration_days)));
        plans
    }

    pub fn find(&self, plan_id: PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id() == Some(plan_id))
    }
}
