use super::notifications::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    NotConfigured,
    /// Checkout is not wired up; the user is told so.
    Unavailable,
}

pub struct BillingService {
    publishable_key: Option<String>,
    notifier: Notifier,
}

impl BillingService {
    pub fn new(publishable_key: Option<String>, notifier: Notifier) -> Self {
        Self {
            publishable_key,
            notifier,
        }
    }

    pub fn upgrade(&self) -> UpgradeOutcome {
        if self.publishable_key.is_none() {
            tracing::error!("Stripe publishable key is not set");
            self.notifier.error("Stripe payments are not configured.");
            return UpgradeOutcome::NotConfigured;
        }

        tracing::info!("Upgrade requested; checkout is simulated");
        self.notifier
            .success("Redirecting to Stripe checkout is a premium feature in this demo.");
        UpgradeOutcome::Unavailable
    }
}
