use serde::{Deserialize, Serialize};

use crate::config::FREE_ACTIONS_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Tier::Free),
            "pro" => Some(Tier::Pro),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: String,
    pub tier: Tier,
    pub actions_used: u32,
    pub actions_limit: u32,
}

impl User {
    /// A fresh free-tier account for an identity seen for the first time.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "New User".to_string()),
            email: identity.email.clone(),
            image: identity.avatar_url.clone().unwrap_or_default(),
            tier: Tier::Free,
            actions_used: 0,
            actions_limit: FREE_ACTIONS_LIMIT,
        }
    }

    pub fn quota_exhausted(&self) -> bool {
        self.tier == Tier::Free && self.actions_used >= self.actions_limit
    }

    pub fn remaining_actions(&self) -> Option<u32> {
        match self.tier {
            Tier::Free => Some(self.actions_limit.saturating_sub(self.actions_used)),
            Tier::Pro => None,
        }
    }

    /// Free users get nudged once they are within two actions of the limit.
    pub fn should_prompt_upgrade(&self) -> bool {
        self.tier == Tier::Free
            && self.actions_limit > 0
            && self.actions_used + 2 >= self.actions_limit
    }
}

/// What the identity provider tells us about the signed-in person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}
