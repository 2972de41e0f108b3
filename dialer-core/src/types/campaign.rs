//! Campaign - an owner-defined outbound calling effort.
//!
//! Campaigns are created and mutated by the owner through the API surface;
//! the scheduler only ever reads them. Only `Active` campaigns may dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CampaignId, OwnerId};

/// Campaign lifecycle status.
///
/// Created `Draft` by the owner. The scheduler never changes campaign status;
/// it only gates dispatch on `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Archived,
}

impl CampaignStatus {
    /// Parse from string (for API payloads and environment values).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// An outbound-call campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign unique identifier.
    pub id: CampaignId,

    /// Owning tenant.
    pub owner_id: OwnerId,

    /// Human-readable name.
    pub name: String,

    /// Lifecycle status.
    pub status: CampaignStatus,

    /// Call script template text.
    pub script: String,

    /// Optional conversational voice-agent reference. When set (and the
    /// owner has a voice-agent API key configured) calls route through the
    /// voice-agent provider instead of the native telephony path.
    pub voice_agent_id: Option<String>,

    /// Tag identifiers used for audience membership. Not consulted by the
    /// scheduler; enrollment is explicit.
    pub audience_tag_ids: Vec<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new draft campaign.
    pub fn new(owner_id: OwnerId, name: impl Into<String>, script: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CampaignId::generate(),
            owner_id,
            name: name.into(),
            status: CampaignStatus::Draft,
            script: script.into(),
            voice_agent_id: None,
            audience_tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this campaign is allowed to dispatch calls.
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}
