//! Payment purposes and their wire tags.
//!
//! The purpose selects which downstream settlement handler a confirmed
//! payment is dispatched to. The set is closed: an unrecognized tag is a
//! configuration problem at the edge, never a payment-time failure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OpensettleError;

/// What a payment is for. Routes the post-transfer settlement action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Marketplace,
    Freelance,
    Tip,
    Subscription,
    Reward,
    #[serde(rename = "p2p")]
    PeerToPeer,
}

impl Purpose {
    /// Every purpose the engine routes. Used for registry completeness checks.
    pub const ALL: [Purpose; 6] = [
        Purpose::Marketplace,
        Purpose::Freelance,
        Purpose::Tip,
        Purpose::Subscription,
        Purpose::Reward,
        Purpose::PeerToPeer,
    ];

    /// The canonical wire tag, matching the serde representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Marketplace => "marketplace",
            Purpose::Freelance => "freelance",
            Purpose::Tip => "tip",
            Purpose::Subscription => "subscription",
            Purpose::Reward => "reward",
            Purpose::PeerToPeer => "p2p",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = OpensettleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marketplace" => Ok(Purpose::Marketplace),
            "freelance" => Ok(Purpose::Freelance),
            "tip" => Ok(Purpose::Tip),
            "subscription" => Ok(Purpose::Subscription),
            "reward" => Ok(Purpose::Reward),
            "p2p" => Ok(Purpose::PeerToPeer),
            other => Err(OpensettleError::UnknownPurpose(other.to_string())),
        }
    }
}
