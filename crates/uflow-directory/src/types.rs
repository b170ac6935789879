//! ---
//! uflow_section: "02-directory-services"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "User directory capability trait and stub collaborators."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier handed out by the directory's identity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wrap an existing UUID.
    pub fn new(raw: Uuid) -> Self {
        Self(raw)
    }

    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for UserId {
    fn from(raw: Uuid) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Composite user record assembled from the four directory lookups.
///
/// Instances are only ever constructed as the final output of a successful
/// orchestration; there is no partially-filled representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Identity resolved by the first lookup.
    pub id: UserId,
    /// Display name of the user.
    pub name: String,
    /// Age in whole years.
    pub age: u32,
    /// Whether the user holds a premium entitlement.
    pub is_premium: bool,
}

/// Names the directory lookup a measurement or failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStage {
    /// The initial identity lookup every other stage depends on.
    Identity,
    /// Display name lookup.
    Name,
    /// Age lookup.
    Age,
    /// Premium entitlement lookup.
    Premium,
}

impl FetchStage {
    /// Represent the stage as a static label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStage::Identity => "identity",
            FetchStage::Name => "name",
            FetchStage::Age => "age",
            FetchStage::Premium => "premium",
        }
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
