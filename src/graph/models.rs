//! Goal graph data models.
//!
//! ## Canonical state
//! - [`GoalNode`] — a goal vertex with its commit value, derived activation,
//!   and weighted outgoing links
//!
//! ## Wire types
//! - [`NodeDraft`] — creation payload (server assigns id and owner)
//! - [`NodePatch`] — whitelisted partial update (id/owner excluded)
//! - [`PositionUpdate`] — one entry of a bulk position write
//! - [`TrackRecord`] — read-only daily level snapshot from the batch job

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;

/// Prefix of locally generated node ids awaiting server confirmation.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Default node color applied on creation and hydration.
pub const DEFAULT_COLOR: &str = "#000000";

/// Allowed link weights.
pub const MIN_LINK_WEIGHT: u8 = 1;
pub const MAX_LINK_WEIGHT: u8 = 3;

// ============================================================================
// Canonical state
// ============================================================================

/// A goal vertex in the weighted directed graph.
///
/// `activation` is derived — written only by the propagation engine, never
/// set by the user. `links` map target node id to a weight in 1..=3; a
/// target may be absent from the collection (dangling links are tolerated
/// everywhere). `BTreeMap` keeps edge iteration deterministic, which the
/// propagation engine's determinism contract relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalNode {
    /// Server-assigned id, or a `temp-` id until the create confirms.
    pub id: String,
    pub name: String,
    /// User-entered contribution score, primary input to propagation.
    pub commit: i64,
    pub x: f64,
    pub y: f64,
    /// Outgoing directed edges: target id → weight (1..=3).
    #[serde(default)]
    pub links: BTreeMap<String, u8>,
    /// Derived influence score, fully recomputed on every propagation.
    #[serde(default)]
    pub activation: f64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub acute: bool,
    /// Immutable, server-assigned. None until the create confirms.
    #[serde(default, rename = "ownerId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl GoalNode {
    /// A fresh node at the given position with a reserved-namespace temp id.
    pub fn draft_at(x: f64, y: f64) -> Self {
        Self {
            id: format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4()),
            name: "New goal".to_string(),
            commit: 0,
            x,
            y,
            links: BTreeMap::new(),
            activation: 0.0,
            color: default_color(),
            starred: false,
            acute: false,
            owner_id: None,
        }
    }

    /// Whether this node still carries a locally generated id.
    pub fn has_temp_id(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// Presentation-level derived from activation: `floor(activation / 10)`.
    ///
    /// Never stored; the daily batch job applies the same derivation.
    pub fn level(&self) -> i64 {
        (self.activation / 10.0).floor() as i64
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Payload for creating a node. The server assigns id and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub name: String,
    pub commit: i64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub links: BTreeMap<String, u8>,
    pub color: String,
    pub starred: bool,
    pub acute: bool,
}

impl From<&GoalNode> for NodeDraft {
    fn from(node: &GoalNode) -> Self {
        Self {
            name: node.name.clone(),
            commit: node.commit,
            x: node.x,
            y: node.y,
            links: node.links.clone(),
            color: node.color.clone(),
            starred: node.starred,
            acute: node.acute,
        }
    }
}

/// Whitelisted partial update for one node.
///
/// Only mutable fields appear; id and owner are structurally excluded, so a
/// patch can never carry them. `links` replaces the full link map of the
/// node (the source node's map is the unit of link updates).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acute: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, u8>>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.commit.is_none()
            && self.color.is_none()
            && self.starred.is_none()
            && self.acute.is_none()
            && self.links.is_none()
    }
}

/// One entry of a bulk position write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Daily immutable snapshot of per-node levels, produced by the external
/// batch job. Read-only on this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    /// Calendar date the snapshot covers, `YYYY-MM-DD`.
    pub date: String,
    /// Node id → level at snapshot time.
    pub levels: BTreeMap<String, i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

/// Reject weights outside 1..=3 before any optimistic apply.
pub fn validate_link_weight(weight: u8) -> Result<(), SyncError> {
    if (MIN_LINK_WEIGHT..=MAX_LINK_WEIGHT).contains(&weight) {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "link weight must be {MIN_LINK_WEIGHT}..={MAX_LINK_WEIGHT}, got {weight}"
        )))
    }
}

/// Reject empty or whitespace-only names.
pub fn validate_name(name: &str) -> Result<(), SyncError> {
    if name.trim().is_empty() {
        Err(SyncError::Validation("node name must not be empty".into()))
    } else {
        Ok(())
    }
}

/// Reject colors that are not `#rrggbb`.
pub fn validate_color(color: &str) -> Result<(), SyncError> {
    let ok = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if ok {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "color must be #rrggbb, got {color:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_at_uses_temp_namespace() {
        let node = GoalNode::draft_at(10.0, 20.0);
        assert!(node.has_temp_id());
        assert_eq!(node.commit, 0);
        assert_eq!(node.color, DEFAULT_COLOR);
        assert!(node.links.is_empty());
        assert!(node.owner_id.is_none());
    }

    #[test]
    fn test_level_floors_toward_negative_infinity() {
        let mut node = GoalNode::draft_at(0.0, 0.0);
        node.activation = 29.9;
        assert_eq!(node.level(), 2);
        node.activation = 0.0;
        assert_eq!(node.level(), 0);
    }

    #[test]
    fn test_node_deserializes_with_missing_optionals() {
        // Remote payloads may omit color/starred/acute/activation.
        let json = r#"{"id":"srv1","name":"A","commit":5,"x":1.0,"y":2.0}"#;
        let node: GoalNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.color, DEFAULT_COLOR);
        assert!(!node.starred);
        assert!(!node.acute);
        assert_eq!(node.activation, 0.0);
        assert!(node.links.is_empty());
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = NodePatch {
            commit: Some(8),
            name: Some("Run".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert!(json.contains("\"commit\":8"));
        assert!(!json.contains("color"));
        assert!(!json.contains("links"));
        // id and owner cannot appear — the struct has no such fields.
        assert!(!json.contains("ownerId"));
    }

    #[test]
    fn test_weight_validation_bounds() {
        assert!(validate_link_weight(1).is_ok());
        assert!(validate_link_weight(3).is_ok());
        assert!(validate_link_weight(0).is_err());
        assert!(validate_link_weight(4).is_err());
    }

    #[test]
    fn test_color_validation() {
        assert!(validate_color("#00ff00").is_ok());
        assert!(validate_color("00ff00").is_err());
        assert!(validate_color("#00ff0").is_err());
        assert!(validate_color("#00gg00").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("Run daily").is_ok());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_draft_from_node() {
        let mut node = GoalNode::draft_at(3.0, 4.0);
        node.links.insert("b".into(), 2);
        let draft = NodeDraft::from(&node);
        assert_eq!(draft.x, 3.0);
        assert_eq!(draft.links.get("b"), Some(&2));
    }
}
