//! # Wire Protocol
//!
//! Encrypted payloads exchanged with the vault API.
//!
//! ## Share Event Polling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Share Event Long Poll                              │
//! │                                                                         │
//! │  client ───► GET pass/v1/share/{ShareID}/event/{EventID}               │
//! │  server ◄─── { "Events": {                                             │
//! │                 "LatestEventID": "...",     new watermark              │
//! │                 "EventsPending": false,     more events queued         │
//! │                 "DeletedItemIDs": [...],                               │
//! │                 "UpdatedItems": [EncryptedItem...],                    │
//! │                 "UpdatedShare": EncryptedShare?,                       │
//! │                 "LastUseItems": [{ ItemID, LastUseTime }]?            │
//! │               } }                                                      │
//! │                                                                         │
//! │  client ───► GET pass/v1/share/{ShareID}/event                         │
//! │  server ◄─── { "EventID": "..." }           current watermark          │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  server ◄─── { "Code": 300004, "Error": "..." }  share disabled        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! PascalCase JSON. Identifier fields keep their upper-case `ID` suffix.
//! Item and vault contents stay base64 ciphertext here; only the crypto
//! capability turns them into replica types.

use serde::{Deserialize, Serialize};

use vault_core::{EventCursor, ItemState};

// =============================================================================
// Shares
// =============================================================================

/// Share target type as sent by the server.
pub const TARGET_TYPE_VAULT: u8 = 1;
pub const TARGET_TYPE_ITEM: u8 = 2;

/// A share as returned by the API, content still encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptedShare {
    #[serde(rename = "ShareID")]
    pub share_id: String,

    #[serde(rename = "VaultID")]
    pub vault_id: String,

    pub target_type: u8,

    #[serde(rename = "TargetID")]
    pub target_id: String,

    /// Encrypted vault content, absent for item shares.
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub content_key_rotation: Option<u32>,

    #[serde(default)]
    pub owner: bool,

    #[serde(default)]
    pub shared: bool,

    pub create_time: i64,
}

impl EncryptedShare {
    pub fn is_vault(&self) -> bool {
        self.target_type == TARGET_TYPE_VAULT
    }
}

// =============================================================================
// Items
// =============================================================================

/// One item revision as returned by the API, content still encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptedItem {
    #[serde(rename = "ItemID")]
    pub item_id: String,

    pub revision: u64,

    pub content_format_version: u32,

    /// Base64 ciphertext.
    pub content: String,

    #[serde(default)]
    pub item_key: Option<String>,

    /// 1 = active, 2 = trashed.
    pub state: u8,

    #[serde(default)]
    pub pinned: bool,

    #[serde(default)]
    pub alias_email: Option<String>,

    pub create_time: i64,
    pub modify_time: i64,
    pub revision_time: i64,

    #[serde(default)]
    pub last_use_time: Option<i64>,
}

impl EncryptedItem {
    pub fn item_state(&self) -> ItemState {
        match self.state {
            2 => ItemState::Trashed,
            _ => ItemState::Active,
        }
    }
}

/// Last-use timestamp update for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LastUseItem {
    #[serde(rename = "ItemID")]
    pub item_id: String,

    pub last_use_time: i64,
}

// =============================================================================
// Share Events
// =============================================================================

/// Delta returned by one poll of a share's event log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShareEventList {
    #[serde(rename = "LatestEventID")]
    pub latest_event_id: String,

    #[serde(default)]
    pub events_pending: bool,

    #[serde(rename = "DeletedItemIDs", default)]
    pub deleted_item_ids: Vec<String>,

    #[serde(default)]
    pub updated_items: Vec<EncryptedItem>,

    #[serde(default)]
    pub updated_share: Option<EncryptedShare>,

    #[serde(default)]
    pub last_use_items: Option<Vec<LastUseItem>>,
}

impl ShareEventList {
    /// Where the next poll resumes.
    pub fn cursor(&self) -> EventCursor {
        EventCursor {
            event_id: self.latest_event_id.clone(),
            more: self.events_pending,
        }
    }

    /// Returns true if items were deleted or updated.
    pub fn items_mutated(&self) -> bool {
        !self.deleted_item_ids.is_empty() || !self.updated_items.is_empty()
    }

    /// Returns true if the response carries anything besides the watermark.
    pub fn has_delta(&self) -> bool {
        self.items_mutated()
            || self.updated_share.is_some()
            || self
                .last_use_items
                .as_ref()
                .is_some_and(|items| !items.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShareEventResponse {
    pub events: ShareEventList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestEventIdResponse {
    #[serde(rename = "EventID")]
    pub event_id: String,
}

// =============================================================================
// Bootstrap
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharesResponse {
    #[serde(default)]
    pub shares: Vec<EncryptedShare>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResponse {
    pub items: ItemsPage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsPage {
    #[serde(default)]
    pub revisions_data: Vec<EncryptedItem>,

    #[serde(default)]
    pub total: u64,

    #[serde(default)]
    pub last_token: Option<String>,
}

// =============================================================================
// Errors
// =============================================================================

/// Error body of any non-2xx response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encrypted_item(item_id: &str) -> serde_json::Value {
        json!({
            "ItemID": item_id,
            "Revision": 4,
            "ContentFormatVersion": 1,
            "Content": "Y2lwaGVy",
            "State": 2,
            "Pinned": true,
            "CreateTime": 1,
            "ModifyTime": 2,
            "RevisionTime": 3
        })
    }

    #[test]
    fn test_event_list_parsing() {
        let body = json!({
            "Events": {
                "LatestEventID": "evt-9",
                "EventsPending": true,
                "DeletedItemIDs": ["gone"],
                "UpdatedItems": [encrypted_item("a1")],
                "LastUseItems": [{ "ItemID": "a2", "LastUseTime": 1_700_000_500 }]
            }
        });

        let response: ShareEventResponse = serde_json::from_value(body).unwrap();
        let events = response.events;

        assert_eq!(events.cursor(), EventCursor { event_id: "evt-9".into(), more: true });
        assert_eq!(events.deleted_item_ids, vec!["gone".to_string()]);
        assert_eq!(events.updated_items[0].item_state(), ItemState::Trashed);
        assert!(events.updated_share.is_none());
        assert!(events.items_mutated());
    }

    #[test]
    fn test_empty_delta() {
        let events: ShareEventList =
            serde_json::from_value(json!({ "LatestEventID": "evt-1" })).unwrap();
        assert!(!events.events_pending);
        assert!(!events.has_delta());

        let events: ShareEventList = serde_json::from_value(json!({
            "LatestEventID": "evt-1",
            "LastUseItems": []
        }))
        .unwrap();
        assert!(!events.has_delta());
    }

    #[test]
    fn test_share_target_type() {
        let share: EncryptedShare = serde_json::from_value(json!({
            "ShareID": "s1",
            "VaultID": "v1",
            "TargetType": 1,
            "TargetID": "v1",
            "Content": "Y2lwaGVy",
            "Owner": true,
            "CreateTime": 10
        }))
        .unwrap();

        assert!(share.is_vault());
        assert!(!share.shared);
    }

    #[test]
    fn test_error_body() {
        let body: ApiErrorBody =
            serde_json::from_value(json!({ "Code": 300004, "Error": "Share disabled" })).unwrap();
        assert_eq!(body.code, 300004);
    }
}
