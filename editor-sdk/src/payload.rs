//! Wire payload shaping
//!
//! Flattens parent fields and one [`ChildDiff`] per collection into the single
//! request body the backend expects:
//!
//! ```json
//! { "name": "Q-104",
//!   "add_lines": [{"quantity": 3}],
//!   "update_lines": [{"id": 1, "quantity": 5, "unit_price": "10.00"}],
//!   "delete_lines_ids": [2] }
//! ```

use reconcile_core::ChildDiff;
use serde_json::{Map, Value};

use crate::config::CollectionProfile;
use crate::error::Result;

/// Build the submit body.
///
/// With `omit_empty`, collections without pending changes contribute no keys.
pub fn build_payload(
    parent: &Map<String, Value>,
    children: &[(&CollectionProfile, ChildDiff)],
    omit_empty: bool,
) -> Result<Value> {
    let mut body = parent.clone();

    for (profile, diff) in children {
        if omit_empty && diff.is_empty() {
            continue;
        }
        body.insert(
            profile.add_key(),
            Value::Array(diff.add.iter().cloned().map(Value::Object).collect()),
        );
        // Entries are keyed by the snapshot's id field
        body.insert(profile.update_key(), serde_json::to_value(&diff.update)?);
        body.insert(profile.delete_key(), serde_json::to_value(&diff.delete_ids)?);
    }

    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::{NestedCollection, RecordId, Snapshot};
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_payload_layout() {
        let rows = [json!({"id": 1, "qty": 2, "price": 10}), json!({"id": 2, "qty": 1, "price": 5})];
        let mut lines = NestedCollection::new(Snapshot::from_rows(&rows, "id").unwrap());
        lines.mark_removed(RecordId::from(2u64)).unwrap();
        lines.add(fields(json!({"qty": 3, "price": 2}))).unwrap();
        lines.edit_existing(&RecordId::from(1u64), fields(json!({"qty": 5}))).unwrap();

        let profile = CollectionProfile::new("lines");
        let payload = build_payload(
            &fields(json!({"name": "Q-104"})),
            &[(&profile, lines.to_payload())],
            false,
        )
        .unwrap();

        assert_eq!(
            payload,
            json!({
                "name": "Q-104",
                "add_lines": [{"qty": 3, "price": 2}],
                "update_lines": [{"id": 1, "qty": 5, "price": 10}],
                "delete_lines_ids": [2]
            })
        );
    }

    #[test]
    fn test_custom_id_field() {
        let rows = [json!({"uuid": "a1", "url": "https://x.com/a"})];
        let mut links = NestedCollection::new(Snapshot::from_rows(&rows, "uuid").unwrap());
        links
            .edit_existing(&RecordId::parse("a1").unwrap(), fields(json!({"url": "https://x.com/b"})))
            .unwrap();

        let profile = CollectionProfile::new("social_media").with_id_field("uuid");
        let payload = build_payload(&Map::new(), &[(&profile, links.to_payload())], false).unwrap();
        assert_eq!(
            payload["update_social_media"],
            json!([{"uuid": "a1", "url": "https://x.com/b"}])
        );
    }

    #[test]
    fn test_empty_diffs() {
        let profile = CollectionProfile::new("lines");
        let parent = fields(json!({"name": "Q-104"}));

        let full = build_payload(&parent, &[(&profile, ChildDiff::default())], false).unwrap();
        assert_eq!(
            full,
            json!({"name": "Q-104", "add_lines": [], "update_lines": [], "delete_lines_ids": []})
        );

        let trimmed = build_payload(&parent, &[(&profile, ChildDiff::default())], true).unwrap();
        assert_eq!(trimmed, json!({"name": "Q-104"}));
    }
}
