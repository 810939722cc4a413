//! Field-level application of an approved `newData` payload.

use serde_json::{Map, Value};

use crate::domain::attachment::Attachment;

/// Keys a client may send but that must never overwrite stored values.
pub const CONTROL_KEYS: &[&str] =
    &["id", "_id", "__v", "createdAt", "updatedAt", "deletedAttachments"];

pub fn strip_control_keys(patch: &mut Map<String, Value>) {
    for key in CONTROL_KEYS {
        patch.remove(*key);
    }
}

/// Writes every key present in `patch` onto `existing`; keys absent from the
/// patch keep their stored value.
pub fn apply_fields(existing: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if CONTROL_KEYS.contains(&key.as_str()) {
            continue;
        }
        existing.insert(key, value);
    }
}

/// Removes and returns the `deletedAttachments` marker list. Entries may be
/// plain URLs or attachment objects.
pub fn take_deleted_attachments(patch: &mut Map<String, Value>) -> Vec<String> {
    let Some(Value::Array(entries)) = patch.remove("deletedAttachments") else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(url) => Some(url),
            Value::Object(mut object) => match object.remove("url") {
                Some(Value::String(url)) => Some(url),
                _ => match object.remove("name") {
                    Some(Value::String(name)) => Some(name),
                    _ => None,
                },
            },
            _ => None,
        })
        .collect()
}

pub fn attachments_in(document: &Map<String, Value>) -> Result<Vec<Attachment>, serde_json::Error> {
    match document.get("attachments") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()),
    }
}

/// Existing attachments minus the deleted ones, followed by the new ones not
/// already present.
pub fn merge_attachments(
    existing: Vec<Attachment>,
    deleted: &[String],
    added: Vec<Attachment>,
) -> Vec<Attachment> {
    let is_deleted = |attachment: &Attachment| {
        deleted.iter().any(|marker| *marker == attachment.url || *marker == attachment.name)
    };

    let mut merged: Vec<Attachment> =
        existing.into_iter().filter(|attachment| !is_deleted(attachment)).collect();
    for attachment in added {
        if !merged.iter().any(|kept| kept.url == attachment.url) {
            merged.push(attachment);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{apply_fields, merge_attachments, strip_control_keys, take_deleted_attachments};
    use crate::domain::attachment::Attachment;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn attachment(url: &str, name: &str) -> Attachment {
        Attachment { url: url.to_string(), name: name.to_string(), ..Attachment::default() }
    }

    #[test]
    fn only_present_keys_are_written() {
        let mut existing = object(json!({
            "id": "c-1",
            "name": "Salma",
            "phone": "0600000000",
            "notes": "VIP"
        }));
        apply_fields(&mut existing, object(json!({ "phone": "0611111111", "id": "hijack" })));

        assert_eq!(existing["phone"], "0611111111");
        assert_eq!(existing["name"], "Salma");
        assert_eq!(existing["notes"], "VIP");
        assert_eq!(existing["id"], "c-1");
    }

    #[test]
    fn explicit_null_is_a_present_key() {
        let mut existing = object(json!({ "notes": "VIP" }));
        apply_fields(&mut existing, object(json!({ "notes": null })));
        assert_eq!(existing["notes"], Value::Null);
    }

    #[test]
    fn deleted_markers_accept_urls_and_objects() {
        let mut patch = object(json!({
            "amount": 100,
            "deletedAttachments": ["https://b/x.pdf", { "url": "https://b/y.pdf" }, { "name": "z.png" }, 7]
        }));
        let deleted = take_deleted_attachments(&mut patch);

        assert_eq!(deleted, vec!["https://b/x.pdf", "https://b/y.pdf", "z.png"]);
        assert!(!patch.contains_key("deletedAttachments"));
    }

    #[test]
    fn merge_drops_deleted_and_appends_new_without_duplicates() {
        let existing = vec![attachment("https://b/a.pdf", "a.pdf"), attachment("https://b/b.pdf", "b.pdf")];
        let added = vec![attachment("https://b/a.pdf", "a.pdf"), attachment("https://b/c.pdf", "c.pdf")];

        let merged = merge_attachments(existing, &["https://b/b.pdf".to_string()], added);
        let urls: Vec<&str> = merged.iter().map(|a| a.url.as_str()).collect();

        assert_eq!(urls, vec!["https://b/a.pdf", "https://b/c.pdf"]);
    }

    #[test]
    fn strip_removes_control_keys_only() {
        let mut patch = object(json!({ "_id": "x", "createdAt": "t", "name": "n" }));
        strip_control_keys(&mut patch);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch["name"], "n");
    }
}
