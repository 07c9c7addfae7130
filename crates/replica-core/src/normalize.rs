//! Raw sequencer entries to validated [`Message`]s.
//!
//! Each entry pairs a signed message with the assignment that placed it in
//! the log. The assignment is authoritative for position: its `Nonce` (or
//! legacy `Ordinate`) and `Epoch` win over message tags of the same name.
//! Timestamp and block height come from the assignment as well, falling
//! back to the message tags.
//!
//! Validation is all-or-nothing: one bad entry fails the batch.

use crate::error::ValidationError;
use replica_transport::{LogPage, RawEntry};
use replica_types::{Message, Tag, Tags};

/// Tag names carrying a log position, in precedence order.
pub const NONCE_TAGS: [&str; 2] = ["Nonce", "Ordinate"];

/// Assignment tags that override same-named message tags in the lookup.
const POSITION_TAGS: [&str; 3] = ["Nonce", "Ordinate", "Epoch"];

/// Parse a non-negative integer, accepting integral decimals like `"12.0"`.
pub fn parse_numeric(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

/// Nonce carried by a tag list: the first `Nonce` or `Ordinate` tag whose
/// value parses.
pub fn nonce_from_tags(tags: &[Tag]) -> Option<u64> {
    tags.iter()
        .filter(|tag| NONCE_TAGS.contains(&tag.name.as_str()))
        .find_map(|tag| parse_numeric(&tag.value))
}

/// A validated, ascending batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub messages: Vec<Message>,
    /// The sequencer reported more entries after this page.
    pub has_next_page: bool,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Validate every entry of a page and sort the result by nonce.
pub fn normalize_batch(process_id: &str, page: LogPage) -> Result<NormalizedBatch, ValidationError> {
    let mut messages = page
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| normalize_entry(process_id, index, entry))
        .collect::<Result<Vec<_>, _>>()?;
    messages.sort_by_key(|m| m.nonce);
    Ok(NormalizedBatch {
        messages,
        has_next_page: page.has_next_page,
    })
}

/// Validate one entry.
pub fn normalize_entry(
    process_id: &str,
    index: usize,
    entry: RawEntry,
) -> Result<Message, ValidationError> {
    let RawEntry {
        message,
        assignment,
    } = entry;
    let message = message.ok_or_else(|| ValidationError::new(index, None, "missing message"))?;
    let id = message
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ValidationError::new(index, None, "missing message id"))?;
    let fail = |reason: String| ValidationError::new(index, Some(&id), reason);

    let owner = message
        .owner
        .and_then(|o| o.address)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| fail("missing owner address".into()))?;

    let is_assignment = assignment.is_some();
    let assignment_tags = Tags::new(assignment.map(|a| a.tags).unwrap_or_default());
    let message_tags = message.tags;

    let lookup = |names: &[&str]| -> Option<String> {
        assignment_tags
            .get_any(names)
            .or_else(|| {
                message_tags
                    .iter()
                    .rev()
                    .find(|t| names.contains(&t.name.as_str()))
                    .map(|t| t.value.as_str())
            })
            .map(String::from)
    };
    let required = |names: &[&str], label: &str| -> Result<u64, ValidationError> {
        let raw = lookup(names).ok_or_else(|| fail(format!("missing {label}")))?;
        parse_numeric(&raw).ok_or_else(|| fail(format!("unparsable {label} {raw:?}")))
    };

    let nonce = required(&NONCE_TAGS, "nonce")?;
    let timestamp = required(&["Timestamp"], "timestamp")?;
    let block_height = required(&["Block-Height"], "block height")?;
    let epoch = lookup(&["Epoch"]).and_then(|raw| parse_numeric(&raw));

    let from = message_tags
        .iter()
        .find(|t| t.name == "From-Process")
        .map(|t| t.value.clone())
        .or(message.from.filter(|f| !f.is_empty()))
        .unwrap_or_else(|| owner.clone());
    let cron = lookup(&["Cron"]).is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let hash_chain = assignment_tags.get("Hash-Chain").map(String::from);
    let deep_hash = assignment_tags
        .get_any(&["Deep-Hash", "deepHash"])
        .map(String::from);

    let overrides: Vec<Tag> = assignment_tags
        .iter()
        .filter(|t| POSITION_TAGS.contains(&t.name.as_str()))
        .cloned()
        .collect();

    Ok(Message {
        id,
        nonce,
        epoch,
        timestamp,
        block_height,
        owner,
        target: message
            .target
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| process_id.to_string()),
        from,
        data: message.data,
        anchor: message.anchor,
        hash_chain,
        cron,
        is_assignment,
        deep_hash,
        tags: Tags::with_overrides(message_tags, overrides),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_transport::{sequencer::RawOwner, RawAssignment, RawMessage};

    fn entry(id: &str, message_tags: Vec<Tag>, assignment_tags: Vec<Tag>) -> RawEntry {
        RawEntry {
            message: Some(RawMessage {
                id: Some(id.to_string()),
                owner: Some(RawOwner {
                    address: Some("owner-1".into()),
                }),
                tags: message_tags,
                data: Some("payload".into()),
                target: None,
                from: None,
                anchor: None,
            }),
            assignment: Some(RawAssignment {
                id: Some(format!("assign-{id}")),
                tags: assignment_tags,
            }),
        }
    }

    fn position(nonce: &str) -> Vec<Tag> {
        vec![
            Tag::new("Nonce", nonce),
            Tag::new("Epoch", "0"),
            Tag::new("Timestamp", "1700000000000"),
            Tag::new("Block-Height", "1500000"),
            Tag::new("Hash-Chain", "chain"),
        ]
    }

    #[test]
    fn test_assignment_position_wins_over_message_tags() {
        let raw = entry(
            "m1",
            vec![Tag::new("Nonce", "999"), Tag::new("Action", "Transfer")],
            position("7"),
        );
        let message = normalize_entry("proc", 0, raw).unwrap();
        assert_eq!(message.nonce, 7);
        assert_eq!(message.epoch, Some(0));
        assert_eq!(message.tag("Nonce"), Some("7"));
        assert_eq!(message.tags.as_slice()[0], Tag::new("Nonce", "999"));
        assert_eq!(message.tag("Action"), Some("Transfer"));
        assert_eq!(message.timestamp, 1_700_000_000_000);
        assert_eq!(message.block_height, 1_500_000);
        assert_eq!(message.hash_chain.as_deref(), Some("chain"));
        assert!(message.is_assignment);
    }

    #[test]
    fn test_defaults_for_target_and_from() {
        let raw = entry("m1", vec![Tag::new("From-Process", "parent")], position("1"));
        let message = normalize_entry("proc", 0, raw).unwrap();
        assert_eq!(message.target, "proc");
        assert_eq!(message.from, "parent");

        let raw = entry("m2", vec![], position("2"));
        let message = normalize_entry("proc", 0, raw).unwrap();
        assert_eq!(message.from, "owner-1");
    }

    #[test]
    fn test_ordinate_is_accepted_as_nonce() {
        let mut tags = position("0");
        tags.remove(0);
        tags.push(Tag::new("Ordinate", "12"));
        let message = normalize_entry("proc", 0, entry("m1", vec![], tags)).unwrap();
        assert_eq!(message.nonce, 12);
    }

    #[test]
    fn test_one_bad_entry_fails_the_batch() {
        let bad = position("not-a-number");
        let page = LogPage {
            entries: vec![
                entry("m1", vec![], position("1")),
                entry("m2", vec![], bad),
            ],
            has_next_page: false,
        };
        let err = normalize_batch("proc", page).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.message_id.as_deref(), Some("m2"));
        assert!(err.reason.contains("nonce"));
    }

    #[test]
    fn test_missing_required_fields() {
        let no_message = RawEntry {
            message: None,
            assignment: None,
        };
        assert!(normalize_entry("proc", 0, no_message).is_err());

        let mut tags = position("1");
        tags.retain(|t| t.name != "Timestamp");
        let err = normalize_entry("proc", 4, entry("m1", vec![], tags)).unwrap_err();
        assert!(err.reason.contains("timestamp"));
    }

    #[test]
    fn test_batch_is_sorted_by_nonce() {
        let page = LogPage {
            entries: vec![
                entry("c", vec![], position("3")),
                entry("a", vec![], position("1")),
                entry("b", vec![], position("2")),
            ],
            has_next_page: true,
        };
        let batch = normalize_batch("proc", page).unwrap();
        let nonces: Vec<u64> = batch.messages.iter().map(|m| m.nonce).collect();
        assert_eq!(nonces, vec![1, 2, 3]);
        assert!(batch.has_next_page);
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(" 42 "), Some(42));
        assert_eq!(parse_numeric("12.0"), Some(12));
        assert_eq!(parse_numeric("12.5"), None);
        assert_eq!(parse_numeric("-1"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric(""), None);
    }

    #[test]
    fn test_nonce_from_tags_takes_first_position_tag() {
        let tags = vec![
            Tag::new("Type", "Checkpoint"),
            Tag::new("Ordinate", "40"),
            Tag::new("Nonce", "41"),
        ];
        assert_eq!(nonce_from_tags(&tags), Some(40));
        assert_eq!(nonce_from_tags(&[Tag::new("Type", "Checkpoint")]), None);
    }

    #[test]
    fn test_nonce_from_tags_skips_unparsable_position_tag() {
        let tags = vec![Tag::new("Nonce", "soon"), Tag::new("Ordinate", "7")];
        assert_eq!(nonce_from_tags(&tags), Some(7));
        assert_eq!(nonce_from_tags(&[Tag::new("Nonce", "soon")]), None);
    }
}
