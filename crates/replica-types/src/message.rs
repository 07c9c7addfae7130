//! Normalized sequencer log entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A name/value metadata pair attached to a message or transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered tag list plus a name lookup built once at construction.
///
/// The list keeps the original order and duplicates. The lookup resolves a
/// name to the value of its last occurrence, unless an override for that
/// name was supplied at construction. Neither can be mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Tag>", into = "Vec<Tag>")]
pub struct Tags {
    list: Vec<Tag>,
    lookup: HashMap<String, String>,
}

impl Tags {
    pub fn new(list: Vec<Tag>) -> Self {
        Self::with_overrides(list, std::iter::empty())
    }

    /// Build from `list`, letting `overrides` win in the lookup only.
    pub fn with_overrides(list: Vec<Tag>, overrides: impl IntoIterator<Item = Tag>) -> Self {
        let mut lookup: HashMap<String, String> = list
            .iter()
            .map(|tag| (tag.name.clone(), tag.value.clone()))
            .collect();
        lookup.extend(overrides.into_iter().map(|tag| (tag.name, tag.value)));
        Self { list, lookup }
    }

    /// Value of the named tag, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.lookup.get(name).map(String::as_str)
    }

    /// First present value among several candidate names.
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn as_slice(&self) -> &[Tag] {
        &self.list
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(list: Vec<Tag>) -> Self {
        Self::new(list)
    }
}

impl From<Tags> for Vec<Tag> {
    fn from(tags: Tags) -> Self {
        tags.list
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// One validated log entry, ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Sequencer-assigned position; authoritative ordering key.
    pub nonce: u64,
    pub epoch: Option<u64>,
    pub timestamp: u64,
    pub block_height: u64,
    pub owner: String,
    pub target: String,
    pub from: String,
    pub data: Option<String>,
    pub anchor: Option<String>,
    pub hash_chain: Option<String>,
    pub cron: bool,
    pub is_assignment: bool,
    pub deep_hash: Option<String>,
    /// Original message tags; the lookup prefers assignment `Nonce`, `Ordinate` and `Epoch`.
    pub tags: Tags,
}

impl Message {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name)
    }

    /// Key identifying an evaluated assignment or deep-hash message.
    ///
    /// Plain messages have no key: the nonce cursor alone orders them.
    pub fn evaluation_key(&self) -> Option<(Option<u64>, u64)> {
        (self.is_assignment || self.deep_hash.is_some()).then_some((self.epoch, self.nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_last_occurrence() {
        let tags = Tags::new(vec![
            Tag::new("Action", "Transfer"),
            Tag::new("Quantity", "1"),
            Tag::new("Action", "Credit-Notice"),
        ]);
        assert_eq!(tags.get("Action"), Some("Credit-Notice"));
        assert_eq!(tags.len(), 3);
        assert_eq!(tags.as_slice()[0].value, "Transfer");
    }

    #[test]
    fn test_get_any_respects_candidate_order() {
        let tags = Tags::new(vec![Tag::new("Ordinate", "7"), Tag::new("Nonce", "9")]);
        assert_eq!(tags.get_any(&["Nonce", "Ordinate"]), Some("9"));
        assert_eq!(tags.get_any(&["Missing", "Ordinate"]), Some("7"));
        assert_eq!(tags.get_any(&["Missing"]), None);
    }

    #[test]
    fn test_overrides_change_lookup_but_not_list() {
        let tags = Tags::with_overrides(
            vec![Tag::new("Nonce", "1"), Tag::new("Action", "Eval")],
            [Tag::new("Nonce", "42")],
        );
        assert_eq!(tags.get("Nonce"), Some("42"));
        assert_eq!(tags.as_slice()[0], Tag::new("Nonce", "1"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_tags_deserialize_from_list() {
        let tags: Tags =
            serde_json::from_str(r#"[{"name":"Type","value":"Message"}]"#).unwrap();
        assert_eq!(tags.get("Type"), Some("Message"));
        let back = serde_json::to_value(&tags).unwrap();
        assert_eq!(back[0]["value"], "Message");
    }
}
