use std::collections::HashMap;

use memoir_store::{Tag, TagId, SENTINEL_TAG_NAME};

/// In-memory view of one user's tag vocabulary.
///
/// Names are unique **case-sensitively**; "Travel" and "travel" are distinct
/// tags.  The sentinel filter tag is always present and cannot be removed or
/// shadowed.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    tags: Vec<Tag>,
    by_name: HashMap<String, usize>,
}

impl Default for TagVocabulary {
    fn default() -> Self {
        Self::with_sentinel()
    }
}

impl TagVocabulary {
    fn empty() -> Self {
        Self {
            tags: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// An empty vocabulary holding only the sentinel tag.
    pub fn with_sentinel() -> Self {
        let mut vocab = Self::empty();
        vocab.insert(Tag::sentinel());
        vocab
    }

    /// Build from a remote listing.  The sentinel is added if the listing
    /// lacks it; duplicate names in the listing are dropped, first wins.
    pub fn from_tags(tags: Vec<Tag>) -> Self {
        let mut vocab = Self::empty();
        for tag in tags {
            vocab.insert(tag);
        }
        if vocab.get(SENTINEL_TAG_NAME).is_none() {
            vocab.insert(Tag::sentinel());
        }
        vocab
    }

    /// Insert a tag.  Returns `false` (and keeps the existing tag) when the
    /// case-sensitive name is already present.
    pub fn insert(&mut self, tag: Tag) -> bool {
        if self.by_name.contains_key(&tag.name) {
            return false;
        }
        self.by_name.insert(tag.name.clone(), self.tags.len());
        self.tags.push(tag);
        true
    }

    /// Case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.by_name.get(name).map(|&idx| &self.tags[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Names offered to the gateway for reuse, ordered by position.  System
    /// tags (the sentinel) are filter machinery, not classification labels.
    pub fn suggestion_names(&self) -> Vec<String> {
        let mut tags: Vec<&Tag> = self.tags.iter().filter(|tag| !tag.is_system).collect();
        tags.sort_by_key(|tag| tag.position);
        tags.iter().map(|tag| tag.name.clone()).collect()
    }

    /// Tags still carrying a locally-scoped id, pending reconciliation.
    pub fn pending_local(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .filter(|tag| tag.id.is_local())
            .cloned()
            .collect()
    }

    /// Swap a locally-scoped id for its reconciled remote counterpart.
    /// Returns `false` when `local_id` is not present.
    pub fn promote(&mut self, local_id: TagId, remote: Tag) -> bool {
        match self.tags.iter_mut().find(|tag| tag.id == local_id) {
            Some(tag) => {
                tag.id = remote.id;
                tag.position = remote.position;
                true
            }
            None => false,
        }
    }

    /// Next free sort position for a newly minted tag.
    pub fn next_position(&self) -> i64 {
        self.tags.iter().map(|tag| tag.position).max().unwrap_or(0) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
