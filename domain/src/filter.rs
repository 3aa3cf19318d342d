//! Search-as-you-type predicate over the in-memory snapshot.
//!
//! Name, email and address match case-insensitively; phone matches the raw
//! query verbatim. An empty query keeps every record. Order follows the
//! snapshot.

use crate::ClientRecord;

/// A query prepared once per keystroke.
#[derive(Clone, Debug)]
pub struct Query<'q> {
    raw: &'q str,
    folded: String,
}

impl<'q> Query<'q> {
    pub fn new(raw: &'q str) -> Self {
        Self {
            raw,
            folded: raw.to_lowercase(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn matches(&self, record: &ClientRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        record.name.to_lowercase().contains(&self.folded)
            || record.email.to_lowercase().contains(&self.folded)
            || record.phone.contains(self.raw)
            || record.address.to_lowercase().contains(&self.folded)
    }
}

/// Lazily yield the records of `snapshot` matching `query`.
pub fn filter<'a>(
    snapshot: &'a [ClientRecord],
    query: &'a str,
) -> impl Iterator<Item = &'a ClientRecord> + 'a {
    let q = Query::new(query);
    snapshot.iter().filter(move |r| q.matches(r))
}

/// Eager variant of [`filter`].
pub fn filter_cloned(snapshot: &[ClientRecord], query: &str) -> Vec<ClientRecord> {
    filter(snapshot, query).cloned().collect()
}
