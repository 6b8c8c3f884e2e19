//! The decrypted working set and the filtered/sorted views over it.

use zkv_core::{CredentialRecord, DecryptedCredential};
use zkv_crypto::{decrypt_credential, Dek};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpaceFilter {
    #[default]
    All,
    Named(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// By website, then username, case-insensitive.
    #[default]
    Alphabetical,
    /// Most recently created first.
    Newest,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alpha" | "alphabetical" => Ok(SortOrder::Alphabetical),
            "newest" | "recent" => Ok(SortOrder::Newest),
            other => Err(format!("unknown sort order {other:?} (expected alphabetical or newest)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub space: SpaceFilter,
    /// Case-insensitive substring match on website or username.
    pub search: Option<String>,
    pub sort: SortOrder,
}

impl ViewQuery {
    fn admits(&self, c: &DecryptedCredential, needle: Option<&str>) -> bool {
        if let SpaceFilter::Named(space) = &self.space {
            if &c.space != space {
                return false;
            }
        }
        match needle {
            None => true,
            Some(needle) => {
                c.username.to_lowercase().contains(needle)
                    || c.website
                        .as_deref()
                        .is_some_and(|w| w.to_lowercase().contains(needle))
            }
        }
    }
}

/// Decrypted credentials for one unlocked session.
///
/// A record that fails to decrypt is kept out of `entries` and listed in
/// `unreadable`; it never takes the rest of the set down with it.
#[derive(Debug, Default, Clone)]
pub struct WorkingSet {
    entries: Vec<DecryptedCredential>,
    unreadable: Vec<String>,
}

impl WorkingSet {
    pub fn decrypt(records: &[CredentialRecord], dek: &Dek) -> Self {
        let mut set = WorkingSet::default();
        for record in records {
            match decrypt_credential(record, dek) {
                Ok(c) => set.entries.push(c),
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "credential unreadable");
                    set.unreadable.push(record.id.clone());
                }
            }
        }
        set
    }

    pub fn with_unreadable(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.unreadable.extend(ids);
        self
    }

    pub fn insert(&mut self, credential: DecryptedCredential) {
        self.entries.retain(|c| c.id != credential.id);
        self.entries.push(credential);
    }

    /// Remove `id` from the set, readable or not. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len() + self.unreadable.len();
        self.entries.retain(|c| c.id != id);
        self.unreadable.retain(|u| u != id);
        before != self.entries.len() + self.unreadable.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|c| c.id == id) || self.unreadable.iter().any(|u| u == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DecryptedCredential] {
        &self.entries
    }

    pub fn unreadable(&self) -> &[String] {
        &self.unreadable
    }

    pub fn view(&self, query: &ViewQuery) -> Vec<DecryptedCredential> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut out: Vec<DecryptedCredential> = self
            .entries
            .iter()
            .filter(|c| query.admits(c, needle.as_deref()))
            .cloned()
            .collect();

        match query.sort {
            SortOrder::Alphabetical => out.sort_by_cached_key(|c| {
                (
                    c.website.as_deref().unwrap_or_default().to_lowercase(),
                    c.username.to_lowercase(),
                )
            }),
            SortOrder::Newest => {
                out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)))
            }
        }
        out
    }
}
