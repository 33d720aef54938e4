//! Name to phone number directory backed by a JSON file.

use crate::error::ContactsError;
use crate::phone::{self, Region};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Looks up spoken names.
///
/// The resolver only needs this one read; tests and alternative directories
/// can implement it without a file behind them.
pub trait ContactDirectory: Send + Sync {
    /// Returns the canonical number for `name`, matched case-insensitively.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Sorted name to E.164 number map, as stored on disk and returned by the API.
pub type ContactMap = BTreeMap<String, String>;

fn contact_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Contact book held in memory and mirrored to a JSON file.
///
/// Keys are stored lower-cased and trimmed; numbers are stored normalized.
#[derive(Debug)]
pub struct ContactBook {
    path: Option<PathBuf>,
    region: Region,
    entries: RwLock<ContactMap>,
}

impl ContactBook {
    /// Creates a contact book that is never written to disk.
    pub fn in_memory(region: Region) -> Self {
        Self {
            path: None,
            region,
            entries: RwLock::new(ContactMap::new()),
        }
    }

    /// Opens the contact book at `path`.
    ///
    /// A missing file is created empty. An unreadable or corrupt file is
    /// logged and the book starts empty, so a bad file never stops calls.
    pub fn open(path: impl Into<PathBuf>, region: Region) -> Self {
        let path = path.into();
        let entries = match load_file(&path) {
            Ok(Some(entries)) => {
                tracing::info!(path = %path.display(), count = entries.len(), "contacts loaded");
                entries
            }
            Ok(None) => {
                let entries = ContactMap::new();
                match save_file(&path, &entries) {
                    Ok(()) => tracing::info!(path = %path.display(), "created new contacts file"),
                    Err(e) => {
                        tracing::error!(path = %path.display(), "failed to create contacts file: {}", e)
                    }
                }
                entries
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "failed to load contacts: {}", e);
                ContactMap::new()
            }
        };

        Self {
            path: Some(path),
            region,
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of every contact.
    pub fn all(&self) -> ContactMap {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Replaces the whole book.
    ///
    /// Numbers are normalized; entries with invalid numbers are skipped with a
    /// warning. The in-memory book only changes once the file is written.
    /// Returns the stored map.
    pub fn replace(&self, contacts: HashMap<String, String>) -> Result<ContactMap, ContactsError> {
        let mut normalized = ContactMap::new();
        for (name, number) in contacts {
            match phone::normalize(&number, self.region) {
                Some(e164) => {
                    normalized.insert(contact_key(&name), e164);
                }
                None => {
                    tracing::warn!(name = %name, number = %number, "skipping invalid phone number");
                }
            }
        }

        let mut entries = self.write();
        self.persist(&normalized)?;
        *entries = normalized.clone();
        Ok(normalized)
    }

    /// Adds or updates one contact. Returns `false` if the number is invalid.
    pub fn insert(&self, name: &str, number: &str) -> Result<bool, ContactsError> {
        let Some(e164) = phone::normalize(number, self.region) else {
            return Ok(false);
        };

        let mut entries = self.write();
        let mut updated = entries.clone();
        updated.insert(contact_key(name), e164);
        self.persist(&updated)?;
        *entries = updated;
        Ok(true)
    }

    fn persist(&self, entries: &ContactMap) -> Result<(), ContactsError> {
        match &self.path {
            Some(path) => {
                save_file(path, entries)?;
                tracing::debug!(path = %path.display(), count = entries.len(), "contacts saved");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ContactMap> {
        self.entries.read().unwrap_or_else(|poisoned| {
            tracing::error!("contacts lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContactMap> {
        self.entries.write().unwrap_or_else(|poisoned| {
            tracing::error!("contacts lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl ContactDirectory for ContactBook {
    fn lookup(&self, name: &str) -> Option<String> {
        self.read().get(&contact_key(name)).cloned()
    }
}

fn load_file(path: &Path) -> Result<Option<ContactMap>, ContactsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ContactsError::Io(e)),
    }
}

fn save_file(path: &Path, entries: &ContactMap) -> Result<(), ContactsError> {
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_trimmed() {
        let book = ContactBook::in_memory(Region::US);
        assert!(book.insert("Alice", "201-555-0123").unwrap());
        assert_eq!(book.lookup("  ALICE "), Some("+12015550123".to_string()));
        assert_eq!(book.lookup("bob"), None);
    }

    #[test]
    fn insert_rejects_invalid_numbers() {
        let book = ContactBook::in_memory(Region::US);
        assert!(!book.insert("bob", "12").unwrap());
        assert!(book.is_empty());
    }

    #[test]
    fn replace_normalizes_and_skips_invalid() {
        let book = ContactBook::in_memory(Region::US);
        book.insert("old", "2015550199").unwrap();

        let stored = book
            .replace(HashMap::from([
                ("Alice".to_string(), "(201) 555-0123".to_string()),
                ("Nobody".to_string(), "not a number".to_string()),
            ]))
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get("alice").map(String::as_str), Some("+12015550123"));
        assert_eq!(book.lookup("old"), None);
    }

    #[test]
    fn open_creates_missing_file_and_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");

        let book = ContactBook::open(&path, Region::US);
        assert!(book.is_empty());
        assert!(path.exists(), "missing file should be created");

        book.insert("Carol", "+44 121 234 5678").unwrap();
        let reopened = ContactBook::open(&path, Region::US);
        assert_eq!(reopened.lookup("carol"), Some("+441212345678".to_string()));
    }

    #[test]
    fn failed_write_leaves_book_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("contacts.json");
        let book = ContactBook::open(&path, Region::US);

        let result = book.replace(HashMap::from([(
            "Alice".to_string(),
            "(201) 555-0123".to_string(),
        )]));
        assert!(matches!(result, Err(ContactsError::Io(_))));
        assert_eq!(book.lookup("alice"), None);

        assert!(book.insert("Bob", "201-555-0188").is_err());
        assert_eq!(book.lookup("bob"), None);
        assert!(book.is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.json");
        std::fs::write(&path, "{ not json").unwrap();

        let book = ContactBook::open(&path, Region::US);
        assert!(book.is_empty());
    }
}
