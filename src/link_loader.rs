//! Persistence for the link list: a JSON array of place URL strings, written
//! once by the `links` command and read-only afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::StateError;
use crate::fsio;

/// Loads the link list, dropping duplicates while keeping first-seen order.
/// The list on disk is trusted to already be normalized.
pub fn load_links<P: AsRef<Path>>(path: P) -> Result<Vec<String>, StateError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let raw: Vec<String> = serde_json::from_str(&text)?;

    let mut seen = HashSet::new();
    let mut links = Vec::with_capacity(raw.len());
    for link in raw {
        if !link.is_empty() && seen.insert(link.clone()) {
            links.push(link);
        }
    }

    info!("Loaded {} links from {:?}", links.len(), path);
    Ok(links)
}

pub fn save_links<P: AsRef<Path>>(path: P, links: &[String]) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(links)?;
    fsio::write_atomic(path.as_ref(), json.as_bytes())?;
    info!("Saved {} links to {:?}", links.len(), path.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_dedups_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("place_links.json");

        save_links(&path, &["a".into(), "b".into()]).unwrap();
        // Simulate a hand-edited file with a duplicate and an empty entry.
        fs::write(&path, r#"["a", "b", "a", ""]"#).unwrap();

        let links = load_links(&path).unwrap();
        assert_eq!(links, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_links(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StateError::Io(_)));
    }

    #[test]
    fn wrong_shape_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("place_links.json");
        fs::write(&path, r#"{"links": []}"#).unwrap();
        assert!(matches!(load_links(&path).unwrap_err(), StateError::Json(_)));
    }
}
