//! The accumulating master dataset: every place ever extracted, unique by
//! `place_url`, persisted as a nested JSON tree plus a flat one-row-per-review
//! CSV. The JSON tree is authoritative; the CSV is rebuilt from it on every
//! flush, which keeps the two projections consistent by construction.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::StateError;
use crate::fsio;
use crate::models::{FlatReviewRow, Place};

pub const MASTER_JSON: &str = "all_places_reviews.json";
pub const MASTER_CSV: &str = "all_places_reviews.csv";

pub struct MasterStore {
    json_path: PathBuf,
    csv_path: PathBuf,
    places: Vec<Place>,
}

impl MasterStore {
    /// Loads the dataset from `dir`, or starts empty when nothing is there.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, StateError> {
        let dir = dir.as_ref();
        let json_path = dir.join(MASTER_JSON);
        let csv_path = dir.join(MASTER_CSV);

        let places: Vec<Place> = if json_path.exists() {
            let text = fs::read_to_string(&json_path)?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };

        info!("Master dataset: {} places loaded.", places.len());
        Ok(MasterStore { json_path, csv_path, places })
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Appends a new place or unions its reviews into the existing entry.
    /// Entries are never removed, only extended. Returns how many reviews
    /// the dataset gained.
    pub fn merge(&mut self, incoming: Place) -> usize {
        if let Some(existing) = self
            .places
            .iter_mut()
            .find(|p| p.place_url == incoming.place_url)
        {
            let added = existing.merge_reviews(incoming.reviews);
            debug!("{}: merged, {} new reviews", existing.place_url, added);
            added
        } else {
            let mut place = incoming;
            place.reviews = Place::dedup_reviews(std::mem::take(&mut place.reviews));
            let added = place.reviews.len();
            debug!("{}: appended with {} reviews", place.place_url, added);
            self.places.push(place);
            added
        }
    }

    /// Writes both projections, each via temp-then-rename, so a crash during
    /// flush never overwrites good data with a half-written file.
    pub fn flush(&self) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(&self.places)?;
        fsio::write_atomic(&self.json_path, json.as_bytes())?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for place in &self.places {
            for review in &place.reviews {
                writer.serialize(FlatReviewRow::from_place(place, review))?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StateError::Io(e.into_error()))?;
        fsio::write_atomic(&self.csv_path, &bytes)?;

        Ok(())
    }
}
