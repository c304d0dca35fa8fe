use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

/// One review as shown in the Maps review feed. Reviews carry no stable
/// upstream ID, so `(user_name, timestamp, text_review)` serves as the
/// identity key for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub user_name: String,
    /// Star rating 1..=5. Absent when the card exposes none; never fabricated.
    #[serde(default)]
    pub rating: Option<u8>,
    /// Free-text relative timestamp ("2 months ago", "sebulan lalu"); empty
    /// string when the card has none.
    #[serde(default)]
    pub timestamp: String,
    pub text_review: String,
}

impl Review {
    pub fn identity_key(&self) -> (&str, &str, &str) {
        (&self.user_name, &self.timestamp, &self.text_review)
    }
}

/// A place with its accumulated reviews, keyed by `place_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_url: String,
    pub place_name: String,
    pub place_location: String,
    pub reviews: Vec<Review>,
}

impl Place {
    /// Unions `incoming` into this place's reviews, keeping first-seen order
    /// and dropping identity-key duplicates. Returns how many were added.
    pub fn merge_reviews(&mut self, incoming: Vec<Review>) -> usize {
        let mut seen: HashSet<(String, String, String)> = self
            .reviews
            .iter()
            .map(|r| owned_key(r))
            .collect();

        let mut added = 0;
        for review in incoming {
            if seen.insert(owned_key(&review)) {
                self.reviews.push(review);
                added += 1;
            }
        }
        added
    }

    /// Order-preserving dedup of a freshly extracted review list.
    pub fn dedup_reviews(reviews: Vec<Review>) -> Vec<Review> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(reviews.len());
        for review in reviews {
            if seen.insert(owned_key(&review)) {
                out.push(review);
            }
        }
        out
    }
}

fn owned_key(review: &Review) -> (String, String, String) {
    (
        review.user_name.clone(),
        review.timestamp.clone(),
        review.text_review.clone(),
    )
}

/// One row of the flat CSV projection: place columns repeated per review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatReviewRow {
    pub place_url: String,
    pub place_name: String,
    pub place_location: String,
    pub user_name: String,
    pub rating: Option<u8>,
    pub timestamp: String,
    pub text_review: String,
}

impl FlatReviewRow {
    pub fn from_place(place: &Place, review: &Review) -> Self {
        FlatReviewRow {
            place_url: place.place_url.clone(),
            place_name: place.place_name.clone(),
            place_location: place.place_location.clone(),
            user_name: review.user_name.clone(),
            rating: review.rating,
            timestamp: review.timestamp.clone(),
            text_review: review.text_review.clone(),
        }
    }
}

/// Normalizes a raw href from the results panel into a canonical place URL.
///
/// Relative hrefs get the Maps origin prefixed, tracking parameters after the
/// first `&` are dropped, and anything that is not a place link (ads, map
/// tiles, profile links) is rejected.
pub fn normalize_place_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with('/') {
        format!("https://www.google.com{href}")
    } else {
        href.to_string()
    };

    if !absolute.contains("/maps/place/") {
        return None;
    }

    let trimmed = absolute.split('&').next()?.to_string();
    Url::parse(&trimmed).ok()?;
    Some(trimmed)
}

/// Collapses runs of whitespace (including newlines from nested spans) into
/// single spaces and trims the ends.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(user: &str, ts: &str, text: &str) -> Review {
        Review {
            user_name: user.to_string(),
            rating: Some(5),
            timestamp: ts.to_string(),
            text_review: text.to_string(),
        }
    }

    #[test]
    fn normalize_keeps_absolute_place_links() {
        let href = "https://www.google.com/maps/place/Foo/@-6.2,106.8,17z";
        assert_eq!(normalize_place_link(href), Some(href.to_string()));
    }

    #[test]
    fn normalize_prefixes_relative_links() {
        let out = normalize_place_link("/maps/place/Foo").unwrap();
        assert_eq!(out, "https://www.google.com/maps/place/Foo");
    }

    #[test]
    fn normalize_drops_tracking_suffix() {
        let out = normalize_place_link("https://www.google.com/maps/place/Foo?hl=id&entry=ttu").unwrap();
        assert_eq!(out, "https://www.google.com/maps/place/Foo?hl=id");
    }

    #[test]
    fn normalize_rejects_non_place_links() {
        assert_eq!(normalize_place_link("https://www.google.com/maps/search/spklu"), None);
        assert_eq!(normalize_place_link("/maps/contrib/12345"), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let reviews = vec![
            review("Ana", "2 months ago", "great"),
            review("Ben", "a year ago", "ok"),
            review("Ana", "2 months ago", "great"),
        ];
        let out = Place::dedup_reviews(reviews);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].user_name, "Ana");
        assert_eq!(out[1].user_name, "Ben");
    }

    #[test]
    fn same_user_different_text_is_not_a_duplicate() {
        let reviews = vec![
            review("Ana", "2 months ago", "great"),
            review("Ana", "2 months ago", "updated: still great"),
        ];
        assert_eq!(Place::dedup_reviews(reviews).len(), 2);
    }

    #[test]
    fn merge_reviews_unions_without_duplicates() {
        let mut place = Place {
            place_url: "u".into(),
            place_name: "n".into(),
            place_location: "l".into(),
            reviews: vec![review("Ana", "2 months ago", "great")],
        };
        let added = place.merge_reviews(vec![
            review("Ana", "2 months ago", "great"),
            review("Ben", "a year ago", "ok"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(place.reviews.len(), 2);
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a\n\tb   c "), "a b c");
        assert_eq!(clean_text(""), "");
    }
}
