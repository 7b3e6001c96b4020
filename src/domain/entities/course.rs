//! Course record and the field patch shared by reconciliation and optimistic writes.
//!
//! A `CourseRecord` is only ever created from a full fetch. Inbound push events
//! and optimistic UI writes both express themselves as a `CoursePatch`, so there
//! is exactly one merge discipline for the cache.

use serde::{Deserialize, Serialize};

/// Upper bound of the rating scale.
pub const MAX_RATING: f64 = 5.0;

/// Stable identifier of a course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CourseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CourseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Aggregate rating of a course.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    /// Mean rating in `[0, 5]`
    pub average: f64,
    /// Number of reviews
    pub count: u64,
}

impl Rating {
    /// Build a rating, rejecting averages outside `[0, 5]` or non-finite values.
    pub fn new(average: f64, count: u64) -> Result<Self, String> {
        if !average.is_finite() || !(0.0..=MAX_RATING).contains(&average) {
            return Err(format!(
                "average rating {} outside 0..={}",
                average, MAX_RATING
            ));
        }
        Ok(Self { average, count })
    }
}

/// Cached representation of a course entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(default)]
    pub price_cents: u64,
    #[serde(default)]
    pub enrollment_count: u64,
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub is_trending: bool,
}

impl CourseRecord {
    /// Minimal record, mostly useful for fixtures.
    pub fn new(id: impl Into<CourseId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            instructor: None,
            price_cents: 0,
            enrollment_count: 0,
            rating: Rating::default(),
            is_trending: false,
        }
    }
}

/// Subset of synchronized course fields.
///
/// `None` means "not carried"; the corresponding record field is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trending: Option<bool>,
}

impl CoursePatch {
    pub fn enrollment_count(count: u64) -> Self {
        Self {
            enrollment_count: Some(count),
            ..Self::default()
        }
    }

    pub fn rating(rating: Rating) -> Self {
        Self {
            rating: Some(rating),
            ..Self::default()
        }
    }

    pub fn trending(is_trending: bool) -> Self {
        Self {
            is_trending: Some(is_trending),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enrollment_count.is_none() && self.rating.is_none() && self.is_trending.is_none()
    }

    /// Names of the fields this patch carries.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::with_capacity(3);
        if self.enrollment_count.is_some() {
            fields.push("enrollmentCount");
        }
        if self.rating.is_some() {
            fields.push("rating");
        }
        if self.is_trending.is_some() {
            fields.push("isTrending");
        }
        fields
    }

    /// Merge into a copy of `record`.
    ///
    /// Returns `None` when every carried field already holds the patched value,
    /// so redelivered events leave the record untouched.
    pub fn merge(&self, record: &CourseRecord) -> Option<CourseRecord> {
        let mut next = record.clone();
        if let Some(count) = self.enrollment_count {
            next.enrollment_count = count;
        }
        if let Some(rating) = self.rating {
            next.rating = rating;
        }
        if let Some(is_trending) = self.is_trending {
            next.is_trending = is_trending;
        }

        if next == *record {
            None
        } else {
            Some(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> CourseRecord {
        CourseRecord {
            id: "c1".into(),
            title: "Rust for the Impatient".into(),
            instructor: Some("Ferris".into()),
            price_cents: 4900,
            enrollment_count: 10,
            rating: Rating {
                average: 4.5,
                count: 20,
            },
            is_trending: false,
        }
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0.0, 0).is_ok());
        assert!(Rating::new(5.0, 1).is_ok());
        assert!(Rating::new(5.01, 1).is_err());
        assert!(Rating::new(-0.1, 1).is_err());
        assert!(Rating::new(f64::NAN, 1).is_err());
    }

    #[test]
    fn test_merge_only_touches_carried_fields() {
        let record = sample();
        let merged = CoursePatch::enrollment_count(11).merge(&record).unwrap();

        assert_eq!(merged.enrollment_count, 11);
        assert_eq!(merged.rating, record.rating);
        assert_eq!(merged.is_trending, record.is_trending);
        assert_eq!(merged.title, record.title);
        assert_eq!(merged.price_cents, record.price_cents);
    }

    #[test]
    fn test_merge_returns_none_when_unchanged() {
        let record = sample();
        assert!(CoursePatch::enrollment_count(10).merge(&record).is_none());
        assert!(CoursePatch::default().merge(&record).is_none());
    }

    #[test]
    fn test_patch_fields() {
        let patch = CoursePatch {
            enrollment_count: Some(1),
            rating: None,
            is_trending: Some(true),
        };
        assert_eq!(patch.fields(), vec!["enrollmentCount", "isTrending"]);
        assert!(!patch.is_empty());
        assert!(CoursePatch::default().is_empty());
    }

    #[test]
    fn test_record_deserializes_from_fetch_shape() {
        let json = r#"{
            "id": "c9",
            "title": "Async in Depth",
            "enrollmentCount": 3,
            "rating": {"average": 3.5, "count": 2},
            "isTrending": true
        }"#;
        let record: CourseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, CourseId::new("c9"));
        assert_eq!(record.enrollment_count, 3);
        assert!(record.is_trending);
        assert_eq!(record.price_cents, 0);
    }
}
