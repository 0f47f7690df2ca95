//! Wire types for the five operations and the row type persisted for a Book.
//!
//! Wire types serialize with camelCase keys so a text gateway can map them
//! one-to-one; [`BookRecord`] serializes with the column names of the
//! `book` table.

use serde::{Deserialize, Serialize};

use crate::time::{self, StorageDatetime, Timestamp};
use crate::{ServiceError, Storable};

const PUBLISH_DATE: &str = "publish_date";

/// A catalogued book as seen by callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Assigned by the store on create; ignored on create input.
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publish_date: Option<Timestamp>,
    pub rating: f64,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub api: String,
    pub book: Book,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub api: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    #[serde(default)]
    pub api: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub api: String,
    pub book: Book,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default)]
    pub api: String,
    pub book: Book,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub api: String,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub api: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub api: String,
    pub deleted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAllRequest {
    #[serde(default)]
    pub api: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAllResponse {
    pub api: String,
    pub books: Vec<Book>,
}

/// One row of the `book` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publish_date: StorageDatetime,
    #[serde(with = "float_column")]
    pub rating: f64,
    pub status: i32,
}

/// Serde for `double` columns that keeps NaN and the infinities.
///
/// JSON numbers cannot carry them, so they travel as the strings `"NaN"`,
/// `"inf"` and `"-inf"`, which `str::parse::<f64>` reads back.
pub mod float_column {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    /// The string form of a non-finite value, `None` for finite ones.
    pub fn non_finite_label(value: f64) -> Option<&'static str> {
        if value.is_nan() {
            Some("NaN")
        } else if value == f64::INFINITY {
            Some("inf")
        } else if value == f64::NEG_INFINITY {
            Some("-inf")
        } else {
            None
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        match non_finite_label(*value) {
            Some(label) => serializer.serialize_str(label),
            None => serializer.serialize_f64(*value),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            v.parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}

impl BookRecord {
    /// Build a row from caller input, decoding the publish date.
    pub fn from_book(book: &Book) -> Result<Self, ServiceError> {
        let publish_date = time::decode(book.publish_date.as_ref())
            .map_err(|e| ServiceError::bad_timestamp(PUBLISH_DATE, e))?;
        Ok(Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            publisher: book.publisher.clone(),
            publish_date,
            rating: book.rating,
            status: book.status,
        })
    }

    /// Convert a stored row back to the wire shape.
    pub fn into_book(self) -> Result<Book, ServiceError> {
        let publish_date = time::encode(&self.publish_date)
            .map_err(|e| ServiceError::corrupt_timestamp(PUBLISH_DATE, e))?;
        Ok(Book {
            id: self.id,
            title: self.title,
            author: self.author,
            publisher: self.publisher,
            publish_date: Some(publish_date),
            rating: self.rating,
            status: self.status,
        })
    }
}

impl Storable for BookRecord {
    fn table_name() -> &'static str {
        "book"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "title",
            "author",
            "publisher",
            "publish_date",
            "rating",
            "status",
        ]
    }

    fn column_types() -> &'static [&'static str] {
        &[
            "bigint", "text", "text", "text", "datetime", "double", "integer",
        ]
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn book() -> Book {
        Book {
            id: 0,
            title: "title".to_string(),
            author: "author".to_string(),
            publisher: "publisher".to_string(),
            publish_date: Some(Timestamp::new(1_033_552_800, 0)),
            rating: 2.0,
            status: 1,
        }
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let json = serde_json::to_value(&book()).unwrap();
        assert_eq!(json["publishDate"]["seconds"], 1_033_552_800);
        assert_eq!(json["publishDate"]["nanos"], 0);
    }

    #[test]
    fn missing_api_deserializes_as_empty() {
        let req: ReadAllRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.api, "");
        let req: ReadRequest = serde_json::from_str(r#"{"id": 4}"#).unwrap();
        assert_eq!(req, ReadRequest { api: String::new(), id: 4 });
    }

    #[test]
    fn record_round_trips_through_the_wire_shape() {
        let record = BookRecord::from_book(&book()).unwrap();
        assert_eq!(record.publish_date.to_string(), "2002-10-02T10:00:00.000000Z");
        assert_eq!(record.into_book().unwrap(), book());
    }

    #[test]
    fn missing_publish_date_is_invalid_argument() {
        let mut input = book();
        input.publish_date = None;
        let err = BookRecord::from_book(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.field(), Some("publish_date"));
    }

    #[test]
    fn writable_columns_skip_the_id() {
        let writable = BookRecord::writable_columns();
        assert_eq!(writable.len(), 6);
        assert_eq!(writable[0], ("title", "text"));
        assert_eq!(writable[3], ("publish_date", "datetime"));
        assert!(writable.iter().all(|(column, _)| *column != "id"));
    }

    #[test]
    fn non_finite_ratings_survive_the_row_shape() {
        for rating in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let mut input = book();
            input.rating = rating;
            let json = serde_json::to_value(BookRecord::from_book(&input).unwrap()).unwrap();
            assert!(json["rating"].is_string(), "{} became {}", rating, json["rating"]);

            let back: BookRecord = serde_json::from_value(json).unwrap();
            if rating.is_nan() {
                assert!(back.rating.is_nan());
            } else {
                assert_eq!(back.rating, rating);
            }
        }

        let json = serde_json::to_value(BookRecord::from_book(&book()).unwrap()).unwrap();
        assert_eq!(json["rating"], serde_json::json!(2.0));
    }

    #[test]
    fn record_serializes_with_column_names() {
        let json = serde_json::to_value(BookRecord::from_book(&book()).unwrap()).unwrap();
        let object = json.as_object().unwrap();
        for column in BookRecord::columns() {
            assert!(object.contains_key(*column), "missing {}", column);
        }
    }
}
