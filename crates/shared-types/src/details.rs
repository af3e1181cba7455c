//! Provider event details stored as JSON in a TEXT column.
//!
//! The calendar provider returns an opaque blob describing the remote event.
//! Only the provider event `id` is interpreted here; every other field is
//! carried through untouched so that the stored blob round-trips exactly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Provider-specific details of a remote calendar event.
///
/// ```ignore
/// let details: EventDetails = serde_json::from_str(r#"{"id":"abc","etag":"\"1\""}"#)?;
/// assert_eq!(details.id, "abc");
/// assert_eq!(details.extra["etag"], "\"1\"");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::expression::AsExpression, diesel::deserialize::FromSqlRow))]
#[cfg_attr(feature = "diesel", diesel(sql_type = diesel::sql_types::Text))]
pub struct EventDetails {
    /// Provider-assigned event identifier
    pub id: String,

    /// Failing policies the event was booked for, used to detect changes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failing_policy_ids: Vec<Uuid>,

    /// Remaining provider fields, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventDetails {
    pub fn new(id: impl Into<String>) -> Self {
        EventDetails {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Attach an extra provider field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Record which failing policies this event covers (sorted, deduplicated).
    pub fn with_failing_policies(mut self, ids: &[Uuid]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        self.failing_policy_ids = ids;
        self
    }

    /// Whether the recorded failing set differs from `ids` (ignoring order).
    pub fn failing_policies_differ(&self, ids: &[Uuid]) -> bool {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        self.failing_policy_ids != ids
    }
}

#[cfg(feature = "diesel")]
mod sql {
    use super::EventDetails;
    use diesel::deserialize::FromSql;
    use diesel::pg::{Pg, PgValue};
    use diesel::serialize::{IsNull, Output, ToSql};
    use diesel::sql_types::Text;
    use std::io::Write;

    impl FromSql<Text, Pg> for EventDetails {
        fn from_sql(bytes: PgValue<'_>) -> diesel::deserialize::Result<Self> {
            let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
            let details = serde_json::from_str(&s)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            Ok(details)
        }
    }

    impl ToSql<Text, Pg> for EventDetails {
        fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> diesel::serialize::Result {
            let s = serde_json::to_string(self)?;
            out.write_all(s.as_bytes())?;
            Ok(IsNull::No)
        }
    }
}
