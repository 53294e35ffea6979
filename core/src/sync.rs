//! Wire types of the delta synchronisation protocol.
//!
//! A client sends the watermark of its last successful sync and, optionally,
//! every event id it currently caches. The server answers with events edited
//! after the watermark, the cached ids that are no longer relevant, and a new
//! watermark. No deletion log is kept server-side: removal is a set
//! difference against what the client asserts it holds.

use crate::error::{RegistrationError, Result};
use crate::types::{Event, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incoming sync request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Watermark of the previous sync; `None` means full resync
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Ids the client holds; `None` opts out of removal detection
    #[serde(default)]
    pub known_ids: Option<Vec<EventId>>,
}

impl SyncRequest {
    /// A full resync without removal detection.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            since: None,
            known_ids: None,
        }
    }

    /// Set the watermark.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the known-id set.
    #[must_use]
    pub fn known_ids(mut self, ids: impl IntoIterator<Item = EventId>) -> Self {
        self.known_ids = Some(ids.into_iter().collect());
        self
    }

    /// Parse the query-string form: an RFC 3339 `since` and a
    /// comma-separated id list.
    ///
    /// Empty strings are treated as absent. Empty segments in the id list
    /// (`"a,,b"`, trailing commas) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Validation`] for an unparsable timestamp
    /// or a malformed id.
    ///
    /// # Examples
    ///
    /// ```
    /// use rsvp_core::sync::SyncRequest;
    ///
    /// let req = SyncRequest::from_query(Some("2025-11-17T14:34:55.909Z"), Some("a,b")).unwrap();
    /// assert!(req.since.is_some());
    /// assert_eq!(req.known_ids.unwrap().len(), 2);
    ///
    /// assert!(SyncRequest::from_query(Some("yesterday"), None).is_err());
    /// ```
    pub fn from_query(since: Option<&str>, ids_csv: Option<&str>) -> Result<Self> {
        let since = match since.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| {
                        RegistrationError::Validation(format!("invalid watermark {raw:?}: {e}"))
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let known_ids = match ids_csv {
            Some(csv) => Some(
                csv.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<EventId>()
                            .map_err(|e| RegistrationError::Validation(e.to_string()))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(Self { since, known_ids })
    }
}

/// Sync answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Replaces `since` on the client's next call
    pub watermark: DateTime<Utc>,
    /// Relevant events edited after `since`
    pub changed: Vec<Event>,
    /// Known ids that are no longer relevant to the requester
    pub removed_ids: Vec<EventId>,
}
