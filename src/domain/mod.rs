pub mod conversation;
pub mod event;
pub mod friend_request;
pub mod message;
pub mod user;

use serde::Serializer;
use time::OffsetDateTime;

/// Timestamps travel over the wire as Unix milliseconds.
pub(crate) fn serialize_unix_millis<S: Serializer>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = i64::try_from(ts.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX);
    serializer.serialize_i64(millis)
}
