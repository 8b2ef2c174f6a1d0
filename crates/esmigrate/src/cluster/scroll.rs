//! Decoding of scroll responses, shared by both dialects.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{Cursor, Document, Page, ShardFailure};

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: Hits,
    #[serde(rename = "_shards", default)]
    shards: Shards,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: TotalHits,
    #[serde(default)]
    hits: Vec<Document>,
}

/// `hits.total` is a bare number up to 6.x and an object from 7.x on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl Default for TotalHits {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            Self::Count(n) | Self::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Shards {
    #[serde(default)]
    failures: Vec<ShardFailure>,
}

/// Decodes a scroll response body into a page and the cursor it carries.
pub(crate) fn decode_page(body: &str) -> Result<(Page, Option<Cursor>)> {
    let response: ScrollResponse = serde_json::from_str(body)?;
    let page = Page {
        documents: response.hits.hits,
        total_hits: response.hits.total.value(),
        shard_failures: response.shards.failures,
    };
    Ok((page, response.scroll_id.map(Cursor::new)))
}

/// Decodes the response to a scroll-open request, which must carry a cursor.
pub(crate) fn decode_open(body: &str) -> Result<(Page, Cursor)> {
    match decode_page(body)? {
        (page, Some(cursor)) => Ok((page, cursor)),
        (_, None) => Err(Error::Decode(
            "scroll response carries no _scroll_id".to_string(),
        )),
    }
}

/// Decodes a continuation response; keeps `previous` if no new id is issued.
pub(crate) fn decode_continue(body: &str, previous: &Cursor) -> Result<(Page, Cursor)> {
    let (page, cursor) = decode_page(body)?;
    Ok((page, cursor.unwrap_or_else(|| previous.clone())))
}
