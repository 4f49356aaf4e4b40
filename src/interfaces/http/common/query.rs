//! Query-string parameters shared by collection endpoints

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::envelope::OcpiError;
use crate::shared::PageRequest;

/// `?skip=&take=&date_from=&date_to=` on every GET collection.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<usize>,
    #[serde(alias = "limit")]
    pub take: Option<usize>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest {
            skip: q.skip.unwrap_or(0),
            take: q.take,
            date_from: q.date_from,
            date_to: q.date_to,
        }
    }
}

/// Turn an extracted (or rejected) query into a page request.
pub fn page_request(
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<PageRequest, OcpiError> {
    let Query(query) =
        query.map_err(|e| OcpiError::invalid_parameters(e.body_text()))?;
    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        if from > to {
            return Err(OcpiError::invalid_parameters("date_from is after date_to"));
        }
    }
    Ok(query.into())
}
