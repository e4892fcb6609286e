//! Search over the auction projection.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::ProjectionRecord;

pub const DEFAULT_PAGE_SIZE: usize = 4;

/// Window used by [`FilterBy::EndingSoon`].
const ENDING_SOON_HOURS: i64 = 6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderBy {
    /// By make, then model.
    Make,
    /// Newest listings first.
    New,
    /// Soonest auction end first.
    #[default]
    #[serde(other)]
    AuctionEnd,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterBy {
    Finished,
    EndingSoon,
    #[default]
    #[serde(other)]
    Live,
}

/// Query-string shape of a search request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub search_term: Option<String>,
    pub seller: Option<String>,
    pub winner: Option<String>,
    pub order_by: OrderBy,
    pub filter_by: FilterBy,
    pub page_number: usize,
    pub page_size: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_term: None,
            seller: None,
            winner: None,
            order_by: OrderBy::default(),
            filter_by: FilterBy::default(),
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<ProjectionRecord>,
    pub page_count: usize,
    pub total_count: usize,
}

fn matches_term(record: &ProjectionRecord, term: &str) -> bool {
    let term = term.to_lowercase();
    [&record.make, &record.model, &record.color]
        .iter()
        .any(|field| field.to_lowercase().contains(&term))
}

fn matches_filter(record: &ProjectionRecord, filter: FilterBy, now: DateTime<Utc>) -> bool {
    match filter {
        FilterBy::Finished => record.auction_end < now,
        FilterBy::EndingSoon => {
            record.auction_end > now
                && record.auction_end < now + TimeDelta::hours(ENDING_SOON_HOURS)
        }
        FilterBy::Live => record.auction_end > now,
    }
}

/// Filter, order and page `records` as of `now`.
pub fn search<'a>(
    records: impl IntoIterator<Item = &'a ProjectionRecord>,
    params: &SearchParams,
    now: DateTime<Utc>,
) -> SearchPage {
    let term = params
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty());

    let mut hits: Vec<&ProjectionRecord> = records
        .into_iter()
        .filter(|r| term.map_or(true, |term| matches_term(r, term)))
        .filter(|r| params.seller.as_deref().map_or(true, |s| r.seller == s))
        .filter(|r| {
            params
                .winner
                .as_deref()
                .map_or(true, |w| r.winner.as_deref() == Some(w))
        })
        .filter(|r| matches_filter(r, params.filter_by, now))
        .collect();

    match params.order_by {
        OrderBy::Make => hits.sort_by(|a, b| (&a.make, &a.model).cmp(&(&b.make, &b.model))),
        OrderBy::New => hits.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        OrderBy::AuctionEnd => hits.sort_by_key(|r| r.auction_end),
    }

    let page_size = params.page_size.max(1);
    let page_number = params.page_number.max(1);
    let total_count = hits.len();
    let page_count = total_count.div_ceil(page_size);

    let results = hits
        .into_iter()
        .skip((page_number - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    SearchPage {
        results,
        page_count,
        total_count,
    }
}
