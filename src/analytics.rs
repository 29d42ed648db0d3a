//! History, stats and analytics derived from recorded submissions
//!
//! Everything here is a pure function over a sender's records, so the same
//! code serves both store backends.

use std::collections::BTreeMap;
use std::str::FromStr;

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::chains;
use crate::fees::format_avax;
use crate::types::{DeliveryStatus, SubmissionRecord};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_ANALYTICS_DAYS: u32 = 30;
pub const MAX_ANALYTICS_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Timestamp,
    Status,
    Amount,
    Destination,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(SortField::Timestamp),
            "status" => Ok(SortField::Status),
            "amount" => Ok(SortField::Amount),
            "destination" => Ok(SortField::Destination),
            other => Err(format!("unknown sort field '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Filter, sort and paging options for history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// `None` means all statuses
    pub status: Option<DeliveryStatus>,
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based
    pub page: usize,
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            sort: SortField::default(),
            order: SortOrder::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Raw query-string form of [`HistoryQuery`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl TryFrom<HistoryParams> for HistoryQuery {
    type Error = String;

    fn try_from(params: HistoryParams) -> Result<Self, Self::Error> {
        let status = match params.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(DeliveryStatus::from_str(s)?),
        };
        let search = params
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let sort = match params.sort.as_deref() {
            None | Some("") => SortField::default(),
            Some(s) => s.parse()?,
        };
        let order = match params.order.as_deref() {
            None | Some("") => SortOrder::default(),
            Some(s) => s.parse()?,
        };

        Ok(HistoryQuery {
            status,
            search,
            sort,
            order,
            page: params.page.unwrap_or(1).max(1),
            limit: params
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

/// One history row as the dashboard lists it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Message id when known, else the transaction hash
    pub id: B256,
    pub destination_subnet: &'static str,
    pub amount_avax: String,
    #[serde(flatten)]
    pub record: SubmissionRecord,
}

impl From<SubmissionRecord> for HistoryEntry {
    fn from(record: SubmissionRecord) -> Self {
        Self {
            id: record.message_id.unwrap_or(record.tx_hash),
            destination_subnet: chains::chain_name(record.destination_chain_id),
            amount_avax: format_avax(record.value),
            record,
        }
    }
}

fn matches_search(record: &SubmissionRecord, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    record.message.to_lowercase().contains(&needle)
        || record
            .destination_address
            .to_string()
            .to_lowercase()
            .contains(&needle)
        || record.tx_hash.to_string().contains(&needle)
}

fn status_rank(status: DeliveryStatus) -> u8 {
    match status {
        DeliveryStatus::Pending => 0,
        DeliveryStatus::Delivered => 1,
        DeliveryStatus::Failed => 2,
    }
}

/// Filter, sort and page a sender's records
pub fn history(records: Vec<SubmissionRecord>, query: &HistoryQuery) -> Vec<HistoryEntry> {
    let mut selected: Vec<SubmissionRecord> = records
        .into_iter()
        .filter(|r| query.status.map_or(true, |s| r.status == s))
        .filter(|r| {
            query
                .search
                .as_deref()
                .map_or(true, |needle| matches_search(r, needle))
        })
        .collect();

    // Stable sort: ties keep store order (newest first)
    selected.sort_by(|a, b| {
        let ordering = match query.sort {
            SortField::Timestamp => a.submitted_at.cmp(&b.submitted_at),
            SortField::Status => status_rank(a.status).cmp(&status_rank(b.status)),
            SortField::Amount => a.value.cmp(&b.value),
            SortField::Destination => chains::chain_name(a.destination_chain_id)
                .cmp(chains::chain_name(b.destination_chain_id))
                .then(a.destination_chain_id.cmp(&b.destination_chain_id)),
        };
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let offset = (query.page - 1).saturating_mul(query.limit);
    selected
        .into_iter()
        .skip(offset)
        .take(query.limit)
        .map(HistoryEntry::from)
        .collect()
}

/// Headline counters for a sender
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_sent: usize,
    /// Messages confirmed delivered on the destination chain
    pub total_received: usize,
    pub pending_messages: usize,
    pub failed_messages: usize,
    /// Percentage of sent messages delivered, one decimal
    pub success_rate: f64,
}

fn success_rate(delivered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (delivered as f64 / total as f64 * 1000.0).round() / 10.0
}

pub fn stats(records: &[SubmissionRecord]) -> Stats {
    let count = |status: DeliveryStatus| records.iter().filter(|r| r.status == status).count();
    let delivered = count(DeliveryStatus::Delivered);
    Stats {
        total_sent: records.len(),
        total_received: delivered,
        pending_messages: count(DeliveryStatus::Pending),
        failed_messages: count(DeliveryStatus::Failed),
        success_rate: success_rate(delivered, records.len()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetCount {
    pub name: &'static str,
    pub chain_id: B256,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: DeliveryStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    /// Busiest destination first
    pub messages_by_subnet: Vec<SubnetCount>,
    /// One entry per day, oldest first, zero-filled
    pub messages_by_day: Vec<DayCount>,
    pub messages_by_status: Vec<StatusCount>,
    /// Mean seconds from submission to observed delivery
    pub average_delivery_time: Option<f64>,
    /// Sum of sent values, in AVAX
    pub total_volume: String,
    pub success_rate: f64,
}

/// Aggregate a sender's records over the last `days` days ending at `now`
pub fn analytics(records: &[SubmissionRecord], days: u32, now: DateTime<Utc>) -> Analytics {
    let days = days.clamp(1, MAX_ANALYTICS_DAYS);

    let mut by_subnet: BTreeMap<B256, usize> = BTreeMap::new();
    for record in records {
        *by_subnet.entry(record.destination_chain_id).or_default() += 1;
    }
    let mut messages_by_subnet: Vec<SubnetCount> = by_subnet
        .into_iter()
        .map(|(chain_id, count)| SubnetCount {
            name: chains::chain_name(chain_id),
            chain_id,
            count,
        })
        .collect();
    messages_by_subnet.sort_by(|a, b| b.count.cmp(&a.count));

    let today = now.date_naive();
    let first = today - Duration::days(i64::from(days) - 1);
    let mut by_day: BTreeMap<NaiveDate, usize> = (0..i64::from(days))
        .map(|offset| (first + Duration::days(offset), 0))
        .collect();
    for record in records {
        if let Some(count) = by_day.get_mut(&record.submitted_at.date_naive()) {
            *count += 1;
        }
    }
    let messages_by_day = by_day
        .into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect();

    let messages_by_status = [
        DeliveryStatus::Pending,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
    ]
    .into_iter()
    .map(|status| StatusCount {
        status,
        count: records.iter().filter(|r| r.status == status).count(),
    })
    .collect();

    let durations: Vec<f64> = records
        .iter()
        .filter_map(SubmissionRecord::delivery_seconds)
        .collect();
    let average_delivery_time = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    let total_volume = records
        .iter()
        .fold(U256::ZERO, |acc, r| acc.saturating_add(r.value));

    let delivered = records
        .iter()
        .filter(|r| r.status == DeliveryStatus::Delivered)
        .count();

    Analytics {
        messages_by_subnet,
        messages_by_day,
        messages_by_status,
        average_delivery_time,
        total_volume: format_avax(total_volume),
        success_rate: success_rate(delivered, records.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn record(tx: u8, status: DeliveryStatus, days_ago: i64, avax_milli: u64) -> SubmissionRecord {
        let submitted_at = now() - Duration::days(days_ago);
        SubmissionRecord {
            tx_hash: B256::repeat_byte(tx),
            message_id: None,
            sender: Address::repeat_byte(0xaa),
            destination_chain_id: B256::with_last_byte(tx % 3 + 1),
            destination_address: Address::repeat_byte(tx),
            message: format!("message number {}", tx),
            value: U256::from(avax_milli) * U256::from(1_000_000_000_000_000u64),
            status,
            failure_reason: None,
            mock: false,
            block_number: None,
            submitted_at,
            delivered_at: (status == DeliveryStatus::Delivered)
                .then(|| submitted_at + Duration::seconds(30)),
        }
    }

    fn sample() -> Vec<SubmissionRecord> {
        vec![
            record(1, DeliveryStatus::Delivered, 0, 10),
            record(2, DeliveryStatus::Pending, 1, 20),
            record(3, DeliveryStatus::Failed, 2, 5),
            record(4, DeliveryStatus::Delivered, 40, 15),
        ]
    }

    #[test]
    fn test_history_defaults_to_newest_first() {
        let page = history(sample(), &HistoryQuery::default());
        let order: Vec<u8> = page.iter().map(|e| e.record.tx_hash[0]).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_history_filter_and_search() {
        let query = HistoryQuery {
            status: Some(DeliveryStatus::Delivered),
            ..Default::default()
        };
        assert_eq!(history(sample(), &query).len(), 2);

        let query = HistoryQuery {
            search: Some("NUMBER 3".to_string()),
            ..Default::default()
        };
        let page = history(sample(), &query);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].record.status, DeliveryStatus::Failed);
    }

    #[test]
    fn test_history_sort_and_paginate() {
        let query = HistoryQuery {
            sort: SortField::Amount,
            order: SortOrder::Asc,
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let page = history(sample(), &query);
        let amounts: Vec<String> = page.iter().map(|e| e.amount_avax.clone()).collect();
        assert_eq!(amounts, vec!["0.015", "0.02"]);

        let query = HistoryQuery {
            page: 5,
            ..Default::default()
        };
        assert!(history(sample(), &query).is_empty());
    }

    #[test]
    fn test_history_entry_labels() {
        let entry = HistoryEntry::from(record(1, DeliveryStatus::Pending, 0, 10));
        assert_eq!(entry.id, B256::repeat_byte(1));
        assert_eq!(entry.destination_subnet, "DeFi Kingdoms");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["destinationSubnet"], "DeFi Kingdoms");
        assert_eq!(json["content"], "message number 1");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_history_params_parsing() {
        let params = HistoryParams {
            status: Some("completed".into()),
            limit: Some(1000),
            page: Some(0),
            ..Default::default()
        };
        let query = HistoryQuery::try_from(params).unwrap();
        assert_eq!(query.status, Some(DeliveryStatus::Delivered));
        assert_eq!(query.limit, MAX_PAGE_SIZE);
        assert_eq!(query.page, 1);

        let params = HistoryParams {
            sort: Some("colour".into()),
            ..Default::default()
        };
        assert!(HistoryQuery::try_from(params).is_err());
    }

    #[test]
    fn test_stats() {
        let s = stats(&sample());
        assert_eq!(s.total_sent, 4);
        assert_eq!(s.total_received, 2);
        assert_eq!(s.pending_messages, 1);
        assert_eq!(s.failed_messages, 1);
        assert_eq!(s.success_rate, 50.0);

        let records = vec![
            record(1, DeliveryStatus::Delivered, 0, 1),
            record(2, DeliveryStatus::Pending, 0, 1),
            record(3, DeliveryStatus::Pending, 0, 1),
        ];
        assert_eq!(stats(&records).success_rate, 33.3);
        assert_eq!(stats(&[]).success_rate, 0.0);
    }

    #[test]
    fn test_analytics() {
        let a = analytics(&sample(), 7, now());

        assert_eq!(a.messages_by_day.len(), 7);
        assert_eq!(
            a.messages_by_day.last().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
        let in_window: usize = a.messages_by_day.iter().map(|d| d.count).sum();
        assert_eq!(in_window, 3);

        let total: usize = a.messages_by_subnet.iter().map(|s| s.count).sum();
        assert_eq!(total, 4);
        assert!(a.messages_by_subnet.windows(2).all(|w| w[0].count >= w[1].count));

        assert_eq!(a.messages_by_status[1].count, 2);
        assert_eq!(a.average_delivery_time, Some(30.0));
        assert_eq!(a.total_volume, "0.05");
        assert_eq!(a.success_rate, 50.0);
    }

    #[test]
    fn test_analytics_without_deliveries() {
        let records = vec![record(2, DeliveryStatus::Pending, 0, 20)];
        let a = analytics(&records, 30, now());
        assert_eq!(a.average_delivery_time, None);
        assert_eq!(a.messages_by_day.len(), 30);

        let json = serde_json::to_value(&a).unwrap();
        assert!(json["averageDeliveryTime"].is_null());
        assert_eq!(json["messagesByDay"][29]["date"], "2024-03-10");
    }
}
