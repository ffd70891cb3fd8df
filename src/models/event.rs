use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Money;

/// One row of an article's history, with display names joined in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventLog {
    pub id: i64,
    pub article_id: i64,
    pub log_date: NaiveDate,
    pub log_time: Option<NaiveTime>,
    pub status_id: i64,
    pub status_name: Option<String>,
    pub event_type_id: Option<i64>,
    pub event_type_name: Option<String>,
    pub event_name: Option<String>,
    pub item_user_id: Option<i64>,
    pub item_user_name: Option<String>,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub cost: Option<Money>,
    pub currency: Option<String>,
    pub created_by_user_id: i64,
    pub created_by_name: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Values of a new history row. The creation timestamp is assigned by the database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEventLog {
    pub article_id: i64,
    pub log_date: Option<NaiveDate>,
    pub log_time: Option<NaiveTime>,
    pub status_id: Option<i64>,
    pub event_type_id: Option<i64>,
    pub event_name: Option<String>,
    pub item_user_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub cost: Option<Money>,
    pub currency: Option<String>,
    pub created_by_user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventLogImage {
    pub id: i64,
    pub event_log_id: i64,
    pub path: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupedEvent {
    pub id: i64,
    pub name: Option<String>,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroupedEvent {
    pub name: Option<String>,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

/// Which occasion, if any, a new event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    Existing(i64),
    New(NewGroupedEvent),
}
