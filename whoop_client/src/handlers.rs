use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Display;
use std::marker::PhantomData;

use crate::error::{Result, WhoopError};
use crate::models::{Cycle, Recovery, Sleep, UserData, UserMeasurements, UserProfile, Workout};
use crate::table::Table;
use crate::WhoopClient;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 25;

/// Marks where the record id goes in a single-record path template.
const ID_MARKER: char = '@';

/// Query for one of the collection endpoints. Defaults to 10 records per
/// page and following every continuation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub next_token: Option<String>,
    pub limit: u32,
    pub all_pages: bool,
}

impl Default for CollectionQuery {
    fn default() -> CollectionQuery {
        CollectionQuery {
            start: None,
            end: None,
            next_token: None,
            limit: DEFAULT_PAGE_LIMIT,
            all_pages: true,
        }
    }
}

impl CollectionQuery {
    pub fn new() -> CollectionQuery {
        Default::default()
    }

    pub fn start(mut self, start: &str) -> CollectionQuery {
        self.start = Some(String::from(start));
        self
    }

    pub fn end(mut self, end: &str) -> CollectionQuery {
        self.end = Some(String::from(end));
        self
    }

    pub fn next_token(mut self, token: &str) -> CollectionQuery {
        self.next_token = Some(String::from(token));
        self
    }

    pub fn limit(mut self, limit: u32) -> CollectionQuery {
        self.limit = limit;
        self
    }

    pub fn all_pages(mut self, all_pages: bool) -> CollectionQuery {
        self.all_pages = all_pages;
        self
    }

    fn params(&self) -> Result<Vec<(&'static str, String)>> {
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(WhoopError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {}",
                self.limit
            )));
        }

        let mut params = vec![("limit", self.limit.to_string())];
        if let Some(start) = &self.start {
            params.push(("start", check_datetime(start)?));
        }
        if let Some(end) = &self.end {
            params.push(("end", check_datetime(end)?));
        }
        if let Some(token) = &self.next_token {
            params.push(("nextToken", token.clone()));
        }
        Ok(params)
    }
}

/// Normalises a loosely formatted date into the UTC timestamp format the
/// API expects for `start` and `end`.
pub fn check_datetime(date: &str) -> Result<String> {
    let date = date.trim();
    let parsed: Option<DateTime<Utc>> = DateTime::parse_from_rfc3339(date)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(date, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(date, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(|naive| naive.and_utc())
        });

    match parsed {
        Some(dt) => Ok(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        None => Err(WhoopError::validation(format!("invalid date provided: '{date}'"))),
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    records: Vec<Value>,
    #[serde(default)]
    next_token: Option<String>,
}

/// Profile and body measurement endpoints.
pub struct UserHandler<'a> {
    client: &'a WhoopClient,
}

impl<'a> UserHandler<'a> {
    pub(crate) fn new(client: &'a WhoopClient) -> UserHandler<'a> {
        UserHandler { client }
    }

    pub fn profile(&self) -> Result<UserProfile> {
        let data = self.client.api_request("user/profile/basic", &[])?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn body_measurements(&self) -> Result<UserMeasurements> {
        let data = self.client.api_request("user/body_measurements", &[])?;
        Ok(serde_json::from_value(data)?)
    }
}

/// Binds a collection path and its single-record path template to a record
/// type. The template uses `@` where the id goes, e.g. `cycle/@/recovery`.
pub struct DataHandler<'a, T> {
    client: &'a WhoopClient,
    path: &'static str,
    path_single: String,
    localize: bool,
    _model: PhantomData<T>,
}

impl<'a, T: UserData> DataHandler<'a, T> {
    pub(crate) fn new(client: &'a WhoopClient, path: &'static str) -> DataHandler<'a, T> {
        DataHandler {
            client,
            path,
            path_single: format!("{path}/{ID_MARKER}"),
            localize: false,
            _model: PhantomData,
        }
    }

    pub(crate) fn with_single_path(mut self, path_single: &str) -> DataHandler<'a, T> {
        self.path_single = String::from(path_single);
        self
    }

    /// Records fetched through this handler get their timestamps expressed
    /// in their own `timezone_offset`.
    pub fn localized(mut self) -> DataHandler<'a, T> {
        self.localize = true;
        self
    }

    fn single_path(&self, id: impl Display) -> String {
        match self.path_single.split_once(ID_MARKER) {
            Some((head, tail)) => format!("{head}{id}{tail}"),
            None => format!("{}{id}", self.path_single),
        }
    }

    fn parse(&self, raw: Value) -> Result<T> {
        let mut record = T::from_value(raw)?;
        if self.localize {
            record.localize()?;
        }
        Ok(record)
    }

    pub fn single(&self, id: impl Display) -> Result<T> {
        let data = self.client.api_request(&self.single_path(id), &[])?;
        self.parse(data)
    }

    fn page(&self, query: &CollectionQuery) -> Result<(Vec<T>, Option<String>)> {
        let params = query.params()?;
        let data = self.client.api_request(self.path, &params)?;
        let page: Page = serde_json::from_value(data)?;

        let records = page
            .records
            .into_iter()
            .map(|raw| self.parse(raw))
            .collect::<Result<Vec<T>>>()?;
        let next_token = page.next_token.filter(|t| !t.is_empty());
        Ok((records, next_token))
    }

    /// Fetches one page, or with `all_pages` keeps following the
    /// continuation token until the API stops returning one. Records keep
    /// page order. The returned token is whatever the last fetched page
    /// carried.
    pub fn collection(&self, query: &CollectionQuery) -> Result<(Vec<T>, Option<String>)> {
        let (mut items, mut token) = self.page(query)?;
        if !query.all_pages {
            return Ok((items, token));
        }

        let mut pages = 1;
        while let Some(next) = token.take() {
            debug!("Following {} next token: {}", self.path, next);
            let (records, next_token) = self.page(&CollectionQuery {
                next_token: Some(next),
                all_pages: false,
                ..query.clone()
            })?;
            items.extend(records);
            token = next_token;
            pages += 1;
        }
        info!("Fetched {} {} records over {} pages", items.len(), self.path, pages);
        Ok((items, token))
    }

    /// Same as [`collection`](Self::collection), flattened into a table.
    pub fn collection_table(&self, query: &CollectionQuery) -> Result<(Table, Option<String>)> {
        let (records, token) = self.collection(query)?;
        Ok((Table::from_records(&records)?, token))
    }

    /// The most recent record.
    pub fn latest(&self) -> Result<T> {
        let query = CollectionQuery::new().limit(1).all_pages(false);
        let (records, _) = self.collection(&query)?;
        records.into_iter().next().ok_or(WhoopError::EmptyCollection)
    }
}

pub type CycleHandler<'a> = DataHandler<'a, Cycle>;
pub type SleepHandler<'a> = DataHandler<'a, Sleep>;
pub type RecoveryHandler<'a> = DataHandler<'a, Recovery>;
pub type WorkoutHandler<'a> = DataHandler<'a, Workout>;
