use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Primary key of a client row. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidClientId {
    pub raw: String,
}

impl std::fmt::Display for InvalidClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client id must be a positive integer (got `{}`)", self.raw)
    }
}

impl std::error::Error for InvalidClientId {}

impl ClientId {
    pub fn new(value: i64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    /// Parses a path segment. Only plain ASCII digits are accepted, so signs,
    /// whitespace and exponent forms are rejected rather than coerced.
    pub fn parse(raw: &str) -> Result<Self, InvalidClientId> {
        let invalid = || InvalidClientId {
            raw: raw.chars().take(32).collect(),
        };

        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        raw.parse::<i64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(invalid)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub description: Option<String>,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkEntry {
    pub id: i64,
    pub client_id: ClientId,
    pub user_email: String,
    pub hours: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportClient {
    pub id: ClientId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: i64,
    pub hours: Decimal,
    pub description: Option<String>,
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&WorkEntry> for ReportEntry {
    fn from(entry: &WorkEntry) -> Self {
        Self {
            id: entry.id,
            hours: entry.hours,
            description: entry.description.clone(),
            date: format_date(entry.date),
            created_at: format_timestamp(entry.created_at),
            updated_at: format_timestamp(entry.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub client: ReportClient,
    pub work_entries: Vec<ReportEntry>,
    pub total_hours: Decimal,
    pub entry_count: usize,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hours as shown in exports: always two fractional digits.
pub fn format_hours(hours: Decimal) -> String {
    format!("{:.2}", hours.round_dp(2))
}
