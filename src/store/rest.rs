//! Implements the `ExpenseStore` trait against the hosted backend's REST API.
//!
//! The dialect is the PostgREST one the backend exposes over the `expenses`
//! table: column filters as `column=op.value` query parameters, an `apikey`
//! header plus a bearer token, and JSON rows. Realtime push is a separate
//! concern; pair this store with [`PollFeed`] when the deployment has no
//! realtime channel.
//!
//! [`PollFeed`]: crate::store::PollFeed

use crate::model::{Amount, Category, Expense, Payment, Period};
use crate::session::Identity;
use crate::store::ExpenseStore;
use crate::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;
use uuid::Uuid;

const EXPENSES_PATH: &str = "rest/v1/expenses";

/// Wire shape of one row of the `expenses` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExpenseRow {
    id: Uuid,
    owner: String,
    date: DateTime<Utc>,
    category: Category,
    amount: Amount,
    payment: Payment,
    #[serde(default)]
    notes: Option<String>,
}

impl ExpenseRow {
    fn new(owner: &Identity, expense: &Expense) -> Self {
        Self {
            id: expense.id,
            owner: owner.as_str().to_string(),
            date: expense.date,
            category: expense.category,
            amount: expense.amount,
            payment: expense.payment,
            notes: Some(expense.notes.clone()),
        }
    }
}

impl From<ExpenseRow> for Expense {
    fn from(row: ExpenseRow) -> Self {
        Expense {
            id: row.id,
            date: row.date,
            category: row.category,
            amount: row.amount,
            payment: row.payment,
            notes: row.notes.unwrap_or_default(),
        }
    }
}

/// An implementation of [`ExpenseStore`] that talks to the hosted backend.
pub struct RestStore {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    bearer: String,
}

impl RestStore {
    /// Creates a store for the project at `base_url` using `api_key` for both
    /// the `apikey` header and the bearer token.
    pub fn new(base_url: &Url, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = base_url
            .join(EXPENSES_PATH)
            .map_err(|e| StoreError::Connection(format!("invalid project URL: {e}")))?;
        let api_key = api_key.into();
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            bearer: api_key.clone(),
            api_key,
        })
    }

    /// Replaces the bearer token with a signed-in user's access token so the
    /// backend's row-level authorization applies.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer = token.into();
        self
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }
}

/// Query parameters selecting `owner`'s rows inside the period window,
/// newest first.
fn range_query(owner: &Identity, period: Period) -> [(String, String); 5] {
    [
        ("select".to_string(), "*".to_string()),
        ("owner".to_string(), format!("eq.{owner}")),
        (
            "date".to_string(),
            format!("gte.{}", period.start().to_rfc3339()),
        ),
        (
            "date".to_string(),
            format!("lt.{}", period.end().to_rfc3339()),
        ),
        ("order".to_string(), "date.desc".to_string()),
    ]
}

/// Maps a non-success response to `StoreError::Rejected`, carrying whatever
/// the backend put in the body.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".to_string());
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl ExpenseStore for RestStore {
    async fn list_by_period(&self, owner: &Identity, period: Period) -> Result<Vec<Expense>> {
        trace!("list_by_period for {period}");
        let response = self
            .request(reqwest::Method::GET)
            .query(&range_query(owner, period))
            .send()
            .await?;
        let rows: Vec<ExpenseRow> = check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }

    async fn insert(&self, owner: &Identity, expense: &Expense) -> Result<()> {
        trace!("insert {}", expense.id);
        let row = ExpenseRow::new(owner, expense);
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, owner: &Identity, id: Uuid) -> Result<()> {
        trace!("delete {id}");
        let response = self
            .request(reqwest::Method::DELETE)
            .query(&[
                ("owner", format!("eq.{owner}")),
                ("id", format!("eq.{id}")),
            ])
            .send()
            .await?;
        // A delete that matched no rows still returns success, which is the
        // contract: missing is not distinguished from deleted.
        check(response).await?;
        Ok(())
    }
}
