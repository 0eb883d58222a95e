//! Google Sheets API client
//!
//! Talks to the Sheets v4 values API with a service account. Access tokens
//! are minted from an RS256-signed JWT assertion and cached until shortly
//! before they expire.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{quote_sheet_name, CellRef, CellUpdate, LedgerStore};
use crate::config::SheetsConfig;
use crate::error::{AppError, AppResult};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Refresh this long before the token's stated expiry
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Google Sheets API client
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    token_uri: String,
    service_account_email: String,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Service account JWT assertion claims
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody {
    range: String,
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateBody {
    value_input_option: &'static str,
    data: Vec<ValueRangeBody>,
}

impl GoogleSheetsClient {
    /// Create a new client from configuration
    pub fn new(config: &SheetsConfig) -> AppResult<Self> {
        if config.spreadsheet_id.is_empty() {
            return Err(AppError::Configuration(
                "sheets.spreadsheet_id is required for the google backend".to_string(),
            ));
        }

        // Keys pasted into env vars usually carry literal "\n" sequences
        let pem = config.private_key.replace("\\n", "\n");
        let signing_key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            AppError::Configuration(format!("invalid service account private key: {}", e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            token_uri: config.token_uri.clone(),
            service_account_email: config.service_account_email.clone(),
            signing_key,
            token: Mutex::new(None),
        })
    }

    /// Return a cached access token or mint a new one
    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.service_account_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            exp: now + 3600,
            iat: now,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| AppError::Configuration(format!("failed to sign assertion: {}", e)))?;

        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Service account token exchange failed");
            return Err(AppError::Ledger(format!("token exchange failed with {}", status)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Ledger(format!("invalid token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "Minted Sheets access token");

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    /// Build `{base}/spreadsheets/{id}/values/{range}{suffix}` with the
    /// range percent-encoded as one path segment
    fn values_url(&self, range: &str, suffix: &str) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}/spreadsheets", self.base_url))
            .map_err(|e| AppError::Configuration(format!("invalid sheets.api_base_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Configuration("sheets.api_base_url cannot be a base".into()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    fn batch_update_url(&self) -> AppResult<Url> {
        let mut url = Url::parse(&format!("{}/spreadsheets", self.base_url))
            .map_err(|e| AppError::Configuration(format!("invalid sheets.api_base_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Configuration("sheets.api_base_url cannot be a base".into()))?
            .push(&self.spreadsheet_id)
            .push("values:batchUpdate");
        Ok(url)
    }

    /// Map a non-success response to a ledger error
    async fn check_response(
        operation: &str,
        response: reqwest::Response,
    ) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(operation, %status, body = %body, "Sheets API request failed");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::LedgerQuota);
        }
        Err(AppError::Ledger(format!("{} failed with {}", operation, status)))
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerStore for GoogleSheetsClient {
    async fn read_rows(&self, sheet: &str) -> AppResult<Vec<Vec<String>>> {
        let token = self.access_token().await?;
        let mut url = self.values_url(&quote_sheet_name(sheet), "")?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "FORMATTED_VALUE");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("read {} failed: {}", sheet, e)))?;
        let response = Self::check_response("read_rows", response).await?;

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| AppError::Ledger(format!("invalid values response: {}", e)))?;

        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn write_cell(&self, cell: &CellRef, value: &str) -> AppResult<()> {
        let token = self.access_token().await?;
        let range = cell.to_a1();
        let mut url = self.values_url(&range, "")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values: vec![vec![value.to_string()]],
        };

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("write {} failed: {}", body.range, e)))?;
        Self::check_response("write_cell", response).await?;
        Ok(())
    }

    async fn batch_write(&self, updates: &[CellUpdate]) -> AppResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let token = self.access_token().await?;

        let body = BatchUpdateBody {
            value_input_option: "USER_ENTERED",
            data: updates
                .iter()
                .map(|u| ValueRangeBody {
                    range: u.cell.to_a1(),
                    major_dimension: "ROWS",
                    values: vec![vec![u.value.clone()]],
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.batch_update_url()?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("batch write failed: {}", e)))?;
        Self::check_response("batch_write", response).await?;
        Ok(())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> AppResult<()> {
        let token = self.access_token().await?;
        let range = quote_sheet_name(sheet);
        let mut url = self.values_url(&range, ":append")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values: vec![row],
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("append to {} failed: {}", sheet, e)))?;
        Self::check_response("append_row", response).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "google"
    }
}
