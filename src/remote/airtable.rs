// toolsync/src/remote/airtable.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{RemoteRecord, RemoteStore};
use crate::config::RemoteConfig;
use crate::errors::{AppError, Result};
use crate::mapping::FieldMap;

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<RemoteRecord>,
    offset: Option<String>,
}

/// REST client for one Airtable table.
#[derive(Debug, Clone)]
pub struct AirtableClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl AirtableClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let endpoint = table_endpoint(&config.api_url, &config.base_id, &config.table_name)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("toolsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn record_url(&self, record_id: &str) -> Result<Url> {
        let mut target = self.endpoint.clone();
        target
            .path_segments_mut()
            .map_err(|_| AppError::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(record_id);
        Ok(target)
    }
}

/// `{api_url}/v0/{base_id}/{table_name}` with each segment percent-encoded.
pub fn table_endpoint(api_url: &str, base_id: &str, table_name: &str) -> Result<Url> {
    let mut endpoint = Url::parse(api_url)?;
    endpoint
        .path_segments_mut()
        .map_err(|_| AppError::UrlParse(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(["v0", base_id, table_name]);
    Ok(endpoint)
}

/// Equality formula for `filterByFormula`, quoting `value` as a string literal.
pub fn filter_formula(field_name: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{{}}} = '{}'", field_name, escaped)
}

async fn expect_ok(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::RemoteStatus {
        operation,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for AirtableClient {
    async fn find(&self, field_name: &str, value: &str) -> Result<Vec<RemoteRecord>> {
        let formula = filter_formula(field_name, value);
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut url = self.endpoint.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("filterByFormula", &formula);
                if let Some(offset) = &offset {
                    query.append_pair("offset", offset);
                }
            }

            debug!("GET {}", url);
            let response = self.http.get(url).bearer_auth(&self.api_key).send().await?;
            let page: RecordPage = expect_ok(response, "lookup").await?.json().await?;
            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn create(&self, fields: &FieldMap) -> Result<()> {
        let body = json!({ "records": [{ "fields": fields }] });
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        expect_ok(response, "create").await?;
        Ok(())
    }

    async fn update(&self, record_id: &str, fields: &FieldMap) -> Result<()> {
        let body = json!({ "fields": fields });
        let response = self
            .http
            .patch(self.record_url(record_id)?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        expect_ok(response, "update").await?;
        Ok(())
    }
}
