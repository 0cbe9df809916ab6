use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::extract::Listing;
use crate::scraper::SearchQuery;

/// Property to find comps for. Values are kept as raw JSON so they can be
/// echoed back exactly as sent.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ScrapeRequest {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub zip: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sqft: Option<Value>,
}

// A key that is present maps to Some, even when its value is null.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ScrapeRequest {
    /// Checks the required fields and builds the search query from them.
    pub fn validate(&self) -> Result<SearchQuery> {
        let required = [&self.zip, &self.bedrooms, &self.bathrooms, &self.sqft];
        if !required.into_iter().all(|field| matches!(field, Some(value) if is_truthy(value))) {
            return Err(AppError::ValidationError);
        }

        Ok(SearchQuery {
            zip: url_text(self.zip.as_ref()),
            bedrooms: url_text(self.bedrooms.as_ref()),
            bathrooms: url_text(self.bathrooms.as_ref()),
        })
    }
}

/// JavaScript truthiness for a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn url_text(value: Option<&Value>) -> String {
    value.map(js_string).unwrap_or_default()
}

/// String form of a JSON value under JavaScript's `String(value)`.
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                // f64 Display drops a zero fraction, like JS.
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        Value::String(s) => s.clone(),
        // Array.prototype.join renders null entries as empty strings.
        Value::Array(items) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { js_string(item) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub subject_property: ScrapeRequest,
    pub comps: Vec<Listing>,
    pub recommendation: String,
}

impl ScrapeResponse {
    pub fn new(subject_property: ScrapeRequest, zip: &str, comps: Vec<Listing>) -> Self {
        let recommendation = recommendation(comps.len(), zip);
        Self {
            subject_property,
            comps,
            recommendation,
        }
    }
}

// Rent figure stays a placeholder until an estimator is wired in.
pub fn recommendation(comp_count: usize, zip: &str) -> String {
    format!(
        "Based on {} comps in {}, a fair market rent is approximately $X/month.",
        comp_count, zip
    )
}
