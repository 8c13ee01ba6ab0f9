//! Blocking HTTP client for a Usergrid-style REST API
//!
//! Endpoints used:
//! - `POST {api}/management/token` for a client-credentials bearer token
//! - `GET {api}/management/organizations/{org}/applications`
//! - `GET {api}/{org}/{app}` for collection metadata
//! - `GET {api}/{org}/{app}/{collection}?ql=&limit=&cursor=`
//! - `PUT {api}/{org}/{app}/{collection}/{key}` to create an entity

use super::{CollectionRef, Credentials, Page, Record, StoreClient};
use crate::config::EndpointConfig;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest response body echoed into an error
const MAX_ERROR_BODY: usize = 200;

/// Error envelope returned by the store on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: Vec<Value>,
    #[serde(default)]
    cursor: Option<String>,
}

/// REST implementation of [`StoreClient`]
pub struct RestStore {
    api_url: String,
    client: Client,
    token: RwLock<Option<String>>,
}

impl fmt::Debug for RestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStore")
            .field("api_url", &self.api_url)
            .field("token", &self.token.read().as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RestStore {
    /// Build a client for an endpoint
    pub fn new(endpoint: &EndpointConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("usergrid-migrate/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport {
                url: endpoint.api_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            api_url: endpoint.api_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint_url(&self.api_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn request_json(&self, url: &str, request: RequestBuilder) -> StoreResult<Value> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|e| StoreError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| StoreError::Transport {
            url: url.to_string(),
            reason: format!("failed to read response: {e}"),
        })?;

        if !status.is_success() {
            return Err(api_error(url, status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Malformed {
            url: url.to_string(),
            reason: format!("invalid JSON: {e}"),
        })
    }
}

impl StoreClient for RestStore {
    fn authenticate(&self, credentials: &Credentials) -> StoreResult<()> {
        let url = self.endpoint("management/token");
        let request = self.client.post(&url).json(&json!({
            "grant_type": "client_credentials",
            "client_id": credentials.client_id,
            "client_secret": credentials.client_secret,
        }));

        // Authentication never reuses an older token
        let response = request.send().map_err(|e| StoreError::AuthFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().map_err(|e| StoreError::AuthFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(StoreError::AuthFailed {
                reason: api_error(&url, status.as_u16(), &body).to_string(),
                url,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| StoreError::AuthFailed {
                url: url.clone(),
                reason: format!("token response missing access_token: {e}"),
            })?;

        *self.token.write() = Some(token.access_token);
        debug!(url = %self.api_url, client_id = %credentials.client_id, "Authenticated");
        Ok(())
    }

    fn list_applications(&self, org: &str) -> StoreResult<Vec<String>> {
        let url = self.endpoint(&format!("management/organizations/{org}/applications"));
        let body = self.request_json(&url, self.client.get(&url))?;
        parse_applications(&url, org, &body)
    }

    fn list_collections(&self, org: &str, app: &str) -> StoreResult<Vec<String>> {
        let url = self.endpoint(&format!("{org}/{app}"));
        let body = self.request_json(&url, self.client.get(&url))?;
        parse_collections(&url, &body)
    }

    fn fetch_page(
        &self,
        collection: &CollectionRef,
        ql: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page> {
        let url = self.endpoint(&collection.path());

        let mut params = vec![("ql", ql.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let body = self.request_json(&url, self.client.get(&url).query(&params))?;
        parse_page(&url, body)
    }

    fn create_entity(&self, collection: &CollectionRef, record: &Record) -> StoreResult<()> {
        let collection_url = self.endpoint(&collection.path());

        let (url, builder) = match record.natural_key() {
            Some(key) => {
                let url = entity_url(&collection_url, key)?;
                (url.to_string(), self.client.put(url))
            }
            None => (collection_url.clone(), self.client.post(&collection_url)),
        };

        self.request_json(&url, builder.json(record))?;
        Ok(())
    }
}

/// Append the entity key as a single, percent-encoded path segment
fn entity_url(collection_url: &str, key: &str) -> StoreResult<Url> {
    let mut url = Url::parse(collection_url).map_err(|e| StoreError::Malformed {
        url: collection_url.to_string(),
        reason: format!("invalid URL: {e}"),
    })?;

    url.path_segments_mut()
        .map_err(|_| StoreError::Malformed {
            url: collection_url.to_string(),
            reason: "URL cannot carry a path".into(),
        })?
        .push(key);

    Ok(url)
}

fn endpoint_url(api_url: &str, path: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');
    format!("{base}/{suffix}")
}

fn api_error(url: &str, status: u16, body: &str) -> StoreError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.error.is_empty() => StoreError::Api {
            url: url.to_string(),
            status,
            error: parsed.error,
            description: parsed.error_description,
        },
        _ => StoreError::Api {
            url: url.to_string(),
            status,
            error: "http_error".into(),
            description: truncate_for_error(body),
        },
    }
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        format!("{}...", body.chars().take(MAX_ERROR_BODY).collect::<String>())
    }
}

/// `data` is a map of `org/app` to application uuid
fn parse_applications(url: &str, org: &str, body: &Value) -> StoreResult<Vec<String>> {
    let data = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Malformed {
            url: url.to_string(),
            reason: "missing 'data' object".into(),
        })?;

    let prefix = format!("{org}/");
    Ok(data
        .keys()
        .map(|qualified| {
            qualified
                .strip_prefix(&prefix)
                .unwrap_or(qualified)
                .to_string()
        })
        .collect())
}

/// Collection names live under `entities[0].metadata.collections`
fn parse_collections(url: &str, body: &Value) -> StoreResult<Vec<String>> {
    let collections = body
        .get("entities")
        .and_then(|e| e.get(0))
        .and_then(|app| app.get("metadata"))
        .and_then(|m| m.get("collections"))
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Malformed {
            url: url.to_string(),
            reason: "missing 'entities[0].metadata.collections'".into(),
        })?;

    Ok(collections.keys().cloned().collect())
}

fn parse_page(url: &str, body: Value) -> StoreResult<Page> {
    let response: EntitiesResponse =
        serde_json::from_value(body).map_err(|e| StoreError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let records = response
        .entities
        .into_iter()
        .filter_map(Record::from_value)
        .collect();

    Ok(Page {
        records,
        cursor: response.cursor.filter(|c| !c.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        assert_eq!(
            endpoint_url("http://api.local/", "/management/token"),
            "http://api.local/management/token"
        );
        assert_eq!(endpoint_url("http://api.local", "red/shop"), "http://api.local/red/shop");
    }

    #[test]
    fn test_parse_applications_strips_org_prefix() {
        let body = json!({"data": {"red/shop": "uuid-1", "red/blog": "uuid-2"}});
        let apps = parse_applications("u", "red", &body).unwrap();
        assert_eq!(apps, vec!["shop", "blog"]);

        assert!(parse_applications("u", "red", &json!({})).is_err());
    }

    #[test]
    fn test_parse_collections() {
        let body = json!({
            "entities": [{
                "metadata": {
                    "collections": {
                        "users": {"count": 3},
                        "events": {"count": 5}
                    }
                }
            }]
        });
        let names = parse_collections("u", &body).unwrap();
        assert_eq!(names, vec!["users", "events"]);
    }

    #[test]
    fn test_parse_page() {
        let body = json!({
            "entities": [{"uuid": "u-1", "name": "alice"}, "not-an-object"],
            "cursor": "abc"
        });
        let page = parse_page("u", body).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.cursor.as_deref(), Some("abc"));

        let last = parse_page("u", json!({"entities": [], "cursor": ""})).unwrap();
        assert!(last.cursor.is_none());
    }

    #[test]
    fn test_api_error_body() {
        let err = api_error(
            "u",
            400,
            r#"{"error":"duplicate_unique_property_exists","error_description":"name taken"}"#,
        );
        match err {
            StoreError::Api { status, error, description, .. } => {
                assert_eq!(status, 400);
                assert_eq!(error, "duplicate_unique_property_exists");
                assert_eq!(description, "name taken");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let long_body = "x".repeat(500);
        match api_error("u", 502, &long_body) {
            StoreError::Api { description, .. } => {
                assert!(description.ends_with("..."));
                assert_eq!(description.len(), MAX_ERROR_BODY + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_entity_url_encodes_key() {
        let url = entity_url("http://api.local/red/shop/users", "a b/c").unwrap();
        assert_eq!(url.as_str(), "http://api.local/red/shop/users/a%20b%2Fc");
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let endpoint = EndpointConfig::new("http://api.local/");
        let store = RestStore::new(&endpoint).unwrap();
        assert_eq!(store.api_url(), "http://api.local");
    }
}
