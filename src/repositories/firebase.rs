use anyhow::{anyhow, bail};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};

use super::store::DocumentStore;

/// Realtime Database REST backend. Every record path maps to
/// `{base}/{path}.json`; increments use the server-side `.sv` sentinel and
/// conditional writes ride on ETags, so the atomicity guarantees match the
/// in-memory backend.
pub struct FirebaseStore {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(base_url: &str, auth: Option<String>) -> Result<Self, anyhow::Error> {
        if base_url.is_empty() {
            bail!("firebase_url is required for the firebase store backend");
        }
        Ok(FirebaseStore {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn read(&self, path: &str) -> Result<Value, anyhow::Error> {
        let response = self
            .with_auth(self.client.get(self.url(path)))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    fn to_children(value: Value, parent: &str) -> Result<Vec<(String, Value)>, anyhow::Error> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        let object = match value {
            Value::Object(object) => object,
            other => bail!("expected an object at {}, got {}", parent, other),
        };
        let mut children: Vec<(String, Value)> = object.into_iter().collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, anyhow::Error> {
        let value = self.read(path).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), anyhow::Error> {
        self.with_auth(self.client.put(self.url(path)).json(&value))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), anyhow::Error> {
        self.with_auth(self.client.patch(self.url(path)).json(&Value::Object(fields)))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn push(&self, parent: &str, value: Value) -> Result<String, anyhow::Error> {
        let response = self
            .with_auth(self.client.post(self.url(parent)).json(&value))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        body.get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("push to {} returned no generated key", parent))
    }

    async fn increment(&self, path: &str, field: &str, delta: i64) -> Result<i64, anyhow::Error> {
        let fields = json!({ field: { ".sv": { "increment": delta } } });
        self.with_auth(self.client.patch(self.url(path)).json(&fields))
            .send()
            .await?
            .error_for_status()?;

        // The increment itself is applied atomically server-side; this read
        // only recovers the resulting value for the caller.
        let value = self.read(&format!("{path}/{field}")).await?;
        Ok(value.as_i64().unwrap_or(0))
    }

    async fn set_if_absent(
        &self,
        path: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, anyhow::Error> {
        let field_path = format!("{path}/{field}");
        let response = self
            .with_auth(self.client.get(self.url(&field_path)))
            .header("X-Firebase-ETag", "true")
            .send()
            .await?
            .error_for_status()?;
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| anyhow!("store returned no ETag for {}", field_path))?
            .to_string();
        let current: Value = response.json().await?;
        if !current.is_null() {
            return Ok(false);
        }

        let put = self
            .with_auth(self.client.put(self.url(&field_path)).json(&value))
            .header(header::IF_MATCH, etag)
            .send()
            .await?;
        if put.status() == StatusCode::PRECONDITION_FAILED {
            // A concurrent writer got there first.
            return Ok(false);
        }
        put.error_for_status()?;
        Ok(true)
    }

    async fn list(&self, parent: &str) -> Result<Vec<(String, Value)>, anyhow::Error> {
        let value = self.read(parent).await?;
        Self::to_children(value, parent)
    }

    async fn query_equal(
        &self,
        parent: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>, anyhow::Error> {
        let response = self
            .with_auth(self.client.get(self.url(parent)))
            .query(&[
                ("orderBy", format!("\"{field}\"")),
                ("equalTo", format!("\"{value}\"")),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        Self::to_children(body, parent)
    }
}
