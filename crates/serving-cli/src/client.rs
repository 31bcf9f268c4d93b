//! HTTP client for the featurizer and predictor APIs

use anyhow::{bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serving_lib::ErrorResponse;
use url::Url;

/// Client bound to one service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// POST form-encoded arguments
    pub async fn post_form<T: DeserializeOwned>(&self, path: &str, args: &[(&str, &str)]) -> Result<T> {
        let request = self.client.post(self.url(path)?).form(args);
        self.send(request).await
    }

    /// PUT form-encoded arguments
    pub async fn put_form<T: DeserializeOwned>(&self, path: &str, args: &[(&str, &str)]) -> Result<T> {
        let request = self.client.put(self.url(path)?).form(args);
        self.send(request).await
    }

    /// GET with query arguments
    pub async fn get_query<T: DeserializeOwned>(&self, path: &str, args: &[(&str, &str)]) -> Result<T> {
        let request = self.client.get(self.url(path)?).query(args);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => bail!("API error ({}): [{}] {}", status, err.status, err.message),
                Err(_) => bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serving_lib::ModelReadResponse;

    #[tokio::test]
    async fn test_get_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/model")
            .match_query(mockito::Matcher::UrlEncoded("model".into(), "clf".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"record": "{\"name\":\"clf\"}", "model": "clf"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response: ModelReadResponse = client.get_query("model", &[("model", "clf")]).await.unwrap();

        assert_eq!(response.model, "clf");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_coded_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "402", "message": "No configuration for model `m`"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post_form::<serde_json::Value>("predict", &[("model", "m")])
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("[402]"));
        assert!(message.contains("No configuration"));
    }

    #[tokio::test]
    async fn test_form_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/model")
            .match_body(mockito::Matcher::UrlEncoded(
                "model".into(),
                r#"{"name":"clf"}"#.into(),
            ))
            .with_status(200)
            .with_body(r#"{"id": [3], "model": "{\"name\":\"clf\"}"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response: serving_lib::ModelWriteResponse = client
            .put_form("model", &[("model", r#"{"name":"clf"}"#)])
            .await
            .unwrap();

        assert_eq!(response.id.to_vec(), vec![3]);
        mock.assert_async().await;
    }
}
