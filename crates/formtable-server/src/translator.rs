//! [`HttpTranslator`]: the translation tier backed by a LibreTranslate-style
//! HTTP service (`POST {url}/translate`).

use std::time::Duration;

use formtable_ident::{TranslateError, Translation, Translator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::settings::TranslatorConfig;

#[derive(Serialize)]
struct TranslateRequest<'a> {
  q:       &'a str,
  source:  &'a str,
  target:  &'static str,
  format:  &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
  translated_text: String,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpTranslator {
  client: Client,
  config: TranslatorConfig,
}

impl HttpTranslator {
  pub fn new(config: TranslatorConfig) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_millis(config.timeout_ms))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self) -> String { format!("{}/translate", self.config.url.trim_end_matches('/')) }
}

fn classify(err: reqwest::Error) -> TranslateError {
  if err.is_timeout() {
    TranslateError::Timeout
  } else {
    TranslateError::Unavailable(err.to_string())
  }
}

impl Translator for HttpTranslator {
  async fn translate(&self, text: &str) -> Result<Translation, TranslateError> {
    let body = TranslateRequest {
      q:       text,
      source:  &self.config.source,
      target:  "en",
      format:  "text",
      api_key: self.config.api_key.as_deref(),
    };
    let resp = self.client.post(self.url()).json(&body).send().await.map_err(classify)?;

    match resp.status() {
      StatusCode::TOO_MANY_REQUESTS => return Err(TranslateError::RateLimited),
      status if !status.is_success() => {
        return Err(TranslateError::Unavailable(format!("translate → {status}")));
      }
      _ => {}
    }

    let parsed: TranslateResponse = resp.json().await.map_err(classify)?;
    // The service does not score its output; the generator estimates.
    Ok(Translation { text: parsed.translated_text, quality: None })
  }
}

#[cfg(test)]
mod tests {
  use axum::{Json, Router, http::StatusCode as Status, routing::post};
  use serde_json::{Value, json};
  use tokio::net::TcpListener;

  use super::*;

  async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
  }

  fn translator(url: String, timeout_ms: u64) -> HttpTranslator {
    HttpTranslator::new(TranslatorConfig { url, source: "th".into(), api_key: None, timeout_ms })
      .unwrap()
  }

  #[tokio::test]
  async fn returns_translated_text() {
    let app = Router::new().route(
      "/translate",
      post(|Json(body): Json<Value>| async move {
        assert_eq!(body["source"], "th");
        assert_eq!(body["target"], "en");
        Json(json!({ "translatedText": format!("name of {}", body["q"].as_str().unwrap_or_default()) }))
      }),
    );
    let url = serve(app).await;
    let out = translator(url, 2_000).translate("ชื่อ").await.unwrap();
    assert_eq!(out.text, "name of ชื่อ");
    assert_eq!(out.quality, None);
  }

  #[tokio::test]
  async fn rate_limit_and_server_errors_are_classified() {
    let app = Router::new()
      .route("/limited/translate", post(|| async { Status::TOO_MANY_REQUESTS }))
      .route("/broken/translate", post(|| async { Status::INTERNAL_SERVER_ERROR }));
    let url = serve(app).await;

    let limited = translator(format!("{url}/limited"), 2_000).translate("x").await;
    assert!(matches!(limited, Err(TranslateError::RateLimited)));
    let broken = translator(format!("{url}/broken/"), 2_000).translate("x").await;
    assert!(matches!(broken, Err(TranslateError::Unavailable(_))));
  }

  #[tokio::test]
  async fn slow_service_times_out() {
    let app = Router::new().route(
      "/translate",
      post(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({ "translatedText": "late" }))
      }),
    );
    let url = serve(app).await;
    let result = translator(url, 50).translate("x").await;
    assert!(matches!(result, Err(TranslateError::Timeout)));
  }
}
