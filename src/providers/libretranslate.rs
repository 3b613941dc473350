use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{TextTranslator, TranslateFuture, http_client};
use crate::error::ErrorKind;
use crate::languages;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://libretranslate.com";

#[derive(Debug, Clone)]
pub struct LibreTranslate {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LibreTranslate {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Result<Self> {
        let endpoint = endpoint
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn request(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let url = format!("{}/translate", self.endpoint);
        let source = if languages::is_auto(source_lang) {
            "auto"
        } else {
            source_lang.trim()
        };
        let mut body = json!({
            "q": text,
            "source": source,
            "target": target_lang.trim(),
            "format": "text",
        });
        if let Some(key) = &self.api_key {
            body["api_key"] = json!(key);
        }

        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self.client.post(&url).json(&body).send().await?;
            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translation(&text);
            }
            if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("LibreTranslate", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!(
                "LibreTranslate error ({}): {}",
                status,
                extract_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl TextTranslator for LibreTranslate {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    ) -> TranslateFuture<'a> {
        Box::pin(async move {
            self.request(text, source_lang, target_lang)
                .await
                .map_err(|err| ErrorKind::TranslationFailure(format!("{:#}", err)))
        })
    }
}

#[derive(Debug, Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

fn extract_translation(body: &str) -> Result<String> {
    let payload: LibreResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse LibreTranslate response: {}", err))?;
    Ok(payload.translated_text)
}

fn extract_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()?
        .error
        .filter(|message| !message.trim().is_empty())
}
