use anyhow::{Result, anyhow};
use serde_json::Value;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{TextTranslator, TranslateFuture, http_client};
use crate::error::ErrorKind;
use crate::languages;

const BASE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Public Google Translate web endpoint (`client=gtx`), no key required.
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslate {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.trim().is_empty() {
            self.base_url = url;
        }
        self
    }

    async fn request(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let query = build_query(text, source_lang, target_lang);
        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .get(&self.base_url)
                .query(&query)
                .send()
                .await?;
            let status = response.status();
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translation(&body);
            }
            if is_rate_limited(status, &body) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("Google Translate", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!("Google Translate error ({}): {}", status, body.trim()));
        }
    }
}

impl TextTranslator for GoogleTranslate {
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

fn build_query(text: &str, source_lang: &str, target_lang: &str) -> Vec<(&'static str, String)> {
    let mut query = vec![("client", "gtx".to_string())];
    if !languages::is_auto(source_lang) {
        query.push(("sl", source_lang.trim().to_string()));
    }
    query.push(("tl", target_lang.trim().to_string()));
    query.push(("dt", "t".to_string()));
    query.push(("q", text.to_string()));
    query
}

/// The endpoint answers with nested arrays; sentence chunks live at `[0][i][0]`.
fn extract_translation(body: &str) -> Result<String> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse Google Translate response: {}", err))?;
    let chunks = payload
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Google Translate response has no sentences"))?;
    let translated = chunks
        .iter()
        .filter_map(|chunk| chunk.get(0).and_then(Value::as_str))
        .collect::<String>();
    if translated.trim().is_empty() {
        return Err(anyhow!("Google Translate returned an empty translation"));
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_source_is_omitted() {
        let query = build_query("hi", "auto", "ar");
        assert!(query.iter().all(|(key, _)| *key != "sl"));
        let query = build_query("hi", "en", "ar");
        assert!(query.contains(&("sl", "en".to_string())));
        assert!(query.contains(&("tl", "ar".to_string())));
    }

    #[test]
    fn joins_sentence_chunks() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/google_translate_response.json"
        ));
        let translated = extract_translation(payload).unwrap();
        insta::assert_snapshot!(translated, @"Wait! Where are you going? I told you to stay.");
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(extract_translation("{}").is_err());
        assert!(extract_translation("[[],null,\"en\"]").is_err());
    }
}
