use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

use crate::error::LocalizeResult;
use crate::settings::Settings;

mod google;
mod libretranslate;
mod retry;

pub use google::GoogleTranslate;
pub use libretranslate::LibreTranslate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    LibreTranslate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::LibreTranslate => "libretranslate",
        }
    }
}

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = LocalizeResult<String>> + Send + 'a>>;

/// A translation service: `(text, source, target) -> text`.
///
/// A source of `auto` means "let the service detect it".
pub trait TextTranslator: Send + Sync {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    ) -> TranslateFuture<'a>;
}

#[derive(Debug, Clone)]
pub enum TranslatorImpl {
    Google(GoogleTranslate),
    LibreTranslate(LibreTranslate),
}

impl TextTranslator for TranslatorImpl {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    ) -> TranslateFuture<'a> {
        match self {
            TranslatorImpl::Google(provider) => provider.translate(text, source_lang, target_lang),
            TranslatorImpl::LibreTranslate(provider) => {
                provider.translate(text, source_lang, target_lang)
            }
        }
    }
}

pub fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name.trim().to_lowercase().as_str() {
        "google" | "gtx" => Some(ProviderKind::Google),
        "libretranslate" | "libre" => Some(ProviderKind::LibreTranslate),
        _ => None,
    }
}

pub fn build_translator(settings: &Settings) -> Result<TranslatorImpl> {
    let kind = provider_from_name(&settings.translate_provider).ok_or_else(|| {
        anyhow!(
            "unknown translate provider '{}' (expected google or libretranslate)",
            settings.translate_provider
        )
    })?;
    match kind {
        ProviderKind::Google => {
            let mut provider = GoogleTranslate::new()?;
            if let Some(endpoint) = &settings.translate_endpoint {
                provider = provider.with_base_url(endpoint.clone());
            }
            Ok(TranslatorImpl::Google(provider))
        }
        ProviderKind::LibreTranslate => Ok(TranslatorImpl::LibreTranslate(LibreTranslate::new(
            settings.translate_endpoint.clone(),
            settings.translate_api_key.clone(),
        )?)),
    }
}

/// Translates `text`, falling back to the input on any failure.
///
/// Never fails: errors are logged and pushed onto `diagnostics`.
pub async fn translate_or_keep(
    translator: &dyn TextTranslator,
    text: &str,
    source_lang: &str,
    target_lang: &str,
    diagnostics: &mut Vec<String>,
) -> String {
    match translator.translate(text, source_lang, target_lang).await {
        Ok(translated) => translated,
        Err(err) => {
            warn!(error = %err, "translation failed; keeping source text");
            diagnostics.push(err.to_string());
            text.to_string()
        }
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .with_context(|| "failed to build HTTP client")
}
