//! The external translation tier.

use std::future::Future;

use thiserror::Error;

/// A translated string, with the service's confidence when it reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
  pub text:    String,
  /// In `0.0..=1.0`. `None` when the service does not score its output.
  pub quality: Option<f64>,
}

/// Failures of the translation tier. None of them are surfaced to callers of
/// the generator; they only cause a fall-through to the next tier.
#[derive(Debug, Error)]
pub enum TranslateError {
  #[error("translation service unavailable: {0}")]
  Unavailable(String),

  #[error("translation service is rate limiting")]
  RateLimited,

  #[error("translation timed out")]
  Timeout,
}

/// A source-language → English translation service.
pub trait Translator: Send + Sync {
  fn translate<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Translation, TranslateError>> + Send + 'a;
}

/// No translation configured: every request is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslator;

impl Translator for NoTranslator {
  async fn translate(&self, _text: &str) -> Result<Translation, TranslateError> {
    Err(TranslateError::Unavailable("no translator configured".into()))
  }
}

impl<T: Translator> Translator for Option<T> {
  async fn translate(&self, text: &str) -> Result<Translation, TranslateError> {
    match self {
      Some(t) => t.translate(text).await,
      None => NoTranslator.translate(text).await,
    }
  }
}

/// Score an unscored translation: the share of ASCII word characters in the
/// output. An empty output or an echo of the source scores zero.
pub fn estimate_quality(source: &str, output: &str) -> f64 {
  let output = output.trim();
  if output.is_empty() || output == source.trim() {
    return 0.0;
  }
  let letters: Vec<char> = output.chars().filter(|c| c.is_alphanumeric()).collect();
  if letters.is_empty() {
    return 0.0;
  }
  let ascii = letters.iter().filter(|c| c.is_ascii_alphanumeric()).count();
  ascii as f64 / letters.len() as f64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn echo_scores_zero() {
    assert_eq!(estimate_quality("ชื่อ", "ชื่อ"), 0.0);
    assert_eq!(estimate_quality("ชื่อ", "  "), 0.0);
  }

  #[test]
  fn english_output_scores_high() {
    assert_eq!(estimate_quality("ชื่อ", "name"), 1.0);
  }

  #[test]
  fn mixed_output_scores_partially() {
    let q = estimate_quality("ชื่อเล่น", "nick ชื่อ");
    assert!(q > 0.0 && q < 1.0);
  }

  #[tokio::test]
  async fn missing_translator_is_unavailable() {
    let none: Option<NoTranslator> = None;
    assert!(matches!(none.translate("x").await, Err(TranslateError::Unavailable(_))));
  }
}
