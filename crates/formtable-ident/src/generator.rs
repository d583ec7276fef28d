//! Tiered identifier generation.

use std::{collections::HashSet, sync::Arc, time::Duration};

use formtable_core::{Error, Identifier, Result, identifier::MAX_LEN};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  cache::TranslationCache,
  dictionary,
  slug::{sanitize, slugify, truncate},
  translate::{Translator, estimate_quality},
  translit::looks_transliterated,
};

// ─── Context ─────────────────────────────────────────────────────────────────

/// What kind of thing is being named. Passed to the translator as a
/// disambiguation hint and used as the prefix of hash-based names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameContext {
  Form,
  #[default]
  Field,
  Section,
  Action,
  General,
}

impl NameContext {
  pub fn hint(self) -> &'static str {
    match self {
      Self::Form => "form",
      Self::Field => "field",
      Self::Section => "section",
      Self::Action => "action",
      Self::General => "general",
    }
  }

  pub fn prefix(self) -> &'static str {
    match self {
      Self::General => "col",
      other => other.hint(),
    }
  }
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
  /// Translations scoring below this are discarded.
  pub min_quality:          f64,
  pub translate_timeout_ms: u64,
  pub cache_ttl_secs:       u64,
}

impl Default for IdentifierConfig {
  fn default() -> Self {
    Self { min_quality: 0.5, translate_timeout_ms: 3_000, cache_ttl_secs: 24 * 60 * 60 }
  }
}

impl IdentifierConfig {
  pub fn translate_timeout(&self) -> Duration { Duration::from_millis(self.translate_timeout_ms) }

  pub fn cache_ttl(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.cache_ttl_secs.min(i64::MAX as u64) as i64)
  }
}

// ─── Generator ───────────────────────────────────────────────────────────────

/// Collision suffixes tried before falling back to a long hash name.
const MAX_SUFFIX_ATTEMPTS: u32 = 32;

/// Which tier produced a name. Logged, and useful in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
  Ascii,
  Cache,
  Translation,
  Dictionary,
  Hash,
}

pub struct IdentifierGenerator<T> {
  translator: T,
  cache:      Arc<dyn TranslationCache>,
  config:     IdentifierConfig,
}

impl<T: Translator> IdentifierGenerator<T> {
  pub fn new(translator: T, cache: Arc<dyn TranslationCache>, config: IdentifierConfig) -> Self {
    Self { translator, cache, config }
  }

  /// Derive a unique, storage-safe name for `label`.
  ///
  /// `seed` is the stable identity of the thing being named (field id, owner
  /// id) and drives hash fallbacks and collision suffixes, so the same inputs
  /// always produce the same name.
  pub async fn generate(
    &self,
    label:    &str,
    context:  NameContext,
    existing: &HashSet<String>,
    seed:     &str,
  ) -> Result<Identifier> {
    let (base, tier) = self.candidate(label, context, seed).await?;
    let name = unique(base, context, existing, seed)?;
    tracing::debug!(label, context = context.hint(), ?tier, name = %name, "generated identifier");
    Ok(name)
  }

  /// The best name for `label` before collision handling.
  pub async fn candidate(
    &self,
    label: &str,
    context: NameContext,
    seed: &str,
  ) -> Result<(Identifier, Tier)> {
    let prefix = context.prefix();
    let label = label.trim();

    if label.is_ascii()
      && let Some(id) = sanitize(&slugify(label), prefix)
    {
      return Ok((id, Tier::Ascii));
    }

    if let Some(slug) = self.cache.get(label, context)
      && let Some(id) = sanitize(&slug, prefix)
    {
      return Ok((id, Tier::Cache));
    }

    if let Some(id) = self.translated(label, context).await {
      return Ok((id, Tier::Translation));
    }

    if let Some(english) = dictionary::lookup(label) {
      if looks_transliterated(label, &english) {
        tracing::debug!(label, %english, "dictionary entry rejected as transliteration");
      } else if let Some(id) = sanitize(&slugify(&english), prefix) {
        return Ok((id, Tier::Dictionary));
      }
    }

    Ok((hash_name(prefix, seed, 6)?, Tier::Hash))
  }

  async fn translated(&self, label: &str, context: NameContext) -> Option<Identifier> {
    if label.is_empty() {
      return None;
    }
    let request = format!("{label} ({})", context.hint());
    let outcome =
      tokio::time::timeout(self.config.translate_timeout(), self.translator.translate(&request))
        .await;

    let translation = match outcome {
      Ok(Ok(t)) => t,
      Ok(Err(e)) => {
        tracing::debug!(label, error = %e, "translation unavailable, falling through");
        return None;
      }
      Err(_) => {
        tracing::debug!(label, "translation timed out, falling through");
        return None;
      }
    };

    let text = strip_hint(&translation.text);
    let quality = translation.quality.unwrap_or_else(|| estimate_quality(label, &text));
    if quality < self.config.min_quality {
      tracing::debug!(label, %text, quality, "translation below quality threshold");
      return None;
    }
    if looks_transliterated(label, &text) {
      tracing::debug!(label, %text, "translation rejected as transliteration");
      return None;
    }

    let slug = slugify(&text);
    let id = sanitize(&slug, context.prefix())?;
    self.cache.put(label, context, slug);
    Some(id)
  }
}

/// Remove every parenthesised segment: the echoed context hint, in whatever
/// form the translator returned it.
fn strip_hint(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut depth = 0usize;
  for c in text.chars() {
    match c {
      '(' | '（' => depth += 1,
      ')' | '）' => depth = depth.saturating_sub(1),
      _ if depth == 0 => out.push(c),
      _ => {}
    }
  }
  out.trim().to_owned()
}

fn sha256_hex(input: &str) -> String { hex::encode(Sha256::digest(input.as_bytes())) }

/// `<prefix>_<first n hex chars of sha256(seed)>`.
pub fn hash_name(prefix: &str, seed: &str, n: usize) -> Result<Identifier> {
  let digest = sha256_hex(seed);
  Identifier::parse(format!("{prefix}_{}", &digest[..n.min(digest.len())]))
}

/// Resolve collisions with `existing` by suffixing, then by a long hash.
fn unique(
  base:     Identifier,
  context:  NameContext,
  existing: &HashSet<String>,
  seed:     &str,
) -> Result<Identifier> {
  if !existing.contains(base.as_str()) {
    return Ok(base);
  }

  for attempt in 1..=MAX_SUFFIX_ATTEMPTS {
    let suffix = &sha256_hex(&format!("{seed}:{attempt}"))[..4];
    let mut stem = base.as_str().to_owned();
    truncate(&mut stem, MAX_LEN - suffix.len() - 1);
    if let Ok(candidate) = Identifier::parse(format!("{stem}_{suffix}"))
      && !existing.contains(candidate.as_str())
    {
      return Ok(candidate);
    }
  }

  let long = hash_name(context.prefix(), seed, 12)?;
  if !existing.contains(long.as_str()) {
    return Ok(long);
  }
  Err(Error::Validation(format!(
    "could not derive a unique name for {seed:?} from {base}"
  )))
}
