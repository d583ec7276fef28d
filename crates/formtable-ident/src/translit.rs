//! Heuristic detection of romanized (transliterated) output.
//!
//! A translation service that cannot translate a word often returns its
//! phonetic romanization instead: `ชื่อ` → `chue` rather than `name`. Such
//! output is a valid slug but a useless column name, so the generator rejects
//! it and falls through to the next tier.

/// Words that look like romanization but are ordinary English. Checked before
/// the marker test so common form vocabulary is never rejected.
const ENGLISH: &[&str] = &[
  "account", "address", "age", "amount", "and", "area", "birth", "both", "branch", "change",
  "channel", "check", "child", "choice", "class", "code", "comment", "contact", "country",
  "date", "detail", "district", "each", "email", "end", "english", "father", "first", "free",
  "gender", "good", "group", "health", "height", "image", "item", "kind", "last", "length",
  "link", "long", "mother", "name", "need", "note", "number", "other", "own", "path", "phone",
  "photo", "place", "price", "province", "range", "rating", "see", "short", "south", "start",
  "status", "street", "subdistrict", "teacher", "telephone", "text", "thai", "the", "their",
  "then", "thing", "three", "time", "too", "type", "weight", "which", "with", "year", "zoom",
];

/// Consonant clusters that open romanized Thai syllables.
const ONSETS: &[&str] = &["kh", "ph", "th", "ch", "ng"];

/// Vowel spellings common in romanized Thai and rare in English.
const CLUSTERS: &[&str] = &["uea", "ue", "oe", "aa", "ii", "uu", "ao"];

const MIN_RATIO: f64 = 0.5;
const MAX_RATIO: f64 = 2.0;

fn has_marker(word: &str) -> bool {
  ONSETS.iter().any(|o| word.starts_with(o)) || CLUSTERS.iter().any(|c| word.contains(c))
}

/// `true` if `output` reads as a romanization of `source` rather than a
/// translation: its length is comparable to the source and most of its
/// non-English words carry romanization markers.
pub fn looks_transliterated(source: &str, output: &str) -> bool {
  let source_len = source.chars().filter(|c| !c.is_whitespace()).count();
  let output_len = output.chars().filter(|c| !c.is_whitespace()).count();
  if source_len == 0 || output_len == 0 {
    return false;
  }

  let ratio = output_len as f64 / source_len as f64;
  if !(MIN_RATIO..=MAX_RATIO).contains(&ratio) {
    return false;
  }

  let words: Vec<String> = output
    .split(|c: char| !c.is_ascii_alphabetic())
    .filter(|w| w.len() > 1)
    .map(str::to_ascii_lowercase)
    .filter(|w| !ENGLISH.contains(&w.as_str()))
    .collect();
  if words.is_empty() {
    return false;
  }

  let marked = words.iter().filter(|w| has_marker(w)).count();
  marked * 2 > words.len()
}
