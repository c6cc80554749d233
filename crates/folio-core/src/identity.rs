//! Deterministic, content-derived section identifiers.
//!
//! A stable identifier is `s-` followed by the first 12 hex characters of the
//! SHA-1 digest of a structural seed:
//!
//! ```text
//! normalize(title) | position | normalize(a0.title):a0.position>normalize(a1.title):a1.position…
//! ```
//!
//! with ancestors listed outermost first. Identifiers already issued on
//! devices were computed this way, so none of these constants may change.

use std::fmt;

use sha1::{Digest, Sha1};

/// Prefix tag of every section identifier.
pub const SECTION_UID_PREFIX: &str = "s-";

/// Number of hex digest characters kept after the prefix.
pub const SECTION_UID_HEX_LEN: usize = 12;

const FIELD_SEPARATOR: &str = "|";
const CHAIN_SEPARATOR: &str = ">";
const POSITION_SEPARATOR: &str = ":";

/// Letters folded to their base Latin form before non-alphanumerics are
/// stripped.
const FOLDS: &[(char, char)] = &[
  ('ğ', 'g'),
  ('ü', 'u'),
  ('ş', 's'),
  ('ı', 'i'),
  ('ö', 'o'),
  ('ç', 'c'),
];

/// Lowercase, fold, and keep only `[a-z0-9]`.
///
/// Characters with no fold entry are dropped rather than transliterated.
pub fn normalize_title(title: &str) -> String {
  title
    .to_lowercase()
    .chars()
    .map(|c| {
      FOLDS
        .iter()
        .find_map(|&(from, to)| (from == c).then_some(to))
        .unwrap_or(c)
    })
    .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    .collect()
}

// ─── Position ────────────────────────────────────────────────────────────────

/// An `order_index` value as it renders inside a seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
  Index(i64),
  Fractional(f64),
  Missing,
}

impl Position {
  /// Integral reals collapse to [`Position::Index`] so `3.0` renders as `3`.
  pub fn from_real(value: f64) -> Self {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
      Self::Index(value as i64)
    } else {
      Self::Fractional(value)
    }
  }
}

impl From<i64> for Position {
  fn from(value: i64) -> Self { Self::Index(value) }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Index(n) => write!(f, "{n}"),
      Self::Fractional(x) => write!(f, "{x}"),
      Self::Missing => f.write_str("null"),
    }
  }
}

// ─── Seed ────────────────────────────────────────────────────────────────────

/// One link of an ancestor chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Ancestor {
  pub title:    String,
  pub position: Position,
}

impl Ancestor {
  pub fn new(title: impl Into<String>, position: impl Into<Position>) -> Self {
    Self { title: title.into(), position: position.into() }
  }
}

/// The normalized structural seed a section identifier is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSeed(String);

impl SectionSeed {
  /// `ancestors` must be ordered outermost first.
  pub fn new(title: &str, position: Position, ancestors: &[Ancestor]) -> Self {
    let chain = ancestors
      .iter()
      .map(|a| format!("{}{POSITION_SEPARATOR}{}", normalize_title(&a.title), a.position))
      .collect::<Vec<_>>()
      .join(CHAIN_SEPARATOR);

    Self(format!(
      "{}{FIELD_SEPARATOR}{position}{FIELD_SEPARATOR}{chain}",
      normalize_title(title)
    ))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn uid(&self) -> String { section_uid(&self.0) }
}

impl fmt::Display for SectionSeed {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Hash a seed into a stable section identifier.
pub fn section_uid(seed: &str) -> String {
  let digest = hex::encode(Sha1::digest(seed.as_bytes()));
  format!("{SECTION_UID_PREFIX}{}", &digest[..SECTION_UID_HEX_LEN])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_folds_turkish_letters() {
    assert_eq!(normalize_title("Birinci Söz"), "birincisoz");
    assert_eq!(normalize_title("Onuncu Söz — Haşir Risalesi"), "onuncusozhasirrisalesi");
  }

  #[test]
  fn normalize_handles_dotted_capital_i() {
    // 'İ' lowercases to 'i' + U+0307; the combining dot is stripped.
    assert_eq!(normalize_title("İKİNCİ SÖZ"), "ikincisoz");
  }

  #[test]
  fn normalize_drops_unfolded_accents() {
    assert_eq!(normalize_title("Kur'ân"), "kurn");
    assert_eq!(normalize_title("  12. Lem'a! "), "12lema");
  }

  #[test]
  fn seed_without_ancestors_has_empty_chain() {
    let seed = SectionSeed::new("Birinci Söz", Position::Index(1), &[]);
    assert_eq!(seed.as_str(), "birincisoz|1|");
  }

  #[test]
  fn seed_lists_ancestors_outermost_first() {
    let seed = SectionSeed::new(
      "İkinci Makam",
      Position::Index(2),
      &[Ancestor::new("Onuncu Söz", 10), Ancestor::new("Birinci Makam", 1)],
    );
    assert_eq!(seed.as_str(), "ikincimakam|2|onuncusoz:10>birincimakam:1");
  }

  #[test]
  fn uid_matches_issued_identifiers() {
    assert_eq!(section_uid("birincisoz|1|"), "s-54a88904a5fb");
    assert_eq!(section_uid("birincimakam|1|onuncusoz:10"), "s-c165efbcab45");
    assert_eq!(
      SectionSeed::new(
        "İkinci Makam",
        Position::Index(2),
        &[Ancestor::new("Onuncu Söz", 10), Ancestor::new("Birinci Makam", 1)],
      )
      .uid(),
      "s-1bbe568ced94"
    );
  }

  #[test]
  fn uid_is_deterministic_and_fixed_length() {
    let a = SectionSeed::new("Section 0", Position::Index(0), &[]).uid();
    let b = SectionSeed::new("section-0", Position::Index(0), &[]).uid();
    assert_eq!(a, b);
    assert_eq!(a, "s-3015ffdf1313");
    assert_eq!(a.len(), SECTION_UID_PREFIX.len() + SECTION_UID_HEX_LEN);
  }

  #[test]
  fn position_rendering() {
    assert_eq!(Position::from_real(3.0).to_string(), "3");
    assert_eq!(Position::from_real(2.5).to_string(), "2.5");
    assert_eq!(Position::Missing.to_string(), "null");
  }
}
