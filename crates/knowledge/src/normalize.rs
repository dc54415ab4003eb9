//! Text normalization for matching.
//!
//! Accented and unaccented spellings of the same word compare equal after
//! normalization: `normalize("Ciéncia") == normalize("ciencia")`.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lower-case, decompose (NFD), and drop combining marks (Mn, Mc and Me).
///
/// Spacing marks go too, so Indic vowel signs are stripped. The knowledge
/// base is Spanish and English, where only nonspacing accents occur.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
