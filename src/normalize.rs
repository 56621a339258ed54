//! Turns raw recognizer output into the canonical "LLDD LLL" plate text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };

/// two letters, two digits, three letters
static PLATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z]{3}$").unwrap());
static FORMATTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S{4} \S{3}$").unwrap());
static CHARACTER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z0-9]{2,7}").unwrap());

pub const PLATE_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// (misread, replacement), applied in order to the whole cleaned text
    pub confusions: Vec<(char, char)>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { confusions: vec![('O', '0'), ('I', '1')] }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlateNormalizer {
    config: NormalizerConfig,
}

impl PlateNormalizer {

    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Canonical plate text when `raw` holds one, otherwise the cleaned text unformatted.
    ///
    /// The first seven character window matching the plate pattern wins. A cleaned text of
    /// exactly seven characters is formatted even when it does not match.
    pub fn normalize(&self, raw: &str) -> String {
        let mut cleaned: String = raw.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_uppercase)
            .collect();
        for (from, to) in &self.config.confusions {
            cleaned = cleaned.replace(*from, &to.to_string());
        }

        let chars: Vec<char> = cleaned.chars().collect();
        let matched = chars.windows(PLATE_LEN)
            .map(|window| window.iter().collect::<String>())
            .find(|window| PLATE_PATTERN.is_match(window));
        if let Some(window) = matched {
            return format_plate(&window);
        }
        if chars.len() == PLATE_LEN {
            return format_plate(&cleaned);
        }
        cleaned
    }

    /// Last resort read: every run of 2 to 7 plate characters is tried on its own,
    /// longest first, earlier texts first among runs of equal length. Runs are never
    /// joined, a plate is only guessed from characters read together.
    ///
    /// Returns the index of the text the run came from with the guessed plate.
    pub fn loose_guess<'t>(&self, texts: impl IntoIterator<Item = &'t str>) -> Option<(usize, String)> {
        let mut runs: Vec<(usize, String)> = Vec::new();
        for (index, text) in texts.into_iter().enumerate() {
            let upper = text.to_uppercase();
            runs.extend(CHARACTER_RUN.find_iter(&upper).map(|m| (index, m.as_str().to_string())));
        }
        runs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        runs.into_iter()
            .map(|(index, run)| (index, self.normalize(&run)))
            .find(|(_, guess)| is_plate(guess))
    }
}

/// Normalizes with the default confusion table.
pub fn normalize(raw: &str) -> String {
    PlateNormalizer::default().normalize(raw)
}

/// true for text produced by the formatting steps of [`PlateNormalizer::normalize`]
pub fn is_plate(normalized: &str) -> bool {
    FORMATTED.is_match(normalized)
}

fn format_plate(seven: &str) -> String {
    let chars: Vec<char> = seven.chars().collect();
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[4..].iter().collect();
    format!("{} {}", head, tail)
}


#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn formats_clean_plate() {
        assert_eq!(normalize("AB12CDE"), "AB12 CDE");
        assert_eq!(normalize("ab12 cde"), "AB12 CDE");
        assert_eq!(normalize("  A-B 1.2 C:D|E "), "AB12 CDE");
    }

    #[test]
    fn corrects_confusable_letters() {
        assert_eq!(normalize("AB1OCDE"), "AB10 CDE");
        assert_eq!(normalize("XY1I ZZZ"), "XY11 ZZZ");
    }

    #[test]
    fn correction_applies_to_whole_text() {
        // lossy on letter positions, still formatted through the length seven fallback
        assert_eq!(normalize("AA03BOJ"), "AA03 B0J");
    }

    #[test]
    fn finds_first_matching_window() {
        assert_eq!(normalize("GB AB12CDE"), "AB12 CDE");
        assert_eq!(normalize("99XY34ZZZAB12CDE"), "XY34 ZZZ");
    }

    #[test]
    fn leaves_non_plates_unformatted() {
        assert_eq!(normalize("HELL0 W0RLD!"), "HELL0W0RLD");
        assert_eq!(normalize("A1"), "A1");
        assert_eq!(normalize(""), "");
        assert!(!is_plate(&normalize("A1")));
    }

    #[test]
    fn length_seven_fallback_ignores_pattern() {
        assert_eq!(normalize("1234567"), "1234 567");
        assert!(is_plate("1234 567"));
    }

    #[test]
    fn matching_plates_keep_their_characters() {
        for plate in ["AB12CDE", "ZZ99XYZ", "MK07BKR", "LA51ABC"].iter() {
            let normalized = normalize(plate);
            assert_eq!(normalized.replace(' ', ""), *plate);
            assert_eq!(normalized.matches(' ').count(), 1);
            assert_eq!(&normalized[4..5], " ");
        }
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "AB12CDE", "AB1OCDE", "hello world", "GB AB12 CDE xx", "1234567",
            "", "ß", "ÄB12CDE", "O0OIIl", "AB12CD", "AB12CDEF",
        ];
        for input in inputs.iter() {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn custom_confusion_table() {
        let normalizer = PlateNormalizer::new(NormalizerConfig { confusions: vec![('S', '5')] });
        assert_eq!(normalizer.normalize("ABI2CDO"), "ABI2 CDO");
        assert_eq!(normalizer.normalize("AB1SCDE"), "AB15 CDE");
    }

    #[test]
    fn loose_guess_reads_single_runs() {
        let normalizer = PlateNormalizer::default();
        assert_eq!(normalizer.loose_guess(vec!["q1", "xx ab12cde"]), Some((1, "AB12 CDE".to_string())));
        assert_eq!(normalizer.loose_guess(vec!["zz 1234567 8"]), Some((0, "1234 567".to_string())));
        assert_eq!(normalizer.loose_guess(vec!["~~", "zz 9"]), None);
    }

    #[test]
    fn loose_guess_never_joins_separate_reads() {
        let normalizer = PlateNormalizer::default();
        assert_eq!(normalizer.loose_guess(vec!["AB12C", "AB12C"]), None);
        assert_eq!(normalizer.loose_guess(vec!["ab12", "c", "cde"]), None);
    }

    #[test]
    fn loose_guess_prefers_longest_run() {
        let normalizer = PlateNormalizer::default();
        let texts = vec!["AB12CD", "XY34ZZZ", "MK07BKR"];
        assert_eq!(normalizer.loose_guess(texts), Some((1, "XY34 ZZZ".to_string())));
    }
}
