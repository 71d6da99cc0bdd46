//! Reference similarity for the fuzzy tier.
//!
//! Company-form noise ("(주)", "INC", ...) is removed from the raw reference
//! before it is reduced to a matching key. Keys are compared either by edit
//! distance (characters and, for Hangul, decomposed jamo) or by token overlap.
//! Bracketed parts of a reference are compared on their own at a reduced weight.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::FuzzyMetric;
use crate::normalize::normalize_reference;

const HANGUL_BASE: u32 = 0xAC00;
const HANGUL_COUNT: u32 = 11172;
const MEDIAL_COUNT: u32 = 21;
const FINAL_COUNT: u32 = 28;

const INITIALS: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ', 'ㅌ',
    'ㅍ', 'ㅎ',
];
const MEDIALS: [char; 21] = [
    'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ', 'ㅞ', 'ㅟ',
    'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];
// Index 0 is "no final consonant".
const FINALS: [char; 28] = [
    '\0', 'ㄱ', 'ㄲ', 'ㄳ', 'ㄴ', 'ㄵ', 'ㄶ', 'ㄷ', 'ㄹ', 'ㄺ', 'ㄻ', 'ㄼ', 'ㄽ', 'ㄾ', 'ㄿ', 'ㅀ', 'ㅁ',
    'ㅂ', 'ㅄ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅊ', 'ㅋ', 'ㅌ', 'ㅍ', 'ㅎ',
];

/// Weight of a match found through a bracketed part of a reference.
pub const BRACKET_INNER_WEIGHT: f64 = 0.95;
/// Weight of a match on the text outside the brackets.
pub const BRACKET_OUTER_WEIGHT: f64 = 0.90;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]+)\)").expect("bracket pattern compiles"));

/// One comparable form of a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyForm {
    pub key: String,
    pub tokens: BTreeSet<String>,
    pub weight: f64,
}

impl FuzzyForm {
    fn new(text: &str, weight: f64) -> Self {
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            key: normalize_reference(text),
            tokens,
            weight,
        }
    }
}

/// Precomputed fuzzy view of one reference.
///
/// Bank counterparty cells often carry the company in brackets next to the
/// sender, e.g. `홍길동(한빛상사)`. Besides the whole text, each bracketed
/// part and the text outside the brackets are kept as weaker forms.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyKey {
    pub forms: Vec<FuzzyForm>,
}

impl FuzzyKey {
    pub fn new(reference: &str, noise_words: &[String]) -> Self {
        let cleaned = strip_noise_words(&reference.to_uppercase(), noise_words);
        let mut forms = vec![FuzzyForm::new(&cleaned, 1.0)];

        let mut push = |form: FuzzyForm| {
            if !form.key.is_empty() && forms.iter().all(|f| f.key != form.key) {
                forms.push(form);
            }
        };
        for inner in BRACKETED.captures_iter(&cleaned).filter_map(|c| c.get(1)) {
            push(FuzzyForm::new(inner.as_str(), BRACKET_INNER_WEIGHT));
        }
        if BRACKETED.is_match(&cleaned) {
            push(FuzzyForm::new(&BRACKETED.replace_all(&cleaned, " "), BRACKET_OUTER_WEIGHT));
        }

        Self { forms }
    }

    /// Matching key of the whole reference.
    pub fn key(&self) -> &str {
        &self.forms[0].key
    }

    /// Best weighted score over every pair of forms.
    pub fn similarity(&self, other: &FuzzyKey, metric: FuzzyMetric) -> f64 {
        let mut best = 0.0f64;
        for a in &self.forms {
            for b in &other.forms {
                let raw = match metric {
                    FuzzyMetric::EditDistance => edit_similarity(&a.key, &b.key),
                    FuzzyMetric::TokenOverlap => token_overlap(&a.tokens, &b.tokens),
                };
                best = best.max(raw * a.weight * b.weight);
            }
        }
        best
    }
}

/// Remove noise words from upper-cased text. Words that begin or end with an
/// ASCII letter or digit only match on that side at a word boundary, so
/// "INC" is removed from "ACME INC" but not from "INCHEON".
pub fn strip_noise_words(text: &str, noise_words: &[String]) -> String {
    let mut out = text.to_string();
    for word in noise_words {
        let word = word.to_uppercase();
        if word.is_empty() {
            continue;
        }
        let mut search_from = 0;
        while let Some(pos) = out[search_from..].find(&word) {
            let start = search_from + pos;
            let end = start + word.len();
            let left_ok = !word.starts_with(|c: char| c.is_ascii_alphanumeric())
                || !out[..start].ends_with(|c: char| c.is_alphanumeric());
            let right_ok = !word.ends_with(|c: char| c.is_ascii_alphanumeric())
                || !out[end..].starts_with(|c: char| c.is_alphanumeric());
            if left_ok && right_ok {
                out.replace_range(start..end, " ");
                search_from = start + 1;
            } else {
                search_from = end;
            }
        }
    }
    out
}

/// `1 - distance / max_len` over characters and over Hangul jamo, whichever
/// is higher. Empty keys carry no evidence and score 0.
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let plain = ratio(&chars_a, &chars_b);
    let jamo = ratio(&decompose_jamo(&chars_a), &decompose_jamo(&chars_b));
    plain.max(jamo)
}

/// Jaccard overlap of token sets. Empty sets score 0.
pub fn token_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f64 / union as f64
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

pub fn levenshtein(left: &[char], right: &[char]) -> usize {
    if left == right {
        return 0;
    }
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut previous = (0..=right.len()).collect::<Vec<usize>>();
    for (left_index, left_char) in left.iter().enumerate() {
        let mut current = vec![left_index + 1];
        for (right_index, right_char) in right.iter().enumerate() {
            let insertion = current[right_index] + 1;
            let deletion = previous[right_index + 1] + 1;
            let substitution = previous[right_index] + usize::from(left_char != right_char);
            current.push(insertion.min(deletion).min(substitution));
        }
        previous = current;
    }
    previous[right.len()]
}

/// Split precomposed Hangul syllables into initial, medial and final jamo.
/// Other characters pass through.
pub fn decompose_jamo(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len() * 3);
    for &c in chars {
        let code = c as u32;
        if (HANGUL_BASE..HANGUL_BASE + HANGUL_COUNT).contains(&code) {
            let offset = code - HANGUL_BASE;
            let initial = offset / (MEDIAL_COUNT * FINAL_COUNT);
            let medial = (offset % (MEDIAL_COUNT * FINAL_COUNT)) / FINAL_COUNT;
            let last = offset % FINAL_COUNT;
            out.push(INITIALS[initial as usize]);
            out.push(MEDIALS[medial as usize]);
            if last > 0 {
                out.push(FINALS[last as usize]);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise() -> Vec<String> {
        crate::config::MatchConfig::default().noise_words
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("INV001"), &chars("INV001")), 0);
    }

    #[test]
    fn jamo_decomposition() {
        assert_eq!(decompose_jamo(&chars("한")), vec!['ㅎ', 'ㅏ', 'ㄴ']);
        assert_eq!(decompose_jamo(&chars("가A")), vec!['ㄱ', 'ㅏ', 'A']);
    }

    #[test]
    fn jamo_similarity_beats_syllable_similarity() {
        // One final consonant differs: 1 of 3 syllables, but 1 of 9 jamo.
        let syllable = ratio(&chars("한빛상"), &chars("한빗상"));
        let score = edit_similarity("한빛상", "한빗상");
        assert!(score > syllable);
        assert!((score - 8.0 / 9.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn empty_keys_score_zero() {
        assert_eq!(edit_similarity("", ""), 0.0);
        assert_eq!(edit_similarity("A", ""), 0.0);
        assert_eq!(token_overlap(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn noise_words_respect_ascii_boundaries() {
        let n = noise();
        assert_eq!(strip_noise_words("ACME INC", &n).trim(), "ACME");
        assert_eq!(strip_noise_words("INCHEON TRADING", &n), "INCHEON TRADING");
        assert_eq!(strip_noise_words("(주)한빛상사", &n).trim(), "한빛상사");
        assert_eq!(strip_noise_words("한빛상사 주식회사", &n).trim(), "한빛상사");
        assert_eq!(strip_noise_words("SAMIL CO.,LTD", &n).trim(), "SAMIL");
    }

    #[test]
    fn fuzzy_key_drops_company_forms() {
        let n = noise();
        let a = FuzzyKey::new("(주)한빛상사", &n);
        let b = FuzzyKey::new("한빛상사 주식회사", &n);
        assert_eq!(a.key(), "한빛상사");
        assert_eq!(a.forms.len(), 1);
        assert_eq!(a.similarity(&b, FuzzyMetric::EditDistance), 1.0);
    }

    #[test]
    fn token_overlap_metric() {
        let n = noise();
        let a = FuzzyKey::new("Payment INV 1001 Acme", &n);
        let b = FuzzyKey::new("acme inv-1001", &n);
        // {PAYMENT, INV, 1001, ACME} vs {ACME, INV, 1001}
        assert!((a.similarity(&b, FuzzyMetric::TokenOverlap) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn edit_similarity_on_references() {
        let score = edit_similarity("INV1001", "INV1007");
        assert!((score - (1.0 - 1.0 / 7.0)).abs() < 1e-9);
        assert!(edit_similarity("INV1001", "CHK9") < 0.5);
    }

    #[test]
    fn bracketed_company_matches_at_reduced_weight() {
        let n = noise();
        let ledger = FuzzyKey::new("한빛상사", &n);
        let bank = FuzzyKey::new("홍길동(한빛상사)", &n);
        let keys: Vec<&str> = bank.forms.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["홍길동한빛상사", "한빛상사", "홍길동"]);

        let score = ledger.similarity(&bank, FuzzyMetric::EditDistance);
        assert!((score - BRACKET_INNER_WEIGHT).abs() < 1e-9, "got {score}");
        assert_eq!(score, bank.similarity(&ledger, FuzzyMetric::EditDistance));
    }

    #[test]
    fn text_outside_brackets_is_a_form() {
        let n = noise();
        let ledger = FuzzyKey::new("한빛상사", &n);
        let bank = FuzzyKey::new("한빛상사(1월분)", &n);
        let score = ledger.similarity(&bank, FuzzyMetric::EditDistance);
        assert!((score - BRACKET_OUTER_WEIGHT).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn company_form_brackets_are_noise_not_forms() {
        let n = noise();
        let key = FuzzyKey::new("(주)한빛상사", &n);
        assert_eq!(key.forms.len(), 1);
    }
}
