// ABOUTME: Token-inclusion checks that keep model output tied to its source text
// ABOUTME: Factual tokens (anything with a digit or an uppercase letter) must appear in the source

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}]+(?:[-._'/][\p{L}\p{N}]+)*").unwrap();
    static ref SENTENCE_END: Regex = Regex::new(r"([.!?])\s+").unwrap();
}

/// Capitalised function words that carry no facts (sentence starts, Gherkin keywords)
const EXEMPT_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "each", "for", "from", "given",
    "if", "in", "is", "it", "its", "may", "must", "no", "not", "of", "on", "or", "should", "that",
    "the", "then", "these", "this", "those", "to", "when", "will", "with", "yes",
];

fn subparts(token: &str) -> impl Iterator<Item = &str> {
    token
        .split(|c| matches!(c, '-' | '.' | '_' | '\'' | '/'))
        .filter(|p| !p.is_empty())
}

/// Words with a digit or an uppercase letter, lowercased
pub fn factual_tokens(text: &str) -> BTreeSet<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| w.chars().any(|c| c.is_numeric() || c.is_uppercase()))
        .map(|w| w.to_lowercase())
        .filter(|w| !EXEMPT_WORDS.contains(&w.as_str()))
        .collect()
}

/// Vocabulary of a source text, case-insensitive
#[derive(Debug, Clone, Default)]
pub struct Grounding {
    vocabulary: HashSet<String>,
}

impl Grounding {
    pub fn new(source: &str) -> Self {
        let mut grounding = Self::default();
        grounding.extend(source);
        grounding
    }

    /// Allow the words of an additional text (section titles during formatting)
    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extend(extra);
        self
    }

    fn extend(&mut self, text: &str) {
        for word in WORD.find_iter(text) {
            let lower = word.as_str().to_lowercase();
            for part in subparts(&lower) {
                self.vocabulary.insert(part.to_string());
            }
            self.vocabulary.insert(lower);
        }
    }

    fn knows(&self, token: &str) -> bool {
        self.vocabulary.contains(token) || subparts(token).all(|part| self.vocabulary.contains(part))
    }

    /// Factual tokens of `text` that the source never mentions
    pub fn ungrounded(&self, text: &str) -> Vec<String> {
        factual_tokens(text)
            .into_iter()
            .filter(|token| !self.knows(token))
            .collect()
    }

    pub fn is_grounded(&self, text: &str) -> bool {
        self.ungrounded(text).is_empty()
    }
}

/// Split one line into sentences, keeping terminal punctuation
pub fn split_sentences(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for caps in SENTENCE_END.captures_iter(line) {
        if let (Some(whole), Some(punct)) = (caps.get(0), caps.get(1)) {
            let sentence = line[start..punct.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = whole.end();
        }
    }
    let rest = line[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Comparison form of a sentence: lowercase, single spaces, no trailing punctuation or bullets
pub fn normalize_sentence(sentence: &str) -> String {
    let collapsed = sentence
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•') || c.is_whitespace())
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ';' | ':'))
        .trim()
        .to_string()
}
