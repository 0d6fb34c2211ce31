//! Keyword extraction, categorization and extractive summaries
//!
//! Everything here is deterministic: ties keep first-seen order, so the same
//! text always yields the same keywords, category and summary.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Keywords returned per document
pub const TOP_KEYWORDS: usize = 8;

/// Sentences in a summary
pub const SUMMARY_SENTENCES: usize = 4;

/// Category used when no rule matches
pub const OTHER_CATEGORY: &str = "Other";

/// Category rules in priority order; ties between categories keep this order
const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "AI",
        &[
            "artificial intelligence",
            "machine learning",
            "deep learning",
            "large language model",
            "llm",
            "generative ai",
            "neural network",
            "transformer model",
            "nlp",
            "chatgpt",
        ],
    ),
    (
        "Regulation & Standards",
        &[
            "ifrs",
            "solvency",
            "asop",
            "ias",
            "gaap",
            "naic",
            "standard",
            "compliance",
            "regulation",
        ],
    ),
    (
        "Risk & Capital",
        &[
            "erm",
            "risk",
            "capital",
            "stress",
            "scenario",
            "catastrophe",
            "reinsurance",
        ],
    ),
    ("Pricing", &["pricing", "rate", "rating", "premium", "tariff"]),
    (
        "Underwriting & Claims",
        &[
            "underwriting",
            "uw",
            "risk selection",
            "appetite",
            "claim",
            "claims",
            "loss",
            "settlement",
        ],
    ),
    ("Reserving", &["reserve", "reserving", "ibnr"]),
    (
        "P&C",
        &["property", "casualty", "p&c", "auto", "general insurance"],
    ),
    ("Life", &["life", "annuity", "mortality", "longevity"]),
    ("Health", &["health", "medical", "morbidity"]),
    (
        "LTC / DI / CI",
        &[
            "long term care",
            "ltc",
            "disability income",
            "di",
            "critical illness",
            "ci",
        ],
    ),
    (
        "Data & Analytics",
        &[
            "data",
            "analytics",
            "model",
            "modeling",
            "statistics",
            "forecast",
            "predictive",
            "regression",
            "time series",
            "governance",
        ],
    ),
    (
        "Operations / Automation",
        &[
            "automation",
            "workflow",
            "process",
            "rpa",
            "system",
            "implementation",
            "tooling",
        ],
    ),
    (
        "Education / Events",
        &[
            "webinar",
            "seminar",
            "conference",
            "agenda",
            "workshop",
            "training",
            "course",
            "syllabus",
            "lecture",
            "slides",
        ],
    ),
    (
        "Investment / ALM",
        &[
            "investment",
            "asset",
            "liability",
            "alm",
            "portfolio",
            "interest rate",
            "yield",
            "duration",
        ],
    ),
];

/// Terms that always outrank ordinary keywords when present
const SPECIAL_TERMS: &[&str] = &[r"\bifrs\s*17\b", r"\bcovid[-\s]*19\b", r"\bsolvency\s*ii\b"];

/// Function words never reported as keywords
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "that", "this", "from", "have", "has",
    "not", "but", "its", "can", "will", "which", "their", "they", "these", "those", "been",
    "into", "than", "then", "also", "such", "may", "our", "you", "your", "all", "any", "each",
];

/// Result of classifying one document
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// False means "processed correctly, intentionally excluded"
    pub relevant: bool,
    pub category: String,
    pub keywords: Vec<String>,
}

/// Judges topical relevance and assigns category and keywords
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str, title: Option<&str>) -> Classification;
}

/// Rule-based classifier over keyword frequency
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    topics: Vec<String>,
}

impl KeywordClassifier {
    /// With no topics every document is relevant
    pub fn new(topics: &[String]) -> Self {
        Self {
            topics: topics
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str, title: Option<&str>) -> Classification {
        let keywords = extract_keywords(text, title, TOP_KEYWORDS);
        let relevant = self.topics.is_empty() || {
            let hay = format!("{} {} {}", title.unwrap_or(""), text, keywords.join(" "))
                .to_lowercase();
            self.topics.iter().any(|t| hay.contains(t.as_str()))
        };
        let category = categorize(title, text, &keywords);

        Classification {
            relevant,
            category,
            keywords,
        }
    }
}

/// Frequency keywords with bigrams, boosted when they also occur in the title
///
/// ```
/// use doc_harvester::catalog::extract_keywords;
///
/// let keywords = extract_keywords(
///     "Reserving models. Reserving under IFRS 17 needs new reserving models.",
///     Some("Reserving models"),
///     3,
/// );
/// assert_eq!(keywords[0], "ifrs 17");
/// assert!(keywords.contains(&"reserving".to_string()));
/// ```
pub fn extract_keywords(text: &str, title: Option<&str>, top_n: usize) -> Vec<String> {
    let title = title.unwrap_or("");
    if text.is_empty() && title.is_empty() {
        return Vec::new();
    }

    let text_tokens = tokens(text);
    let title_tokens = tokens(title);
    let title_set: HashSet<&str> = title_tokens.iter().map(String::as_str).collect();
    let title_bigrams: HashSet<String> = bigrams(&title_tokens).collect();

    let mut scores = Scores::default();
    for token in &text_tokens {
        if keeps(token) {
            scores.add(token, 1);
        }
    }
    for phrase in bigrams(&text_tokens) {
        scores.add(&phrase, 1);
    }
    for (term, score) in scores.entries.iter_mut() {
        if title_bigrams.contains(term.as_str()) {
            *score += 4;
        } else if title_set.contains(term.as_str()) {
            *score += 3;
        }
    }

    let combined = format!("{}\n{}", title, text)
        .to_lowercase()
        .replace(['\u{2013}', '\u{2014}'], "-");
    for re in special_regexes() {
        for m in re.find_iter(&combined) {
            let term = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
            scores.add(&term, 10);
        }
    }

    scores.ranked().into_iter().take(top_n).collect()
}

/// Up to three matching categories joined by `"; "`, or `"Other"`
///
/// Single-word terms match whole words; multi-word terms match the word
/// sequence with any whitespace between words.
pub fn categorize(title: Option<&str>, text: &str, keywords: &[String]) -> String {
    let hay = format!("{} {} {}", title.unwrap_or(""), text, keywords.join(" ")).to_lowercase();
    let words: HashSet<&str> = word_regex()
        .map(|re| re.find_iter(&hay).map(|m| m.as_str()).collect())
        .unwrap_or_default();

    let mut matches: Vec<(&str, usize)> = category_matchers()
        .iter()
        .map(|(category, terms)| {
            let score = terms.iter().filter(|t| t.matches(&hay, &words)).count();
            (*category, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    if matches.is_empty() {
        return OTHER_CATEGORY.to_string();
    }

    matches.sort_by(|a, b| b.1.cmp(&a.1));
    matches
        .iter()
        .take(3)
        .map(|(c, _)| *c)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extractive summary: the sentences mentioning the most keywords
///
/// Sentences of 20 characters or fewer are ignored. Without keywords the
/// leading sentences are used.
pub fn summarize(text: &str, keywords: &[String], max_sentences: usize) -> String {
    let sentences = split_sentences(text);
    if keywords.is_empty() {
        return sentences
            .into_iter()
            .take(max_sentences)
            .collect::<Vec<_>>()
            .join(" ");
    }

    let keys: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut scored: Vec<(usize, &str)> = sentences
        .into_iter()
        .map(|s| {
            let lower = s.to_lowercase();
            (keys.iter().filter(|k| lower.contains(k.as_str())).count(), s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(max_sentences)
        .map(|(_, s)| s)
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_sentences(text: &str) -> Vec<&str> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let text = text.trim();
    let mut sentences = Vec::new();
    let mut start = 0;

    if let Some(re) = RE.get_or_init(|| Regex::new(r"[.!?]\s+").ok()).as_ref() {
        for m in re.find_iter(text) {
            sentences.push(&text[start..m.start() + 1]);
            start = m.end();
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| s.chars().count() > 20)
        .collect()
}

/// Accumulated scores in first-seen order
#[derive(Default)]
struct Scores {
    entries: Vec<(String, i64)>,
    index: HashMap<String, usize>,
}

impl Scores {
    fn add(&mut self, term: &str, amount: i64) {
        match self.index.get(term) {
            Some(&i) => self.entries[i].1 += amount,
            None => {
                self.index.insert(term.to_string(), self.entries.len());
                self.entries.push((term.to_string(), amount));
            }
        }
    }

    fn ranked(mut self) -> Vec<String> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries.into_iter().map(|(term, _)| term).collect()
    }
}

fn tokens(s: &str) -> Vec<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let lower = s.to_lowercase();
    RE.get_or_init(|| Regex::new(r"[a-z][a-z0-9\-]*").ok())
        .as_ref()
        .map(|re| re.find_iter(&lower).map(|m| m.as_str().to_string()).collect())
        .unwrap_or_default()
}

fn keeps(token: &str) -> bool {
    token.len() >= 3 && !STOP_WORDS.contains(&token)
}

fn bigrams(tokens: &[String]) -> impl Iterator<Item = String> + '_ {
    tokens
        .windows(2)
        .filter(|pair| keeps(&pair[0]) && keeps(&pair[1]))
        .map(|pair| format!("{} {}", pair[0], pair[1]))
}

fn special_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        SPECIAL_TERMS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn word_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").ok()).as_ref()
}

enum TermMatcher {
    Word(&'static str),
    Phrase(Regex),
}

impl TermMatcher {
    fn new(term: &'static str) -> Option<Self> {
        let words: Vec<&str> = term.split_whitespace().collect();
        if words.len() == 1 {
            return Some(Self::Word(term));
        }
        let pattern = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join(r"\s+");
        Regex::new(&format!(r"\b{}\b", pattern)).ok().map(Self::Phrase)
    }

    fn matches(&self, hay: &str, words: &HashSet<&str>) -> bool {
        match self {
            Self::Word(w) => words.contains(w),
            Self::Phrase(re) => re.is_match(hay),
        }
    }
}

fn category_matchers() -> &'static [(&'static str, Vec<TermMatcher>)] {
    static MATCHERS: OnceLock<Vec<(&'static str, Vec<TermMatcher>)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        CATEGORY_RULES
            .iter()
            .map(|(category, terms)| {
                (
                    *category,
                    terms.iter().filter_map(|t| TermMatcher::new(t)).collect(),
                )
            })
            .collect()
    })
}
