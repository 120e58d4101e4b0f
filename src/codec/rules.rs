//! Mutator Rule Table
//!
//! A rule file holds one rule per line:
//!
//! ```text
//! # pattern|||template
//! ^app\.[a-z0-9]+\.[a-z]+\.cpu$|||_.host.service.+
//! ^servers\.[^.]+\.disk\..*$|||_.host.1.device+
//! ```
//!
//! Rules are kept in file order and never change after load. The template
//! is split into typed [`Token`]s up front so decoding never re-parses it.

use regex::Regex;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Separator between pattern and template on a rule line
pub const RULE_DELIMITER: &str = "|||";

/// One position of a rule template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `+` or numeric-with-`+`: this and all remaining segments become one
    /// name component; evaluation stops
    CatchAllName,
    /// Numeric token: the segment becomes a name component
    Name,
    /// Word token: the segment becomes the value of this tag key
    Field(String),
    /// Word token ending in `+`: remaining segments become the tag value;
    /// evaluation stops
    CatchAllField(String),
    /// `_` (or any token without letters or digits): segment is dropped
    Skip,
}

impl Token {
    /// Classify a single template token
    pub fn parse(raw: &str) -> Token {
        match raw {
            "+" => return Token::CatchAllName,
            "_" => return Token::Skip,
            _ => {}
        }

        let has_letter = raw.bytes().any(|b| b.is_ascii_alphabetic());
        let has_digit = raw.bytes().any(|b| b.is_ascii_digit());
        let catch_all = raw.ends_with('+');

        match (has_letter, has_digit, catch_all) {
            (false, true, true) => Token::CatchAllName,
            (false, true, false) => Token::Name,
            (true, _, true) => Token::CatchAllField(raw.trim_end_matches('+').to_string()),
            (true, _, false) => Token::Field(raw.to_string()),
            (false, false, _) => Token::Skip,
        }
    }
}

/// Error loading the rule table. Always fatal at startup.
#[derive(Debug)]
pub enum RuleLoadError {
    /// Rule source could not be read
    Io(std::io::Error),
    /// A non-blank line has no `|||` delimiter
    MissingDelimiter { line: usize },
    /// A pattern failed to compile
    InvalidPattern {
        line: usize,
        pattern: String,
        source: regex::Error,
    },
}

impl std::fmt::Display for RuleLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleLoadError::Io(e) => write!(f, "failed to read mutator rules: {}", e),
            RuleLoadError::MissingDelimiter { line } => write!(
                f,
                "mutator rule on line {} has no '{}' delimiter",
                line, RULE_DELIMITER
            ),
            RuleLoadError::InvalidPattern {
                line,
                pattern,
                source,
            } => write!(
                f,
                "mutator rule on line {} has invalid pattern {:?}: {}",
                line, pattern, source
            ),
        }
    }
}

impl std::error::Error for RuleLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleLoadError::Io(e) => Some(e),
            RuleLoadError::InvalidPattern { source, .. } => Some(source),
            RuleLoadError::MissingDelimiter { .. } => None,
        }
    }
}

impl From<std::io::Error> for RuleLoadError {
    fn from(e: std::io::Error) -> Self {
        RuleLoadError::Io(e)
    }
}

/// A compiled pattern plus its parsed template
#[derive(Debug, Clone)]
pub struct MutatorRule {
    pattern: Regex,
    template: String,
    tokens: Vec<Token>,
}

impl MutatorRule {
    /// Compile a rule from its two halves
    pub fn new(pattern: &str, template: &str) -> Result<Self, regex::Error> {
        Ok(MutatorRule {
            pattern: Regex::new(pattern)?,
            template: template.to_string(),
            tokens: template.split('.').map(Token::parse).collect(),
        })
    }

    /// Does this rule apply to the path?
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// Ordered, immutable rule table
#[derive(Debug, Clone, Default)]
pub struct MutatorRules {
    rules: Vec<MutatorRule>,
}

impl MutatorRules {
    /// A table with no rules; every path takes the fallback
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already compiled rules, keeping their order
    pub fn from_rules(rules: Vec<MutatorRule>) -> Self {
        MutatorRules { rules }
    }

    /// Load rules from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleLoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load rules from any line-oriented reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, RuleLoadError> {
        let mut rules = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(rule) = Self::parse_line(&line, idx + 1)? {
                rules.push(rule);
            }
        }
        Ok(MutatorRules { rules })
    }

    /// Load rules from an in-memory string
    pub fn parse(text: &str) -> Result<Self, RuleLoadError> {
        Self::from_reader(text.as_bytes())
    }

    fn parse_line(line: &str, line_no: usize) -> Result<Option<MutatorRule>, RuleLoadError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let mut parts = trimmed.split(RULE_DELIMITER);
        let (pattern, template) = match (parts.next(), parts.next()) {
            (Some(p), Some(t)) => (p.trim(), t.trim()),
            _ => return Err(RuleLoadError::MissingDelimiter { line: line_no }),
        };

        MutatorRule::new(pattern, template)
            .map(Some)
            .map_err(|source| RuleLoadError::InvalidPattern {
                line: line_no,
                pattern: pattern.to_string(),
                source,
            })
    }

    /// First rule in file order whose pattern matches the path
    pub fn first_match(&self, path: &str) -> Option<&MutatorRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutatorRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
