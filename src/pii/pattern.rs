//! Local regular-expression PII detector.

use super::traits::{PiiDetector, PiiEntity};
use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

struct Rule {
    category: &'static str,
    confidence: f64,
    regex: Regex,
    check: fn(&str) -> bool,
}

fn always(_: &str) -> bool {
    true
}

/// Luhn checksum over the digits of a candidate card number.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

fn octets_valid(candidate: &str) -> bool {
    candidate
        .split('.')
        .all(|octet| octet.parse::<u16>().is_ok_and(|n| n <= 255))
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |category, confidence, pattern: &str, check| Rule {
            category,
            confidence,
            regex: Regex::new(pattern).expect("built-in PII pattern must compile"),
            check,
        };
        vec![
            rule(
                "Email",
                0.95,
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                always,
            ),
            rule(
                "CreditCardNumber",
                0.9,
                r"\b(?:\d[ -]?){12,18}\d\b",
                luhn_valid,
            ),
            rule(
                "USSocialSecurityNumber",
                0.85,
                r"\b\d{3}-\d{2}-\d{4}\b",
                always,
            ),
            rule(
                "PhoneNumber",
                0.8,
                r"(?:\+?1[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]\d{4}\b",
                always,
            ),
            rule(
                "IPAddress",
                0.8,
                r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
                octets_valid,
            ),
        ]
    })
}

/// Detects common PII shapes without a remote service.
///
/// Confidences are fixed per category. Overlapping matches from different
/// rules are all reported; the sanitizer resolves overlaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous scan, shared with the fuzz target.
    pub fn scan(text: &str) -> Vec<PiiEntity> {
        let mut found = Vec::new();
        for rule in rules() {
            for m in rule.regex.find_iter(text) {
                if (rule.check)(m.as_str()) {
                    found.push(PiiEntity::new(
                        rule.category,
                        m.start(),
                        m.end(),
                        rule.confidence,
                    ));
                }
            }
        }
        found
    }
}

#[async_trait]
impl PiiDetector for PatternDetector {
    async fn detect(&self, text: &str) -> Result<Vec<PiiEntity>> {
        Ok(Self::scan(text))
    }

    fn name(&self) -> &str {
        "pattern"
    }
}
