//! Pure rule matching over extracted post text.
//!
//! The matcher decides, without side effects, whether one element's
//! candidate strings (author handle, body texts) are claimed by a rule.
//! Regular-expression phrases compile case-insensitive and multi-line, and
//! compilations are memoized per distinct phrase for the matcher's
//! lifetime. An edited phrase is simply a new cache key; entries for
//! deleted phrases are harmless and never evicted.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::{Error, Result};
use crate::rules::{BlockedRule, GlobalSettings};

/// The outcome of evaluating one element against the rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The element is authored by the viewer and exempt from all rules.
    Exempt,
    /// The rule at this index (stored order) claimed the element.
    Rule(usize),
    /// No rule matched.
    NoMatch,
}

/// Compile a rule phrase the way matching interprets it.
///
/// # Errors
///
/// Returns [`Error::InvalidRule`] if the phrase is not a valid regular
/// expression.
pub fn compile_phrase(phrase: &str) -> Result<Regex> {
    RegexBuilder::new(phrase)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|source| Error::invalid_rule(phrase, source))
}

/// Validate a rule list before it is saved.
///
/// Every regex rule must compile; the first failure aborts with an error
/// naming the offending phrase. Literal rules are always valid.
///
/// # Errors
///
/// Returns [`Error::InvalidRule`] for the first phrase that fails to
/// compile.
pub fn validate_rules(rules: &[BlockedRule]) -> Result<()> {
    for rule in rules {
        if rule.use_regex {
            compile_phrase(&rule.phrase)?;
        }
    }
    Ok(())
}

/// Rule evaluator with a memoized regex cache.
#[derive(Debug, Default)]
pub struct Matcher {
    cache: Mutex<HashMap<String, Regex>>,
}

impl Matcher {
    /// Create a matcher with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a single rule against a single candidate string.
    ///
    /// Literal phrases match by substring containment; regex phrases match
    /// case-insensitively across lines. A stored phrase that no longer
    /// compiles (it slipped past save-time validation) is logged and never
    /// matches.
    #[must_use]
    pub fn rule_matches(&self, rule: &BlockedRule, candidate: &str) -> bool {
        if !rule.use_regex {
            return candidate.contains(&rule.phrase);
        }
        match self.compiled(&rule.phrase) {
            Some(re) => re.is_match(candidate),
            None => false,
        }
    }

    /// Evaluate one element's candidates against the rule list.
    ///
    /// The author handle is evaluated before any body text: a post authored
    /// by the viewer is exempt no matter what its body contains, and only
    /// rules with `filter_username` apply to the handle. Rules are walked
    /// in stored order and the first match wins.
    #[must_use]
    pub fn evaluate<S: AsRef<str>>(
        &self,
        rules: &[BlockedRule],
        settings: &GlobalSettings,
        author: Option<&str>,
        bodies: &[S],
    ) -> MatchOutcome {
        if let Some(author) = author {
            if settings.is_own_handle(author) {
                return MatchOutcome::Exempt;
            }
            for (idx, rule) in rules.iter().enumerate() {
                if rule.filter_username && self.rule_matches(rule, author) {
                    return MatchOutcome::Rule(idx);
                }
            }
        }
        for body in bodies {
            for (idx, rule) in rules.iter().enumerate() {
                if self.rule_matches(rule, body.as_ref()) {
                    return MatchOutcome::Rule(idx);
                }
            }
        }
        MatchOutcome::NoMatch
    }

    fn compiled(&self, phrase: &str) -> Option<Regex> {
        let mut cache = self.cache.lock().expect("regex cache poisoned");
        if let Some(re) = cache.get(phrase) {
            return Some(re.clone());
        }
        match compile_phrase(phrase) {
            Ok(re) => {
                cache.insert(phrase.to_string(), re.clone());
                Some(re)
            }
            Err(err) => {
                warn!(phrase = %phrase, error = %err, "stored rule phrase does not compile");
                None
            }
        }
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().expect("regex cache poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(username: Option<&str>) -> GlobalSettings {
        GlobalSettings {
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn test_literal_match_is_substring() {
        let m = Matcher::new();
        let rule = BlockedRule::literal("spoiler");
        assert!(m.rule_matches(&rule, "big spoiler ahead"));
        assert!(!m.rule_matches(&rule, "harmless"));
    }

    #[test]
    fn test_literal_match_is_case_sensitive() {
        let m = Matcher::new();
        let rule = BlockedRule::literal("Spoiler");
        assert!(!m.rule_matches(&rule, "big spoiler ahead"));
    }

    #[test]
    fn test_regex_match_case_insensitive_multiline() {
        let m = Matcher::new();
        let rule = BlockedRule::regex("^rt @");
        assert!(m.rule_matches(&rule, "RT @someone: hi"));
        assert!(m.rule_matches(&rule, "first line\nRT @other"));
        assert!(!m.rule_matches(&rule, "about RT @someone"));
    }

    #[test]
    fn test_invalid_stored_regex_never_matches() {
        let m = Matcher::new();
        let rule = BlockedRule::regex("[unclosed");
        assert!(!m.rule_matches(&rule, "anything [unclosed"));
    }

    #[test]
    fn test_compile_phrase_rejects_invalid() {
        let err = compile_phrase("[unclosed").unwrap_err();
        assert!(err.is_invalid_rule());
    }

    #[test]
    fn test_validate_rules_skips_literals() {
        // A literal phrase that would be an invalid regex is fine.
        let rules = vec![BlockedRule::literal("[unclosed")];
        assert!(validate_rules(&rules).is_ok());
    }

    #[test]
    fn test_validate_rules_rejects_bad_regex() {
        let rules = vec![
            BlockedRule::literal("fine"),
            BlockedRule::regex("(good)"),
            BlockedRule::regex("[bad"),
        ];
        let err = validate_rules(&rules).unwrap_err();
        assert!(err.to_string().contains("[bad"));
    }

    #[test]
    fn test_first_match_wins() {
        let m = Matcher::new();
        let rules = vec![BlockedRule::literal("spoiler"), BlockedRule::literal("ahead")];
        let outcome = m.evaluate(&rules, &settings_with(None), None, &["big spoiler ahead"]);
        assert_eq!(outcome, MatchOutcome::Rule(0));
    }

    #[test]
    fn test_no_match() {
        let m = Matcher::new();
        let rules = vec![BlockedRule::literal("spoiler")];
        let outcome = m.evaluate(&rules, &settings_with(None), None, &["all clear"]);
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[test]
    fn test_username_rule_requires_flag() {
        let m = Matcher::new();
        let rules = vec![BlockedRule::literal("bob")];
        // Rule without filter_username ignores the handle.
        let outcome = m.evaluate(&rules, &settings_with(None), Some("bob"), &[] as &[&str]);
        assert_eq!(outcome, MatchOutcome::NoMatch);

        let rules = vec![BlockedRule::literal("bob").with_username_filter()];
        let outcome = m.evaluate(&rules, &settings_with(None), Some("bob"), &[] as &[&str]);
        assert_eq!(outcome, MatchOutcome::Rule(0));
    }

    #[test]
    fn test_own_handle_exempts_regardless_of_body() {
        let m = Matcher::new();
        let rules = vec![
            BlockedRule::literal("bob").with_username_filter(),
            BlockedRule::literal("spoiler"),
        ];
        let outcome = m.evaluate(
            &rules,
            &settings_with(Some("bob")),
            Some("bob"),
            &["big spoiler ahead"],
        );
        assert_eq!(outcome, MatchOutcome::Exempt);
    }

    #[test]
    fn test_username_evaluated_before_body() {
        let m = Matcher::new();
        // The body would match rule 0, but the handle matches rule 1 first
        // because author candidates are evaluated before body candidates.
        let rules = vec![
            BlockedRule::literal("spoiler"),
            BlockedRule::literal("troll").with_username_filter(),
        ];
        let outcome = m.evaluate(
            &rules,
            &settings_with(None),
            Some("troll_account"),
            &["big spoiler ahead"],
        );
        assert_eq!(outcome, MatchOutcome::Rule(1));
    }

    #[test]
    fn test_multiple_bodies_any_match() {
        let m = Matcher::new();
        let rules = vec![BlockedRule::literal("spoiler")];
        let outcome = m.evaluate(
            &rules,
            &settings_with(None),
            None,
            &["clean text", "a spoiler here"],
        );
        assert_eq!(outcome, MatchOutcome::Rule(0));
    }

    #[test]
    fn test_regex_cache_memoizes_per_phrase() {
        let m = Matcher::new();
        let rule = BlockedRule::regex("^RT @");
        assert!(m.rule_matches(&rule, "RT @a"));
        assert!(m.rule_matches(&rule, "RT @b"));
        assert_eq!(m.cache_len(), 1);

        // A different phrase is a new cache key; the old entry stays.
        let other = BlockedRule::regex("^QT @");
        let _ = m.rule_matches(&other, "QT @a");
        assert_eq!(m.cache_len(), 2);
    }

    #[test]
    fn test_empty_rule_list_no_match() {
        let m = Matcher::new();
        let outcome = m.evaluate(&[], &settings_with(None), Some("bob"), &["anything"]);
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }
}
