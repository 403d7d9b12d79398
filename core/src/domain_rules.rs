//! C9 — Domain rules. Data-driven canned-answer overrides for intents the
//! LLM handles unreliably (e.g. payment-date questions where the model may
//! omit the exact dates). Ordered evaluation over [`DomainRule`]s loaded
//! from configuration; no hard-coded branching per intent in code.

use crate::config::DomainRule;
use crate::models::Source;

/// The outcome of checking a question (and, optionally, a candidate LLM
/// answer) against the configured domain rules.
pub enum RuleOutcome {
    /// No rule matched; proceed with the normal retrieval/LLM flow.
    NoMatch,
    /// A rule matched the question outright — substitute its canned answer
    /// without calling the LLM at all.
    CannedAnswer { text: String, sources: Vec<Source> },
}

/// Evaluates `question` against `rules` in order, returning the first match.
pub fn match_question(question: &str, rules: &[DomainRule]) -> RuleOutcome {
    let lowered = question.to_lowercase();
    for rule in rules {
        if rule
            .intent_patterns
            .iter()
            .any(|pattern| lowered.contains(&pattern.to_lowercase()))
        {
            return RuleOutcome::CannedAnswer {
                text: rule.canned_answer.clone(),
                sources: rule
                    .cited_titles
                    .iter()
                    .enumerate()
                    .map(|(i, title)| Source {
                        title: title.clone(),
                        chunk_index: i as i32,
                        document_id: 0,
                    })
                    .collect(),
            };
        }
    }
    RuleOutcome::NoMatch
}

/// For a question matched by `rule`, checks whether an LLM-produced answer
/// contains the rule's required date tokens. If it does not, the caller
/// should substitute the canned answer instead of trusting the LLM output.
pub fn answer_missing_required_tokens(answer: &str, rule: &DomainRule) -> bool {
    if rule.required_date_tokens.is_empty() {
        return false;
    }
    !rule.required_date_tokens.iter().any(|token| answer.contains(token))
}

/// Finds the first rule (if any) whose broader `post_check_keywords`
/// overlap `question` — the domain post-check (spec §4.8 step 7), run
/// after an LLM call has already been made. Deliberately checks
/// `post_check_keywords`, not `intent_patterns`: a question that already
/// matched `intent_patterns` never reaches this call (it short-circuited
/// in [`match_question`]), so reusing the same field here would make this
/// function unreachable dead code.
pub fn find_matching_rule<'a>(question: &str, rules: &'a [DomainRule]) -> Option<&'a DomainRule> {
    let lowered = question.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.post_check_keywords.iter().any(|k| lowered.contains(&k.to_lowercase())))
}

/// Detects whether `text` contains one of the configured refusal/blocked
/// phrases an LLM sometimes produces (e.g. "I cannot answer that").
pub fn is_blocked_response(text: &str, blocked_patterns: &[String]) -> bool {
    let lowered = text.to_lowercase();
    blocked_patterns.iter().any(|p| lowered.contains(&p.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salary_rule() -> DomainRule {
        DomainRule {
            name: "salary_dates".to_string(),
            intent_patterns: vec!["когда зарплата".to_string(), "when is the salary paid".to_string()],
            canned_answer: "Зарплата выплачивается 12-го и 27-го числа месяца.".to_string(),
            cited_titles: vec!["HR Policy".to_string()],
            post_check_keywords: vec![
                "salary".to_string(),
                "wage".to_string(),
                "payment".to_string(),
                "when".to_string(),
                "date".to_string(),
            ],
            required_date_tokens: vec!["12".to_string(), "27".to_string()],
        }
    }

    #[test]
    fn matches_case_insensitively() {
        let rules = vec![salary_rule()];
        match match_question("WHEN IS THE SALARY PAID around here?", &rules) {
            RuleOutcome::CannedAnswer { text, .. } => assert!(text.contains("12")),
            RuleOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn no_match_falls_through() {
        let rules = vec![salary_rule()];
        assert!(matches!(match_question("how many vacation days do I get", &rules), RuleOutcome::NoMatch));
    }

    #[test]
    fn post_check_reachable_for_questions_that_missed_the_intent_patterns() {
        let rules = vec![salary_rule()];
        let question = "What about my salary this month?";
        // The narrow intent patterns don't fire...
        assert!(matches!(match_question(question, &rules), RuleOutcome::NoMatch));
        // ...but the broader post-check keyword set still picks it up.
        assert!(find_matching_rule(question, &rules).is_some());
    }

    #[test]
    fn detects_missing_required_tokens() {
        let rule = salary_rule();
        assert!(answer_missing_required_tokens("Salary is paid twice a month.", &rule));
        assert!(!answer_missing_required_tokens("Paid on the 12th and 27th.", &rule));
    }

    #[test]
    fn blocked_response_detected() {
        let patterns = vec!["i cannot help with that".to_string()];
        assert!(is_blocked_response("I CANNOT help with that request", &patterns));
        assert!(!is_blocked_response("here is your answer", &patterns));
    }
}
