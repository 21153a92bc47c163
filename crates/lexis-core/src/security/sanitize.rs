//! Markup and template stripping.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("invalid sanitization regex"),
            replacement,
        }
    }
}

/// Applied in order. Blocks go before stray tags so a block's body is removed with it.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new("script_block", r"(?is)<script\b[^>]*>.*?</script\s*>", " "),
        Rule::new("script_tag", r"(?i)</?script\b[^>]*>", " "),
        Rule::new("iframe_block", r"(?is)<iframe\b[^>]*>.*?</iframe\s*>", " "),
        Rule::new("iframe_tag", r"(?i)</?iframe\b[^>]*>", " "),
        Rule::new(
            "event_handler",
            r#"(?i)\s+on[a-z]{3,}\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
            "",
        ),
        Rule::new("javascript_url", r"(?i)javascript\s*:", ""),
        Rule::new("template_expression", r"(?s)\{\{.*?\}\}", " "),
        Rule::new("template_statement", r"(?s)\{%.*?%\}", " "),
        Rule::new("template_interpolation", r"\$\{[^}]*\}", " "),
    ]
});

/// Sanitized text plus how many fragments each rule removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub removals: BTreeMap<&'static str, usize>,
}

/// Strip executable markup and template syntax.
///
/// Passes repeat until nothing matches, so fragments reassembled by an earlier
/// removal (`javajavascript:script:`) are caught and the output is a fixed point.
pub fn sanitize(input: &str) -> Sanitized {
    let mut text = input.to_owned();
    let mut removals = BTreeMap::new();

    loop {
        let mut changed = false;
        for rule in RULES.iter() {
            let hits = rule.pattern.find_iter(&text).count();
            if hits == 0 {
                continue;
            }
            text = rule
                .pattern
                .replace_all(&text, rule.replacement)
                .into_owned();
            *removals.entry(rule.name).or_insert(0) += hits;
            changed = true;
        }
        if !changed {
            break;
        }
    }

    Sanitized { text, removals }
}
