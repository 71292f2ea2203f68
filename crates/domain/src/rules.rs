//! Ad-block-style DNS rule grammar.
//!
//! Grammar subset supported:
//!   - bare hostname: `block.test`
//!   - anchored hostname: `||block.test^` (this label or any subdomain)
//!   - qtype modifier: `$dnstype=AAAA` or `$dnstype=A|AAAA`
//!   - exception (whitelist) prefix: `@@||allow.test^`
//!
//! This is a distinct, richer grammar than an established
//! `block_filter::compiler` line format (hosts-file / `*.wildcard` /
//! `/substring/`), which cannot express anchors, qtype modifiers, or
//! exceptions; it supplements rather than replaces that format. The
//! line-parsing idiom (trim, skip blank/`#`/`!`, lowercase canonicalization)
//! is carried over from `block_filter::compiler::parse_list_line`.

use hickory_proto::rr::RecordType;
use std::sync::Arc;

/// One compiled rule (domain-layer AST; the infrastructure layer indexes
/// these into a fast matcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Canonicalized (lowercase) hostname pattern, without the `||`/`^`
    /// anchor markers.
    pub pattern: Arc<str>,
    /// `||pattern^`: matches `pattern` itself or any subdomain of it.
    /// Bare `pattern`: matches only the exact hostname.
    pub anchored: bool,
    /// `$dnstype=A|AAAA`: restricts the rule to these qtypes. `None` means
    /// unrestricted (matches any qtype).
    pub qtypes: Option<Arc<[RecordType]>>,
    /// `@@` prefix: this is an exception (whitelist) rule.
    pub exception: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rule line: {0}")]
pub struct RuleParseError(pub String);

/// Parse one rule line. Returns `Ok(None)` for blank lines and comments
/// (`#`, `!`), matching an established `parse_list_line` convention.
pub fn parse_rule_line(line: &str) -> Result<Option<Rule>, RuleParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return Ok(None);
    }

    let (exception, rest) = match line.strip_prefix("@@") {
        Some(rest) => (true, rest),
        None => (false, line),
    };

    let (body, modifier) = match rest.split_once('$') {
        Some((body, modifier)) => (body, Some(modifier)),
        None => (rest, None),
    };

    let qtypes = match modifier {
        Some(modifier) => Some(parse_dnstype_modifier(modifier)?),
        None => None,
    };

    let (anchored, pattern) = match body.strip_prefix("||") {
        Some(anchored_body) => {
            let pattern = anchored_body
                .strip_suffix('^')
                .unwrap_or(anchored_body);
            (true, pattern)
        }
        None => (false, body),
    };

    if pattern.is_empty() {
        return Err(RuleParseError(format!("empty pattern in rule: {line}")));
    }

    Ok(Some(Rule {
        pattern: Arc::from(pattern.to_ascii_lowercase().as_str()),
        anchored,
        qtypes,
        exception,
    }))
}

fn parse_dnstype_modifier(modifier: &str) -> Result<Arc<[RecordType]>, RuleParseError> {
    let key_value = modifier
        .strip_prefix("dnstype=")
        .ok_or_else(|| RuleParseError(format!("unsupported modifier: {modifier}")))?;

    let types = key_value
        .split('|')
        .map(|t| {
            t.trim()
                .parse::<RecordType>()
                .map_err(|_| RuleParseError(format!("unknown qtype in modifier: {t}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if types.is_empty() {
        return Err(RuleParseError("empty $dnstype modifier".to_string()));
    }

    Ok(Arc::from(types))
}

/// Parse every line of a rule-set text, skipping blanks/comments. A line
/// that fails to parse is itself an error: compilation errors are fatal
/// at construction time for static blocklists.
pub fn parse_rule_text(text: &str) -> Result<Vec<Rule>, RuleParseError> {
    text.lines().filter_map(|l| parse_rule_line(l).transpose()).collect()
}
