//! Domain-rule matcher (C1).
//!
//! The anchored-pattern structure is grounded on an established
//! `block_filter::suffix_trie::SuffixTrie` (reversed-label trie, compiled
//! once and read concurrently). It differs from an established trie in one
//! way: an established `*.pattern` wildcard requires at least one subdomain
//! label beyond the match (`*.ads.com` matches `sub.ads.com` but not
//! `ads.com`); this crate's `||pattern^` anchor matches the pattern itself
//! **or** any subdomain, so a match is recorded at the terminal node
//! regardless of remaining label count.
//!
//! Lazy compilation (large rule sets should not pay startup cost for unused
//! profiles) uses `OnceLock` as a one-shot guard, replacing an established
//! `ArcSwap`-guarded index (here rule sets are rebuilt wholesale rather
//! than patched in place, so a single-assignment cell is sufficient).

use ferrous_dns_domain::{parse_rule_text, DomainError, Rule, RuleParseError};
use hickory_proto::rr::RecordType;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub matched: bool,
    pub whitelisted: bool,
}

impl RuleMatch {
    pub const NONE: RuleMatch = RuleMatch {
        matched: false,
        whitelisted: false,
    };

    /// The blocker's final verdict: matched and not overridden by a
    /// whitelist exception.
    pub fn is_blocked(self) -> bool {
        self.matched && !self.whitelisted
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    qtypes: Option<std::sync::Arc<[RecordType]>>,
    exception: bool,
}

impl CompiledRule {
    fn applies_to(&self, qtype: RecordType) -> bool {
        match &self.qtypes {
            Some(types) => types.contains(&qtype),
            None => true,
        }
    }
}

#[derive(Default)]
struct TrieNode {
    children: FxHashMap<String, TrieNode>,
    /// Rules anchored at this node, applying to this label and every
    /// subdomain beneath it.
    subtree_rules: Vec<CompiledRule>,
}

/// The compiled rule index: built once from a `Rule` list, read
/// concurrently thereafter.
pub struct RuleIndex {
    exact: FxHashMap<String, Vec<CompiledRule>>,
    anchored: TrieNode,
}

impl RuleIndex {
    pub fn compile(rules: &[Rule]) -> Self {
        let mut exact: FxHashMap<String, Vec<CompiledRule>> = FxHashMap::default();
        let mut anchored = TrieNode::default();

        for rule in rules {
            let compiled = CompiledRule {
                qtypes: rule.qtypes.clone(),
                exception: rule.exception,
            };
            if rule.anchored {
                let mut node = &mut anchored;
                for label in rule.pattern.split('.').rev() {
                    node = node.children.entry(label.to_string()).or_default();
                }
                node.subtree_rules.push(compiled);
            } else {
                exact.entry(rule.pattern.to_string()).or_default().push(compiled);
            }
        }

        Self { exact, anchored }
    }

    /// Evaluate `(host, qtype)` against the compiled rule set. `host` must
    /// already be lowercased ( invariant 2: matching is
    /// case-insensitive, achieved by canonicalizing both sides to
    /// lowercase rather than comparing case-insensitively per call).
    pub fn eval(&self, host: &str, qtype: RecordType) -> RuleMatch {
        let mut best: Option<&CompiledRule> = None;

        let labels: Vec<&str> = host.split('.').rev().collect();
        let n = labels.len();
        let mut node = &self.anchored;
        for (i, label) in labels.iter().enumerate() {
            let Some(child) = node.children.get(*label) else {
                break;
            };
            node = child;
            if let Some(r) = most_specific(&node.subtree_rules, qtype) {
                best = Some(r);
            }
            let _ = i;
            if i + 1 == n {
                if let Some(rules) = self.exact.get(host) {
                    if let Some(r) = most_specific(rules, qtype) {
                        best = Some(r);
                    }
                }
            }
        }

        // A host with no anchored-prefix overlap can still have an exact
        // rule (e.g. the rule set contains only bare patterns).
        if best.is_none() {
            if let Some(rules) = self.exact.get(host) {
                best = most_specific(rules, qtype);
            }
        }

        match best {
            Some(r) if r.exception => RuleMatch {
                matched: false,
                whitelisted: true,
            },
            Some(_) => RuleMatch {
                matched: true,
                whitelisted: false,
            },
            None => RuleMatch::NONE,
        }
    }
}

/// Among same-depth rules, an exception always wins over a plain block —
/// ad-block convention for co-located `@@` overrides.
fn most_specific(rules: &[CompiledRule], qtype: RecordType) -> Option<&CompiledRule> {
    let applicable: Vec<&CompiledRule> = rules.iter().filter(|r| r.applies_to(qtype)).collect();
    applicable
        .iter()
        .find(|r| r.exception)
        .or_else(|| applicable.first())
        .copied()
}

/// A rule set that compiles itself lazily on first use, guarded by a
/// single-assignment cell. The compile latency is handed to the caller
/// (typically fed into `CoreMetricsPort::observe_profile_init`).
pub struct LazyRuleIndex {
    source: Vec<Rule>,
    compiled: OnceLock<RuleIndex>,
}

impl LazyRuleIndex {
    pub fn from_lines(text: &str) -> Result<Self, RuleParseError> {
        Ok(Self {
            source: parse_rule_text(text)?,
            compiled: OnceLock::new(),
        })
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self {
            source: rules,
            compiled: OnceLock::new(),
        }
    }

    /// Force compilation, returning the elapsed build latency if this call
    /// performed the (one-shot) build.
    pub fn ensure_compiled(&self) -> Option<std::time::Duration> {
        if self.compiled.get().is_some() {
            return None;
        }
        let start = Instant::now();
        let index = RuleIndex::compile(&self.source);
        let _ = self.compiled.set(index);
        Some(start.elapsed())
    }

    pub fn eval(&self, host: &str, qtype: RecordType) -> RuleMatch {
        self.ensure_compiled();
        match self.compiled.get() {
            Some(index) => index.eval(host, qtype),
            None => RuleMatch::NONE,
        }
    }
}

/// Build a `RuleIndex` eagerly from raw rule-set text, surfacing a
/// compilation error
/// construction time for static blocklists").
pub fn compile_eager(text: &str) -> Result<RuleIndex, DomainError> {
    let rules = parse_rule_text(text).map_err(|e| DomainError::RuleCompile(e.0))?;
    Ok(RuleIndex::compile(&rules))
}
