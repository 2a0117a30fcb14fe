//! # Activation match rules.
//!
//! A [`MatchRule`] decides whether a unit applies to the current
//! [`ActivationContext`] by inspecting its URL:
//! - [`MatchRule::exact`] whole-string equality;
//! - [`MatchRule::glob`] `*` wildcard patterns, matched against the full URL;
//! - [`MatchRule::pattern`] a regular expression, matched anywhere in the URL;
//! - [`MatchRule::predicate`] an arbitrary closure over the whole context.
//!
//! A unit's rule list is evaluated first-match-wins; rules never fail.
//! A panicking predicate is logged and treated as non-matching.
//!
//! # Example
//! ```rust
//! use plugboard::{ActivationContext, MatchRule};
//!
//! let ctx = ActivationContext::new("https://shop.example.com/cart", "demo");
//!
//! assert!(MatchRule::glob("https://shop.example.com/*").matches(&ctx));
//! assert!(MatchRule::exact("https://shop.example.com/cart").matches(&ctx));
//! assert!(!MatchRule::glob("https://admin.example.com/*").matches(&ctx));
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::context::ActivationContext;
use crate::error::panic_text;

/// Predicate over the whole activation context.
pub type ContextPredicate = Arc<dyn Fn(&ActivationContext) -> bool + Send + Sync>;

/// A single activation rule.
#[derive(Clone)]
pub enum MatchRule {
    /// Whole-URL equality.
    Exact(String),
    /// `*` wildcard pattern; must cover the whole URL.
    Glob(String),
    /// Regular expression; matches anywhere in the URL.
    Pattern(Regex),
    /// Arbitrary predicate over the context.
    Predicate(ContextPredicate),
}

impl MatchRule {
    /// Rule matching exactly one URL.
    pub fn exact(url: impl Into<String>) -> Self {
        MatchRule::Exact(url.into())
    }

    /// Rule matching a `*` wildcard pattern against the whole URL.
    pub fn glob(pattern: impl Into<String>) -> Self {
        MatchRule::Glob(pattern.into())
    }

    /// Rule matching a regular expression anywhere in the URL.
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Ok(MatchRule::Pattern(Regex::new(source)?))
    }

    /// Rule delegating to a closure over the whole context.
    pub fn predicate(f: impl Fn(&ActivationContext) -> bool + Send + Sync + 'static) -> Self {
        MatchRule::Predicate(Arc::new(f))
    }

    /// Evaluates the rule against a context. Never fails; a panicking
    /// predicate counts as a non-match.
    pub fn matches(&self, ctx: &ActivationContext) -> bool {
        match self {
            MatchRule::Exact(url) => ctx.url.as_ref() == url,
            MatchRule::Glob(pattern) => glob_match(pattern, &ctx.url),
            MatchRule::Pattern(re) => re.is_match(&ctx.url),
            MatchRule::Predicate(f) => {
                catch_unwind(AssertUnwindSafe(|| f(ctx))).unwrap_or_else(|payload| {
                    warn!(
                        url = %ctx.url,
                        "match predicate panicked, treating as non-match: {}",
                        panic_text(payload.as_ref())
                    );
                    false
                })
            }
        }
    }
}

impl fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::Exact(url) => f.debug_tuple("Exact").field(url).finish(),
            MatchRule::Glob(pattern) => f.debug_tuple("Glob").field(pattern).finish(),
            MatchRule::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            MatchRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Matches `text` against a `*` wildcard pattern covering the whole string.
///
/// Classic two-pointer scan with backtracking to the last star. Only `*` is
/// special; every other character matches literally.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
