//! Key-pattern gate

use crate::cache::entry::EntryMetadata;
use crate::cache::pattern::KeyPattern;
use crate::cache::strategy::CacheStrategy;

/// Admits keys matching an include pattern and no exclude pattern
///
/// Exclusion wins over inclusion.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    include: Vec<KeyPattern>,
    exclude: Vec<KeyPattern>,
}

impl PatternStrategy {
    pub(crate) fn new(include: Vec<KeyPattern>, exclude: Vec<KeyPattern>) -> Self {
        Self { include, exclude }
    }

    /// Whether a key passes the gate
    pub fn allows(&self, key: &str) -> bool {
        !self.exclude.iter().any(|p| p.matches(key)) && self.include.iter().any(|p| p.matches(key))
    }

    pub fn include(&self) -> &[KeyPattern] {
        &self.include
    }

    pub fn exclude(&self) -> &[KeyPattern] {
        &self.exclude
    }
}

fn join(patterns: &[KeyPattern]) -> String {
    patterns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl CacheStrategy for PatternStrategy {
    fn name(&self) -> String {
        if self.exclude.is_empty() {
            format!("pattern(+[{}])", join(&self.include))
        } else {
            format!(
                "pattern(+[{}] -[{}])",
                join(&self.include),
                join(&self.exclude)
            )
        }
    }

    fn should_admit(&self, candidate: &EntryMetadata, _current: &[EntryMetadata]) -> bool {
        self.allows(&candidate.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(include: &[&str], exclude: &[&str]) -> PatternStrategy {
        PatternStrategy::new(
            KeyPattern::parse_all(include).unwrap(),
            KeyPattern::parse_all(exclude).unwrap(),
        )
    }

    #[test]
    fn test_exclude_wins() {
        let s = strategy(&["user:*"], &["user:secret*"]);
        assert!(s.allows("user:1"));
        assert!(!s.allows("user:secret-token"));
        assert!(!s.allows("session:1"));
        assert_eq!(s.name(), "pattern(+[user:*] -[user:secret*])");
    }

    #[test]
    fn test_regex_include() {
        let s = strategy(&[r"/^img:\d+$/", "doc:"], &[]);
        assert!(s.allows("img:42"));
        assert!(s.allows("doc:readme"));
        assert!(!s.allows("img:x"));
        assert_eq!(s.name(), r"pattern(+[/^img:\d+$/,doc:])");
    }
}
