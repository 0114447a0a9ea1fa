//! Type gate

use crate::cache::entry::{EntryMetadata, TypeTag};
use crate::cache::strategy::CacheStrategy;

/// Admits only values whose type tag is in the allowed set
#[derive(Debug, Clone)]
pub struct TypeBasedStrategy {
    /// Sorted by name, no duplicates
    allowed: Vec<TypeTag>,
}

impl TypeBasedStrategy {
    pub(crate) fn new(allowed: impl IntoIterator<Item = TypeTag>) -> Self {
        let mut allowed: Vec<TypeTag> = allowed.into_iter().collect();
        allowed.sort_by_key(|t| t.as_str());
        allowed.dedup();
        Self { allowed }
    }

    pub fn allowed(&self) -> &[TypeTag] {
        &self.allowed
    }
}

impl CacheStrategy for TypeBasedStrategy {
    fn name(&self) -> String {
        let names: Vec<&str> = self.allowed.iter().map(TypeTag::as_str).collect();
        format!("type({})", names.join(","))
    }

    fn should_admit(&self, candidate: &EntryMetadata, _current: &[EntryMetadata]) -> bool {
        self.allowed.contains(&candidate.type_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::strategy::test_support::meta;

    #[test]
    fn test_allowed_types() {
        let strategy =
            TypeBasedStrategy::new([TypeTag::String, TypeTag::Object, TypeTag::String]);
        assert_eq!(strategy.name(), "type(object,string)");

        let mut m = meta("k", 0, 1);
        assert_eq!(m.type_tag, TypeTag::String);
        assert!(strategy.should_admit(&m, &[]));

        m.type_tag = TypeTag::Binary;
        assert!(!strategy.should_admit(&m, &[]));
    }
}
