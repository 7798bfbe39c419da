use hashbrown::HashMap;

/// Dense position of a cell inside the synaptic tensors.
pub type CellNum = usize;

/// Bidirectional mapping between cell identifiers and dense indices.
///
/// Two explicit maps are kept in lockstep: name to index and index to
/// name. Indices are assigned in registration order and are never
/// reused or reassigned; there is no removal.
#[derive(Debug, Clone, Default)]
pub struct CellIndex {
    by_name: HashMap<String, CellNum>,
    names: Vec<String>,
}

impl CellIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the existing index if `id` is already known, otherwise
    /// assigns the next free one. Idempotent.
    pub fn register(&mut self, id: &str) -> CellNum {
        if let Some(&num) = self.by_name.get(id) {
            return num;
        }
        let num = self.names.len();
        self.names.push(id.to_string());
        self.by_name.insert(id.to_string(), num);
        num
    }

    pub fn get(&self, id: &str) -> Option<CellNum> {
        self.by_name.get(id).copied()
    }

    pub fn name(&self, num: CellNum) -> Option<&str> {
        self.names.get(num).map(|s| s.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_name.contains_key(id)
    }

    /// All identifiers in dense index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_dense_increasing_indices() {
        let mut index = CellIndex::new();
        assert_eq!(index.register("a"), 0);
        assert_eq!(index.register("b"), 1);
        assert_eq!(index.register("c"), 2);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn register_is_idempotent() {
        let mut index = CellIndex::new();
        let first = index.register("a");
        index.register("b");
        assert_eq!(index.register("a"), first);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn lookups_roundtrip() {
        let mut index = CellIndex::new();
        index.register("light");
        index.register("reward");

        assert_eq!(index.get("reward"), Some(1));
        assert_eq!(index.name(1), Some("reward"));
        assert_eq!(index.get("missing"), None);
        assert_eq!(index.name(7), None);
        assert!(index.contains("light"));
        assert!(!index.contains("dark"));
    }
}
