use std::sync::Arc;

use calibra_core::scorer_api::Scorer;

mod exact_match;
mod field_f1;

pub use exact_match::ExactMatchScorer;
pub use field_f1::{field_counts, FieldCounts, FieldF1Scorer};

pub fn default_scorer() -> Arc<dyn Scorer> {
    Arc::new(FieldF1Scorer)
}

pub fn default_scorers() -> Vec<Arc<dyn Scorer>> {
    vec![Arc::new(FieldF1Scorer), Arc::new(ExactMatchScorer)]
}

pub fn scorer_by_name(name: &str) -> Option<Arc<dyn Scorer>> {
    default_scorers().into_iter().find(|s| s.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(default_scorer().name(), "field_f1");
        assert!(scorer_by_name("exact_match").is_some());
        assert!(scorer_by_name("bleu").is_none());
    }
}
