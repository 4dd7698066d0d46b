//! Query Module Tests
//!
//! Validates filter evaluation and the index-aware planner.
//!
//! ## Test Scopes
//! - **Set algebra**: and/or/not compose correctly with and without indexes.
//! - **Like**: `%`/`_` wildcards, escaping, anchoring, non-text attributes.
//! - **Planner**: Indexed and scanned evaluation agree; results are deterministic.

#[cfg(test)]
mod tests {
    use crate::index::extractor::{ExtractError, FnExtractor};
    use crate::index::manager::IndexRegistry;
    use crate::query::filter::Filter;
    use crate::query::planner::QueryPlanner;
    use serde::{Deserialize, Serialize};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: i64,
    }

    fn person(name: &str, age: i64) -> Person {
        Person {
            name: name.to_string(),
            age,
        }
    }

    fn age() -> FnExtractor<Person> {
        FnExtractor::infallible("age", |p: &Person| p.age)
    }

    fn name() -> FnExtractor<Person> {
        FnExtractor::infallible("name", |p: &Person| p.name.clone())
    }

    fn people() -> HashMap<String, Person> {
        HashMap::from([
            ("p1".to_string(), person("alice", 30)),
            ("p2".to_string(), person("bob", 25)),
            ("p3".to_string(), person("carol", 35)),
            ("p4".to_string(), person("albert", 25)),
        ])
    }

    fn keys(result: HashSet<String>) -> Vec<String> {
        let mut keys: Vec<String> = result.into_iter().collect();
        keys.sort();
        keys
    }

    // ============================================================
    // SET ALGEBRA
    // ============================================================

    #[test]
    fn test_equal_filter_scan() {
        let registry = IndexRegistry::new();
        let result = QueryPlanner::evaluate(&Filter::equal(age(), 25), &registry, &people());
        assert_eq!(keys(result), vec!["p2", "p4"]);
    }

    #[test]
    fn test_and_or_not_composition() {
        let registry = IndexRegistry::new();
        let entries = people();

        let young_a = Filter::equal(age(), 25).and(Filter::like(name(), "a%").unwrap());
        assert_eq!(
            keys(QueryPlanner::evaluate(&young_a, &registry, &entries)),
            vec!["p4"]
        );

        let either = Filter::equal(age(), 30).or(Filter::equal(age(), 35));
        assert_eq!(
            keys(QueryPlanner::evaluate(&either, &registry, &entries)),
            vec!["p1", "p3"]
        );

        let not_25 = Filter::equal(age(), 25).not();
        assert_eq!(
            keys(QueryPlanner::evaluate(&not_25, &registry, &entries)),
            vec!["p1", "p3"]
        );
    }

    #[test]
    fn test_not_equal_matches_complement() {
        let registry = IndexRegistry::new();
        let result =
            QueryPlanner::evaluate(&Filter::not_equal(age(), 25), &registry, &people());
        assert_eq!(keys(result), vec!["p1", "p3"]);
    }

    #[test]
    fn test_between_is_inclusive() {
        let registry = IndexRegistry::new();
        let result =
            QueryPlanner::evaluate(&Filter::between(age(), 25, 30), &registry, &people());
        assert_eq!(keys(result), vec!["p1", "p2", "p4"]);
    }

    #[test]
    fn test_always_matches_everything() {
        let registry = IndexRegistry::new();
        let result = QueryPlanner::evaluate(&Filter::Always, &registry, &people());
        assert_eq!(result.len(), 4);
    }

    // ============================================================
    // LIKE PATTERNS
    // ============================================================

    #[test]
    fn test_like_wildcards() {
        let filter = Filter::like(name(), "al%").unwrap();
        assert!(filter.evaluate(&person("alice", 1)).unwrap());
        assert!(filter.evaluate(&person("albert", 1)).unwrap());
        assert!(!filter.evaluate(&person("bob", 1)).unwrap());

        let single = Filter::like(name(), "b_b").unwrap();
        assert!(single.evaluate(&person("bob", 1)).unwrap());
        assert!(!single.evaluate(&person("blob", 1)).unwrap());
    }

    #[test]
    fn test_like_is_anchored() {
        let filter = Filter::like(name(), "lice").unwrap();
        assert!(
            !filter.evaluate(&person("alice", 1)).unwrap(),
            "patterns match the whole text, not a substring"
        );
    }

    #[test]
    fn test_like_escapes_wildcards_and_regex_chars() {
        let filter = Filter::like(name(), "100\\%").unwrap();
        assert!(filter.evaluate(&person("100%", 1)).unwrap());
        assert!(!filter.evaluate(&person("1000", 1)).unwrap());

        let dots = Filter::like(name(), "a.b").unwrap();
        assert!(dots.evaluate(&person("a.b", 1)).unwrap());
        assert!(!dots.evaluate(&person("axb", 1)).unwrap());
    }

    #[test]
    fn test_like_dangling_escape_is_rejected() {
        assert!(Filter::like(name(), "abc\\").is_err());
    }

    #[test]
    fn test_like_on_non_text_attribute_never_matches() {
        let filter = Filter::like(age(), "3%").unwrap();
        assert!(!filter.evaluate(&person("alice", 30)).unwrap());
    }

    // ============================================================
    // PLANNER / INDEX AGREEMENT
    // ============================================================

    #[test]
    fn test_indexed_and_scanned_evaluation_agree() {
        let entries = people();
        let without_index = IndexRegistry::new();
        let with_index = IndexRegistry::new();
        with_index.add_index(Arc::new(age()), true, &entries);

        let filters = vec![
            Filter::equal(age(), 25),
            Filter::greater(age(), 25),
            Filter::greater_equal(age(), 30),
            Filter::less(age(), 35),
            Filter::less_equal(age(), 25),
            Filter::between(age(), 26, 34),
            Filter::equal(age(), 25).and(Filter::like(name(), "%b%").unwrap()),
            Filter::not_equal(age(), 30),
        ];
        for filter in filters {
            let scanned = QueryPlanner::evaluate(&filter, &without_index, &entries);
            let indexed = QueryPlanner::evaluate(&filter, &with_index, &entries);
            assert_eq!(scanned, indexed, "filter {filter:?} must not change results when indexed");
        }
    }

    #[test]
    fn test_range_needs_ordered_index_but_still_answers() {
        let entries = people();
        let registry = IndexRegistry::new();
        registry.add_index(Arc::new(age()), false, &entries);

        // Unordered index: ranges fall back to scanning and stay correct.
        let result = QueryPlanner::evaluate(&Filter::greater(age(), 25), &registry, &entries);
        assert_eq!(keys(result), vec!["p1", "p3"]);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let entries = people();
        let registry = IndexRegistry::new();
        registry.add_index(Arc::new(age()), true, &entries);
        let filter = Filter::between(age(), 20, 40).and(Filter::like(name(), "%a%").unwrap());

        let first = QueryPlanner::evaluate(&filter, &registry, &entries);
        for _ in 0..10 {
            assert_eq!(QueryPlanner::evaluate(&filter, &registry, &entries), first);
        }
    }

    #[test]
    fn test_scan_excludes_failing_entries() {
        let flaky = FnExtractor::new("age", |p: &Person| {
            if p.age < 0 {
                Err(ExtractError::new("unknown age"))
            } else {
                Ok(p.age.into())
            }
        });
        let mut entries = people();
        entries.insert("p5".to_string(), person("dora", -1));

        let registry = IndexRegistry::new();
        let result = QueryPlanner::evaluate(&Filter::not_equal(flaky, 99), &registry, &entries);
        assert_eq!(
            result.len(),
            4,
            "the entry that fails extraction is excluded, not fatal"
        );
    }

    #[test]
    fn test_filter_debug_rendering() {
        let filter = Filter::equal(name(), "alice")
            .and(Filter::between(age(), 20, 40))
            .or(Filter::like(name(), "b%").unwrap().not());
        let rendered = format!("{filter:?}");
        assert!(rendered.contains("Compare(name"), "got: {rendered}");
        assert!(rendered.contains("Between(age"), "got: {rendered}");
        assert!(rendered.contains("Like(name ~ 'b%')"), "got: {rendered}");
    }
}
