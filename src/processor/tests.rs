//! Processor Module Tests
//!
//! Validates entry-processor semantics and the built-in aggregators.
//!
//! ## Test Scopes
//! - **Staging**: A `ProcessorEntry` exposes staged state; nothing commits on failure.
//! - **Fan-out**: `invoke_all` fails per key, never globally.
//! - **Aggregation**: Partials combine into correct, weight-aware results.

#[cfg(test)]
mod tests {
    use crate::cache::service::CacheService;
    use crate::config::GridConfig;
    use crate::error::GridError;
    use crate::index::extractor::FnExtractor;
    use crate::processor::aggregator::{
        Aggregator, AttributeAverage, AttributeMax, AttributeMin, Count,
    };
    use crate::processor::types::{FnProcessor, ProcessorEntry};
    use crate::query::filter::Filter;
    use crate::security::Principal;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Reading {
        sensor: String,
        celsius: f64,
    }

    fn reading(sensor: &str, celsius: f64) -> Reading {
        Reading {
            sensor: sensor.to_string(),
            celsius,
        }
    }

    fn celsius() -> Arc<FnExtractor<Reading>> {
        Arc::new(FnExtractor::infallible("celsius", |r: &Reading| r.celsius))
    }

    // ============================================================
    // PROCESSOR ENTRY STAGING
    // ============================================================

    #[test]
    fn test_entry_view_reflects_staged_value() {
        let mut entry: ProcessorEntry<String, Reading> =
            ProcessorEntry::new("s1".to_string(), Some(reading("s1", 20.0)));
        assert!(entry.is_present());
        assert_eq!(entry.value().map(|r| r.celsius), Some(20.0));

        entry.set_value(reading("s1", 21.5));
        assert_eq!(entry.value().map(|r| r.celsius), Some(21.5));

        entry.remove();
        assert!(!entry.is_present());
    }

    // ============================================================
    // FAN-OUT
    // ============================================================

    #[tokio::test]
    async fn test_invoke_all_fails_per_key() {
        let service: Arc<CacheService<String, Reading>> =
            CacheService::new("telemetry", GridConfig::default());
        let cache = service.cache("readings", Principal::new("test"));
        for i in 0..10 {
            cache
                .put(format!("s{i}"), reading(&format!("s{i}"), i as f64))
                .await
                .unwrap();
        }

        // Sensors 2, 5, 8 are rejected by the processor; the others update.
        let processor = Arc::new(FnProcessor::new(
            |entry: &mut ProcessorEntry<String, Reading>| {
                let current = entry
                    .value()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("missing entry"))?;
                if matches!(entry.key().as_str(), "s2" | "s5" | "s8") {
                    anyhow::bail!("sensor offline");
                }
                entry.set_value(reading(&current.sensor, current.celsius + 1.0));
                Ok(current.celsius)
            },
        ));
        let outcome = cache.invoke_all(&Filter::Always, processor).await.unwrap();

        assert!(!outcome.is_fully_successful());
        assert_eq!(outcome.results.len(), 7);
        let mut failed: Vec<&str> = outcome.errors.keys().map(|k| k.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["s2", "s5", "s8"]);
        assert!(outcome
            .errors
            .values()
            .all(|e| matches!(e, GridError::ProcessorFailed { .. })));

        // Failed keys are untouched, successful keys committed.
        assert_eq!(
            cache.get(&"s2".to_string()).await.unwrap().map(|r| r.celsius),
            Some(2.0)
        );
        assert_eq!(
            cache.get(&"s3".to_string()).await.unwrap().map(|r| r.celsius),
            Some(4.0)
        );
    }

    // ============================================================
    // AGGREGATORS
    // ============================================================

    #[tokio::test]
    async fn test_count_min_max_over_filter() {
        let service: Arc<CacheService<String, Reading>> =
            CacheService::new("telemetry", GridConfig::default());
        let cache = service.cache("readings", Principal::new("test"));
        for (i, temp) in [12.0, 18.5, 31.0, 24.0, -3.5].iter().enumerate() {
            cache
                .put(format!("s{i}"), reading(&format!("s{i}"), *temp))
                .await
                .unwrap();
        }

        let count = cache
            .aggregate(&Filter::greater(FnExtractor::infallible("celsius", |r: &Reading| r.celsius), 0.0), Arc::new(Count))
            .await
            .unwrap();
        assert_eq!(count, 4);

        let min = cache
            .aggregate(&Filter::Always, Arc::new(AttributeMin::new(celsius())))
            .await
            .unwrap();
        assert_eq!(min.and_then(|v| v.as_f64()), Some(-3.5));

        let max = cache
            .aggregate(&Filter::Always, Arc::new(AttributeMax::new(celsius())))
            .await
            .unwrap();
        assert_eq!(max.and_then(|v| v.as_f64()), Some(31.0));
    }

    #[tokio::test]
    async fn test_average_is_weighted_across_partitions() {
        let service: Arc<CacheService<String, Reading>> =
            CacheService::new("telemetry", GridConfig::default());
        let cache = service.cache("readings", Principal::new("test"));

        // One hot outlier among 99 zero readings. A mean of per-partition
        // means would overweight the outlier's partition; the true mean is 1.
        cache.put("hot".to_string(), reading("hot", 100.0)).await.unwrap();
        for i in 0..99 {
            cache
                .put(format!("cold{i}"), reading(&format!("cold{i}"), 0.0))
                .await
                .unwrap();
        }

        let mean = cache
            .aggregate(&Filter::Always, Arc::new(AttributeAverage::new(celsius())))
            .await
            .unwrap();
        assert_eq!(mean, Some(1.0));
    }

    #[test]
    fn test_average_of_empty_population_is_none() {
        let aggregator = AttributeAverage::new(celsius());
        let partial = Aggregator::<String, Reading>::initial(&aggregator);
        assert_eq!(Aggregator::<String, Reading>::finish(&aggregator, partial), None);
    }

    #[test]
    fn test_partials_combine_associatively() {
        let aggregator = AttributeAverage::new(celsius());
        let mut a = Aggregator::<String, Reading>::initial(&aggregator);
        let mut b = Aggregator::<String, Reading>::initial(&aggregator);
        Aggregator::<String, Reading>::accumulate(
            &aggregator,
            &mut a,
            &"k1".to_string(),
            &reading("k1", 10.0),
        );
        Aggregator::<String, Reading>::accumulate(
            &aggregator,
            &mut b,
            &"k2".to_string(),
            &reading("k2", 20.0),
        );
        Aggregator::<String, Reading>::accumulate(
            &aggregator,
            &mut b,
            &"k3".to_string(),
            &reading("k3", 30.0),
        );

        let combined = Aggregator::<String, Reading>::combine(&aggregator, a, b);
        assert_eq!(
            Aggregator::<String, Reading>::finish(&aggregator, combined),
            Some(20.0)
        );
    }
}
