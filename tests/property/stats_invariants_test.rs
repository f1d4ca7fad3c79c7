// tests/property/stats_invariants_test.rs

//! Property-based tests for the statistics aggregator.

use cachebus::core::bus::StatsAggregator;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_min_avg_max_ordering(
        samples in prop::collection::vec((0u64..100_000, 0u64..100_000), 1..100)
    ) {
        let mut stats = StatsAggregator::new(u64::MAX);
        for (tx_ms, px_ms) in &samples {
            stats.record("g7", "OBJECT_RESET", *tx_ms, *px_ms);
        }

        let slot = stats.slot("g7").unwrap();
        prop_assert!(slot.tx_min <= slot.tx_avg());
        prop_assert!(slot.tx_avg() <= slot.tx_max);
        prop_assert!(slot.px_min <= slot.px_avg());
        prop_assert!(slot.px_avg() <= slot.px_max);
        prop_assert_eq!(slot.count, samples.len() as u64);
    }

    #[test]
    fn test_sums_and_extrema_match_the_inputs(
        samples in prop::collection::vec((0u64..100_000, 0u64..100_000), 1..100)
    ) {
        let mut stats = StatsAggregator::new(u64::MAX);
        for (tx_ms, px_ms) in &samples {
            stats.record("r3", "ADD_ALL", *tx_ms, *px_ms);
        }

        let slot = stats.slot("r3").unwrap();
        prop_assert_eq!(slot.tx_sum, samples.iter().map(|(tx, _)| tx).sum::<u64>());
        prop_assert_eq!(slot.px_sum, samples.iter().map(|(_, px)| px).sum::<u64>());
        prop_assert_eq!(slot.tx_min, *samples.iter().map(|(tx, _)| tx).min().unwrap());
        prop_assert_eq!(slot.tx_max, *samples.iter().map(|(tx, _)| tx).max().unwrap());
    }

    #[test]
    fn test_keys_partition_the_traffic(
        samples in prop::collection::vec((0u64..8, 0u64..1_000), 1..200)
    ) {
        let mut stats = StatsAggregator::new(u64::MAX);
        for (group, latency) in &samples {
            stats.record(&format!("g{group}"), "GROUP_RESET", *latency, *latency);
        }

        let mut accounted = 0;
        for group in 0..8u64 {
            if let Some(slot) = stats.slot(&format!("g{group}")) {
                accounted += slot.count;
            }
        }
        prop_assert_eq!(accounted, samples.len() as u64);
    }

    #[test]
    fn test_flush_always_leaves_an_empty_window(
        samples in prop::collection::vec((0u64..1_000, 0u64..1_000), 0..50)
    ) {
        let mut stats = StatsAggregator::new(10);
        for (tx_ms, px_ms) in &samples {
            stats.record("g1", "OBJECT_RESET", *tx_ms, *px_ms);
        }
        stats.flush();
        prop_assert!(stats.is_empty());
        prop_assert_eq!(stats.collection_ms(), 0);
    }
}
