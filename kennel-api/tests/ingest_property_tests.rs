//! Property-Based Tests for Page Ingestion
//!
//! For any upstream payload of valid and corrupt records, one ingestion pass
//! over a previously populated page must leave either exactly the records
//! that pass validation, in upstream order, or the previous content when
//! nothing passes. The known page count never shrinks.

mod support;

use kennel_api::{never_shutdown, PageRange};
use kennel_core::{validate_page, RunKind};
use kennel_test_utils::{fixtures, generators::arb_page_payload, ScriptedUpstream, Step};
use proptest::prelude::*;
use support::harness;
use tokio::runtime::Runtime;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {e}")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_page_holds_valid_records_or_previous_content(payload in arb_page_payload()) {
        let rt = test_runtime()?;
        let expected = validate_page(&payload).accepted;

        let upstream = ScriptedUpstream::new();
        upstream.always(1, Step::Records(payload));
        let h = harness(upstream).build();
        let previous = fixtures::valid_page(1, "Previous", 15);

        let (stored, total) = rt.block_on(async {
            h.seed(previous.clone()).await;
            h.pipeline()
                .run(RunKind::Refresh, PageRange::bounded(1, 1), never_shutdown())
                .await;
            let total = h.service.get_stats().await.total_pages;
            (h.page(1).await, total)
        });

        if expected.is_empty() {
            prop_assert_eq!(&stored.records, &previous.records);
        } else {
            prop_assert_eq!(&stored.records, &expected);
        }
        prop_assert!(stored.len() <= kennel_core::PAGE_SIZE);
        prop_assert_eq!(total, 1);
    }

    #[test]
    fn prop_total_pages_never_decreases(known in 1u32..20, served in 0u32..20) {
        let rt = test_runtime()?;

        let upstream = ScriptedUpstream::new();
        upstream.always_range(1..=served, |page| {
            Step::Records(fixtures::full_page(&format!("P{page}")))
        });
        let h = harness(upstream).ingest(fixtures::ingest()).build();

        let after = rt.block_on(async {
            h.seed(fixtures::valid_page(known, "Known", 15)).await;
            h.pipeline().backfill(never_shutdown()).await.total_pages_after
        });

        prop_assert!(after >= known);
        prop_assert_eq!(after, known.max(served));
    }
}
