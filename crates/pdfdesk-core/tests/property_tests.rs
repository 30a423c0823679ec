//! Property-based tests for the page expression parsers

use pdfdesk_core::{parse_page_order, parse_page_selection, PdfDeskError};
use proptest::prelude::*;

/// Tokens a user might plausibly type, valid or not
fn token() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..40).prop_map(|n| n.to_string()),
        (0u32..40, 0u32..40).prop_map(|(a, b)| format!("{}-{}", a, b)),
        (0u32..40, 0u32..40).prop_map(|(a, b)| format!(" {} - {} ", a, b)),
        Just("".to_string()),
        Just("all".to_string()),
        "[a-z]{1,4}",
    ]
}

fn expression() -> impl Strategy<Value = String> {
    prop::collection::vec(token(), 1..8).prop_map(|tokens| tokens.join(","))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // ============================================================
    // Page Selection
    // ============================================================

    #[test]
    fn selection_is_bounded_sorted_and_unique(expr in expression(), page_count in 1u32..30) {
        match parse_page_selection(&expr, page_count) {
            Ok(selection) => {
                let pages = selection.pages();
                prop_assert!(!pages.is_empty());
                prop_assert!(pages.iter().all(|&p| p >= 1 && p <= page_count));
                prop_assert!(pages.windows(2).all(|w| w[0] < w[1]));
                prop_assert_eq!(selection.page_count(), page_count);
            }
            Err(e) => {
                prop_assert!(matches!(e, PdfDeskError::Parse(_) | PdfDeskError::Validation(_)));
            }
        }
    }

    #[test]
    fn all_selects_every_page(page_count in 1u32..500) {
        let selection = parse_page_selection("all", page_count).unwrap();
        prop_assert_eq!(selection.pages().to_vec(), (1..=page_count).collect::<Vec<_>>());
    }

    #[test]
    fn single_valid_page_roundtrips(page_count in 1u32..200, offset in 0u32..200) {
        let page = offset % page_count + 1;
        let selection = parse_page_selection(&page.to_string(), page_count).unwrap();
        prop_assert_eq!(selection.pages(), &[page][..]);
    }

    #[test]
    fn valid_range_selects_exactly_that_range(page_count in 1u32..100, a in 0u32..100, b in 0u32..100) {
        let start = a % page_count + 1;
        let end = b % page_count + 1;
        let result = parse_page_selection(&format!("{}-{}", start, end), page_count);
        if start <= end {
            prop_assert_eq!(result.unwrap().pages().to_vec(), (start..=end).collect::<Vec<_>>());
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn token_order_does_not_matter(mut tokens in prop::collection::vec(token(), 1..6), page_count in 1u32..30) {
        let forward = parse_page_selection(&tokens.join(","), page_count).ok();
        tokens.reverse();
        let backward = parse_page_selection(&tokens.join(","), page_count).ok();
        prop_assert_eq!(forward, backward);
    }

    // ============================================================
    // Page Order
    // ============================================================

    #[test]
    fn any_permutation_is_accepted(order in (1usize..20).prop_flat_map(|n| Just((1..=n as u32).collect::<Vec<_>>()).prop_shuffle())) {
        let expr = order.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        let parsed = parse_page_order(&expr, order.len() as u32).unwrap();
        prop_assert_eq!(parsed.pages(), order.as_slice());
    }

    #[test]
    fn order_with_duplicate_is_rejected(page_count in 2u32..20, dup in 0u32..20) {
        let dup = dup % page_count + 1;
        let mut order: Vec<u32> = (1..=page_count).collect();
        let replaced = if dup == 1 { 2 } else { 1 };
        if let Some(slot) = order.iter_mut().find(|p| **p == replaced) {
            *slot = dup;
        }
        let expr = order.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        prop_assert!(parse_page_order(&expr, page_count).is_err());
    }

    #[test]
    fn order_with_wrong_length_is_rejected(page_count in 2u32..20) {
        let expr = (1..page_count).map(|p| p.to_string()).collect::<Vec<_>>().join(",");
        prop_assert!(parse_page_order(&expr, page_count).is_err());
    }
}
