//! Property tests for the chunkers.

use luminary_rag::chunking::{fixed_window, paragraph_aware, reassemble_paragraphs};
use proptest::prelude::*;

/// A paragraph of single-space-separated lowercase words.
fn arb_paragraph() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,8}", 1..12).prop_map(|words| words.join(" "))
}

/// A chunk size and an overlap below it.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (20usize..300).prop_flat_map(|size| (Just(size), 0..size))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Removing the overlap seeds and splitting on blank lines gives back the
    /// original paragraphs in order.
    #[test]
    fn paragraph_chunks_reassemble_to_the_input(
        paragraphs in proptest::collection::vec(arb_paragraph(), 1..15),
        (chunk_size, overlap) in arb_sizes(),
    ) {
        let text = paragraphs.join("\n\n");
        let chunks = paragraph_aware(&text, chunk_size, overlap);

        prop_assert!(!chunks.is_empty());
        prop_assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        prop_assert_eq!(reassemble_paragraphs(&chunks, overlap), paragraphs);
    }

    /// Every window is at most `chunk_size` characters and together the
    /// windows cover the whole input.
    #[test]
    fn fixed_windows_cover_the_input(
        text in "[a-z]{1,400}",
        (chunk_size, overlap) in arb_sizes(),
    ) {
        let windows = fixed_window(&text, chunk_size, overlap);

        prop_assert!(windows.iter().all(|w| w.chars().count() <= chunk_size));
        prop_assert!(text.starts_with(windows[0].as_str()));
        let last = windows.last().unwrap();
        prop_assert!(text.ends_with(last.as_str()));
        for w in &windows {
            prop_assert!(text.contains(w.as_str()));
        }
    }
}

#[test]
fn paragraph_chunking_is_deterministic() {
    let text = "First clause of the lease.\n\nSecond clause about rent.\n\nThird clause on termination.";
    assert_eq!(paragraph_aware(text, 40, 10), paragraph_aware(text, 40, 10));
    assert!(paragraph_aware("", 40, 10).is_empty());
    assert!(paragraph_aware("\n\n  \n\n", 40, 10).is_empty());
}
