//! Turns ranked search results into the grounding block of the prompt.

use std::fmt::Write;

use parley_core::SearchResult;

/// Returned when there is nothing to ground the answer on.
pub const NO_INFO_SENTINEL: &str = "No relevant information found from web search.";

const CONTEXT_HEADER: &str = "Relevant information from web search:\n\n";

/// Format results as numbered blocks, in input order.
///
/// Every result is included and no content is shortened; use
/// [`truncate_content`] beforehand to bound the size.
pub fn assemble_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_INFO_SENTINEL.to_string();
    }

    let mut context = String::from(CONTEXT_HEADER);
    for (i, result) in results.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = write!(
            context,
            "{}. {}\n   URL: {}\n   Content: {}\n\n",
            i + 1,
            result.title,
            result.url,
            result.content
        );
    }
    context
}

/// Cut each result's content to at most `max_chars` characters, marking cuts
/// with `...`.
pub fn truncate_content(results: Vec<SearchResult>, max_chars: usize) -> Vec<SearchResult> {
    results
        .into_iter()
        .map(|mut result| {
            if let Some((byte_idx, _)) = result.content.char_indices().nth(max_chars) {
                result.content.truncate(byte_idx);
                result.content.push_str("...");
            }
            result
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, url: &str, content: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            content: content.to_string(),
            relevance_score: 0.9,
        }
    }

    #[test]
    fn test_empty_results_give_sentinel() {
        assert_eq!(assemble_context(&[]), NO_INFO_SENTINEL);
    }

    #[test]
    fn test_single_result_format() {
        let ctx = assemble_context(&[result(
            "Paris",
            "https://en.wikipedia.org/wiki/Paris",
            "Paris is the capital of France.",
        )]);
        assert_eq!(
            ctx,
            "Relevant information from web search:\n\n\
             1. Paris\n   URL: https://en.wikipedia.org/wiki/Paris\n   Content: Paris is the capital of France.\n\n"
        );
    }

    #[test]
    fn test_all_titles_and_urls_appear_in_order() {
        let results = vec![
            result("First", "https://a.example", "a"),
            result("Second", "https://b.example", "b"),
            result("Third", "https://c.example", "c"),
        ];
        let ctx = assemble_context(&results);

        let mut cursor = 0;
        for r in &results {
            let title_at = ctx[cursor..].find(&r.title).expect("title missing") + cursor;
            let url_at = ctx[title_at..].find(&r.url).expect("url missing") + title_at;
            cursor = url_at;
        }
        assert!(ctx.contains("3. Third"));
    }

    #[test]
    fn test_assemble_does_not_truncate() {
        let long = "x".repeat(10_000);
        let ctx = assemble_context(&[result("Long", "https://l.example", &long)]);
        assert!(ctx.contains(&long));
    }

    #[test]
    fn test_truncate_content_marks_cut() {
        let out = truncate_content(vec![result("t", "u", "abcdefghij")], 4);
        assert_eq!(out[0].content, "abcd...");
    }

    #[test]
    fn test_truncate_content_leaves_short_content() {
        let out = truncate_content(vec![result("t", "u", "abcd")], 4);
        assert_eq!(out[0].content, "abcd");
    }

    #[test]
    fn test_truncate_content_respects_char_boundaries() {
        let out = truncate_content(vec![result("t", "u", "héllo wörld")], 5);
        assert_eq!(out[0].content, "héllo...");
    }

    #[test]
    fn test_truncate_content_keeps_order_and_count() {
        let input = vec![result("a", "1", "one"), result("b", "2", "two")];
        let out = truncate_content(input, 100);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "a");
        assert_eq!(out[1].title, "b");
    }
}
