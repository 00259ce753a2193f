//! Token-budgeted conversation pruning.
//!
//! Drops the oldest messages until the history fits the available budget,
//! but never below a minimum number of recent exchanges. Recency and
//! continuity win over context completeness: under a pathologically tight
//! budget the result may still exceed it, which is logged and accepted
//! rather than failing the request.

use super::tokens::{TokenCounter, MESSAGE_OVERHEAD_TOKENS};
use crate::message::PromptMessage;
use tracing::{debug, warn};

/// Prune conversation history to fit a token budget.
///
/// `available = max_tokens - system_tokens - response_reserve`; a
/// non-positive budget is valid and degrades to keeping only the minimum
/// exchanges. Messages are only ever removed from the oldest end, so the
/// surviving suffix keeps its relative order. The input is not mutated.
///
/// Returns the pruned history and the number of tokens removed.
pub fn prune_history(
    history: &[PromptMessage],
    counter: &TokenCounter,
    system_tokens: usize,
    max_tokens: usize,
    min_exchanges: usize,
    response_reserve: usize,
) -> (Vec<PromptMessage>, usize) {
    if history.is_empty() {
        return (Vec::new(), 0);
    }

    let available = max_tokens as i64 - system_tokens as i64 - response_reserve as i64;

    // Per-message costs computed once; content tokens plus framing overhead.
    let costs: Vec<usize> = history
        .iter()
        .map(|m| counter.count_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS)
        .collect();
    let mut remaining: i64 = costs.iter().map(|c| *c as i64).sum();

    if remaining <= available {
        return (history.to_vec(), 0);
    }

    // Each exchange is one user + one assistant message.
    let min_messages = min_exchanges * 2;
    let mut start = 0;
    let mut removed_tokens = 0usize;

    while remaining > available && history.len() - start > min_messages {
        remaining -= costs[start] as i64;
        removed_tokens += costs[start];
        start += 1;
    }

    if remaining > available {
        warn!(
            kept_messages = history.len() - start,
            kept_tokens = remaining,
            available,
            "Pruned history still exceeds token budget; keeping minimum exchanges"
        );
    } else {
        debug!(
            removed_messages = start,
            removed_tokens, "Pruned conversation history to fit budget"
        );
    }

    (history[start..].to_vec(), removed_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> TokenCounter {
        TokenCounter::new().unwrap()
    }

    fn exchange(i: usize, pad: usize) -> [PromptMessage; 2] {
        [
            PromptMessage::user(format!("Question {i} {}", "detail ".repeat(pad))),
            PromptMessage::assistant(format!("Answer {i} {}", "detail ".repeat(pad))),
        ]
    }

    fn long_history(exchanges: usize, pad: usize) -> Vec<PromptMessage> {
        (0..exchanges).flat_map(|i| exchange(i, pad)).collect()
    }

    #[test]
    fn test_empty_history_unchanged() {
        let (pruned, removed) = prune_history(&[], &counter(), 100, 8000, 2, 2000);
        assert!(pruned.is_empty());
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_within_budget_unchanged() {
        let counter = counter();
        let history = long_history(1, 0);
        let (pruned, removed) = prune_history(&history, &counter, 100, 8000, 2, 2500);
        assert_eq!(pruned, history);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_over_budget_is_pruned() {
        let counter = counter();
        let history = long_history(20, 50);
        let (pruned, removed) = prune_history(&history, &counter, 500, 2000, 2, 500);
        assert!(pruned.len() < history.len());
        assert!(removed > 0);
    }

    #[test]
    fn test_minimum_exchanges_preserved_over_budget() {
        let counter = counter();
        let history = long_history(3, 100);
        // Budget too tight for even one exchange; the floor wins.
        let (pruned, _) = prune_history(&history, &counter, 100, 500, 2, 100);
        assert_eq!(pruned.len(), 4);
    }

    #[test]
    fn test_oldest_removed_first_and_order_kept() {
        let counter = counter();
        let mut history = long_history(2, 50);
        history.push(PromptMessage::user("Third question"));
        history.push(PromptMessage::assistant("Third answer"));

        let (pruned, _) = prune_history(&history, &counter, 100, 500, 1, 300);

        // Survivors are a contiguous suffix of the input.
        assert_eq!(&history[history.len() - pruned.len()..], &pruned[..]);
        assert_eq!(pruned.last().unwrap().content, "Third answer");
    }

    #[test]
    fn test_negative_available_keeps_min_exchanges() {
        let counter = counter();
        let history = long_history(3, 0);
        // system_tokens + reserve exceed max_tokens: available < 0.
        let (pruned, removed) = prune_history(&history, &counter, 5000, 5000, 2, 2500);
        assert_eq!(pruned.len(), 4);
        assert_eq!(&history[2..], &pruned[..]);
        assert!(removed > 0);
    }

    #[test]
    fn test_history_at_floor_is_not_pruned() {
        let counter = counter();
        let history = long_history(1, 0);
        // Over budget but already at/below min_exchanges * 2 messages.
        let (pruned, removed) = prune_history(&history, &counter, 0, 0, 2, 0);
        assert_eq!(pruned, history);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_result_never_shorter_than_floor_or_input() {
        let counter = counter();
        for exchanges in [1usize, 2, 5, 10] {
            for min_exchanges in [0usize, 1, 2, 4] {
                let history = long_history(exchanges, 30);
                let (pruned, _) =
                    prune_history(&history, &counter, 100, 300, min_exchanges, 100);
                let floor = std::cmp::min(history.len(), min_exchanges * 2);
                assert!(
                    pruned.len() >= floor,
                    "len {} < floor {} (exchanges={exchanges}, min={min_exchanges})",
                    pruned.len(),
                    floor
                );
            }
        }
    }

    #[test]
    fn test_removed_tokens_matches_difference() {
        let counter = counter();
        let history = long_history(10, 30);
        let original = counter.count_messages(&history);

        let (pruned, removed) = prune_history(&history, &counter, 100, 2000, 2, 500);

        assert_eq!(removed, original - counter.count_messages(&pruned));
    }

    #[test]
    fn test_pruned_fits_budget_unless_at_floor() {
        let counter = counter();
        let history = long_history(20, 50);
        let (system_tokens, max_tokens, response_reserve) = (500usize, 3000usize, 1000usize);
        let available = (max_tokens - system_tokens - response_reserve) as i64;

        let (pruned, _) =
            prune_history(&history, &counter, system_tokens, max_tokens, 2, response_reserve);

        if pruned.len() > 4 {
            assert!(counter.count_messages(&pruned) as i64 <= available);
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let counter = counter();
        let history = long_history(10, 50);
        let snapshot = history.clone();
        let _ = prune_history(&history, &counter, 500, 1000, 1, 300);
        assert_eq!(history, snapshot);
    }

    #[test]
    fn test_empty_content_messages_count_overhead() {
        let counter = counter();
        let history = vec![
            PromptMessage::user(""),
            PromptMessage::assistant(""),
            PromptMessage::user("Hello"),
            PromptMessage::assistant("Hi!"),
        ];
        let (pruned, removed) = prune_history(&history, &counter, 100, 8000, 2, 2000);
        assert_eq!(pruned.len(), 4);
        assert_eq!(removed, 0);
    }
}
