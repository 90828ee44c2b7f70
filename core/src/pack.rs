//! Greedy batch packing under token and request-count budgets.

use crate::config::BYTES_PER_TOKEN;
use crate::plan::PendingUnit;

/// Rough token estimate for one unit's content.
fn estimated_tokens(unit: &PendingUnit) -> usize {
    unit.content.len().div_ceil(BYTES_PER_TOKEN)
}

/// Pack units into submission-sized batches.
///
/// Each batch stays within `max_requests` items and `token_budget`
/// estimated tokens. A unit that alone exceeds the budget is emitted as a
/// singleton batch: oversized items are never dropped and never hold
/// smaller items hostage behind them. Unit order is preserved.
pub fn pack(
    units: Vec<PendingUnit>,
    max_requests: usize,
    token_budget: usize,
) -> Vec<Vec<PendingUnit>> {
    let mut batches = Vec::new();
    let mut current: Vec<PendingUnit> = Vec::new();
    let mut current_tokens = 0usize;

    for unit in units {
        let tokens = estimated_tokens(&unit);

        if tokens > token_budget {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            batches.push(vec![unit]);
            continue;
        }

        if !current.is_empty()
            && (current.len() >= max_requests || current_tokens + tokens > token_budget)
        {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        current_tokens += tokens;
        current.push(unit);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(key: &str, bytes: usize) -> PendingUnit {
        PendingUnit {
            cache_key: key.to_string(),
            content: "c".repeat(bytes),
            urls: vec![format!("https://github.com/a/{key}/blob/main/SKILL.md")],
        }
    }

    fn keys(batch: &[PendingUnit]) -> Vec<&str> {
        batch.iter().map(|u| u.cache_key.as_str()).collect()
    }

    #[test]
    fn respects_the_request_count_limit() {
        let units = (0..5).map(|i| unit(&format!("u{i}"), 4)).collect();
        let batches = pack(units, 2, 1_000_000);
        assert_eq!(batches.len(), 3);
        assert_eq!(keys(&batches[0]), vec!["u0", "u1"]);
        assert_eq!(keys(&batches[2]), vec!["u4"]);
    }

    #[test]
    fn respects_the_token_budget() {
        // 400 bytes ≈ 100 tokens each; budget of 250 fits two per batch.
        let units = (0..5).map(|i| unit(&format!("u{i}"), 400)).collect();
        let batches = pack(units, 100, 250);
        assert_eq!(batches.len(), 3);
        for batch in &batches {
            let total: usize = batch.iter().map(estimated_tokens).sum();
            assert!(total <= 250);
        }
    }

    #[test]
    fn oversized_unit_becomes_a_singleton_without_blocking_others() {
        let units = vec![unit("small1", 40), unit("huge", 40_000), unit("small2", 40)];
        let batches = pack(units, 100, 1_000);
        assert_eq!(batches.len(), 3);
        assert_eq!(keys(&batches[0]), vec!["small1"]);
        assert_eq!(keys(&batches[1]), vec!["huge"]);
        assert_eq!(keys(&batches[2]), vec!["small2"]);
    }

    #[test]
    fn empty_input_packs_to_nothing() {
        assert!(pack(Vec::new(), 10, 100).is_empty());
    }
}
