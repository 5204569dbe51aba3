use super::window::TokenStat;

/// Select the `n` most active entities, highest count first.
///
/// Equal counts are ordered by token ascending so a snapshot is reproducible.
/// Entities with a zero count are never ranked.
pub fn top_n(mut stats: Vec<TokenStat>, n: usize) -> Vec<TokenStat> {
    stats.retain(|s| s.count > 0);
    stats.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.token.cmp(&b.token)));
    stats.truncate(n);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    fn stat(b: u8, count: usize) -> TokenStat {
        TokenStat {
            token: Token::from_bytes([b; 32]),
            count,
        }
    }

    #[test]
    fn test_sorted_descending_and_truncated() {
        let ranked = top_n(vec![stat(1, 2), stat(2, 9), stat(3, 5), stat(4, 7)], 3);
        let counts: Vec<usize> = ranked.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![9, 7, 5]);
    }

    #[test]
    fn test_fewer_than_n_returns_all() {
        let ranked = top_n(vec![stat(1, 1), stat(2, 4)], 5);
        assert_eq!(ranked, vec![stat(2, 4), stat(1, 1)]);
    }

    #[test]
    fn test_zero_n_is_empty() {
        assert!(top_n(vec![stat(1, 3)], 0).is_empty());
    }

    #[test]
    fn test_zero_counts_skipped() {
        let ranked = top_n(vec![stat(1, 0), stat(2, 1)], 5);
        assert_eq!(ranked, vec![stat(2, 1)]);
    }

    #[test]
    fn test_ties_broken_by_token() {
        let ranked = top_n(vec![stat(9, 3), stat(4, 3), stat(7, 3), stat(1, 8)], 4);
        assert_eq!(ranked, vec![stat(1, 8), stat(4, 3), stat(7, 3), stat(9, 3)]);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let input = vec![stat(5, 2), stat(3, 6), stat(8, 6), stat(2, 1), stat(6, 4)];
        for n in 0..7 {
            let once = top_n(input.clone(), n);
            assert!(once.len() <= n.min(input.len()));
            assert_eq!(top_n(once.clone(), n), once);
        }
    }
}
