//! Which neighbouring pages to warm around the page being read.

use crate::types::PrefetchPolicy;

/// Pages around `center` in load order: nearest first, the forward page before the backward
/// one at equal distance. `center` itself is not included.
pub fn window(center: usize, page_count: usize, policy: PrefetchPolicy) -> Vec<usize> {
    let reach = policy.ahead.max(policy.behind) as usize;
    let mut pages = Vec::with_capacity((policy.ahead + policy.behind) as usize);
    for distance in 1..=reach {
        if distance <= policy.ahead as usize {
            if let Some(next) = center.checked_add(distance).filter(|page| *page < page_count) {
                pages.push(next);
            }
        }
        if distance <= policy.behind as usize {
            if let Some(previous) = center.checked_sub(distance) {
                pages.push(previous);
            }
        }
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_biased_nearest_first() {
        let policy = PrefetchPolicy { ahead: 2, behind: 1 };
        assert_eq!(window(5, 10, policy), vec![6, 4, 7]);
    }

    #[test]
    fn clipped_at_both_ends() {
        let policy = PrefetchPolicy { ahead: 3, behind: 3 };
        assert_eq!(window(0, 2, policy), vec![1]);
        assert_eq!(window(1, 2, policy), vec![0]);
        assert!(window(0, 1, policy).is_empty());
    }

    #[test]
    fn disabled_policy_plans_nothing() {
        assert!(window(3, 10, PrefetchPolicy { ahead: 0, behind: 0 }).is_empty());
    }
}
