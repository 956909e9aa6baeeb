// Progressive reduction
//
// When a result set exceeds the token budget, shrink it through fixed
// percentage steps until it fits instead of truncating arbitrarily. The
// final fallback is a single item, never an empty set.

pub struct ProgressiveReducer {
    reduction_steps: Vec<u8>,
}

impl ProgressiveReducer {
    pub fn new() -> Self {
        Self {
            reduction_steps: vec![100, 75, 50, 30, 20, 10, 5],
        }
    }

    /// Largest prefix of `items` (by the percentage steps) whose estimated
    /// token cost fits `target_token_count`
    pub fn reduce<T, F>(&self, items: &[T], target_token_count: usize, token_estimator: F) -> Vec<T>
    where
        T: Clone,
        F: Fn(&[T]) -> usize,
    {
        if items.is_empty() {
            return Vec::new();
        }

        for &percentage in &self.reduction_steps {
            let count = self.calculate_count(items.len(), percentage);
            let subset = &items[..count.min(items.len())];

            if token_estimator(subset) <= target_token_count {
                return subset.to_vec();
            }
        }

        vec![items[0].clone()]
    }

    fn calculate_count(&self, total_items: usize, percentage: u8) -> usize {
        std::cmp::max(1, (total_items * percentage as usize) / 100)
    }
}

impl Default for ProgressiveReducer {
    fn default() -> Self {
        Self::new()
    }
}
