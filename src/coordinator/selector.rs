use rand::seq::IndexedRandom;

/// Picks the worker a request goes to from a snapshot of the alive set.
///
/// Implementations must return a member of `alive`, or `None` only when it is empty.
pub trait WorkerSelector: Send + Sync {
    fn select(&self, alive: &[String]) -> Option<String>;
}

/// Uniform random choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl WorkerSelector for RandomSelector {
    fn select(&self, alive: &[String]) -> Option<String> {
        alive.choose(&mut rand::rng()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn empty_set_selects_nothing() {
        assert_eq!(RandomSelector.select(&[]), None);
    }

    #[test]
    fn selection_stays_inside_the_set() {
        let alive = vec![
            "http://localhost:5001".to_string(),
            "http://localhost:5002".to_string(),
            "http://localhost:5003".to_string(),
        ];
        let mut seen = HashSet::new();
        for _ in 0..300 {
            let chosen = RandomSelector.select(&alive).unwrap();
            assert!(alive.contains(&chosen));
            seen.insert(chosen);
        }
        assert!(seen.len() > 1);
    }
}
