use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide counter marking the order in which settlement began, across all partitions.
#[derive(Debug, Default)]
pub struct GlobalSequence {
    last: AtomicI64,
}

impl GlobalSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues after `last`, e.g. the highest sequence already persisted.
    pub fn starting_after(last: i64) -> Self {
        Self { last: AtomicI64::new(last.max(0)) }
    }

    pub fn next(&self) -> i64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn starts_at_one() {
        let seq = GlobalSequence::new();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[test]
    fn resumes_after_persisted_value() {
        let seq = GlobalSequence::starting_after(41);
        assert_eq!(seq.next(), 42);
        assert_eq!(GlobalSequence::starting_after(-5).next(), 1);
    }

    #[test]
    fn concurrent_assignment_is_unique() {
        let seq = Arc::new(GlobalSequence::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = seq.clone();
                std::thread::spawn(move || (0..1000).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(all.insert(v), "duplicate sequence {v}");
            }
        }
        assert_eq!(all.len(), 8000);
        assert_eq!(seq.current(), 8000);
    }
}
