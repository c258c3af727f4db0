/// Bounded window of the most recent prices, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    prices: Vec<f64>,
    capacity: usize,
    warmup: usize,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new(100, 10)
    }
}

impl PriceHistory {
    pub fn new(capacity: usize, warmup: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            prices: Vec::with_capacity(capacity + 1),
            capacity,
            warmup: warmup.min(capacity),
        }
    }

    /// Append `price`, evicting the oldest entry once over capacity.
    pub fn update(&mut self, price: f64) {
        self.prices.push(price);
        if self.prices.len() > self.capacity {
            let excess = self.prices.len() - self.capacity;
            self.prices.drain(..excess);
        }
    }

    pub fn is_warm(&self) -> bool {
        self.prices.len() >= self.warmup
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.prices.last().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_prices() {
        let mut history = PriceHistory::new(100, 10);
        for i in 0..150 {
            history.update(i as f64);
        }

        assert_eq!(history.len(), 100);
        assert_eq!(history.as_slice()[0], 50.0);
        assert_eq!(history.last(), Some(149.0));
        let expected: Vec<f64> = (50..150).map(|i| i as f64).collect();
        assert_eq!(history.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_warmup() {
        let mut history = PriceHistory::default();
        assert!(history.is_empty());
        for i in 0..9 {
            history.update(100.0 + i as f64);
            assert!(!history.is_warm());
        }
        history.update(110.0);
        assert!(history.is_warm());
        assert_eq!(history.warmup(), 10);
        assert_eq!(history.capacity(), 100);
    }

    #[test]
    fn test_degenerate_capacity() {
        let mut history = PriceHistory::new(0, 5);
        history.update(1.0);
        history.update(2.0);
        assert_eq!(history.as_slice(), &[2.0]);
        assert!(history.is_warm());
    }
}
