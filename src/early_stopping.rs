/// Stops adversarial training once the oracle NLL has not improved for
/// `patience` consecutive evaluations. A patience of zero never stops.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    stale: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f32::INFINITY,
            stale: 0,
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    /// Record one evaluation. Returns `true` when training should stop.
    pub fn observe(&mut self, nll: f32) -> bool {
        if nll < self.best {
            self.best = nll;
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        self.patience > 0 && self.stale >= self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_without_improvement() {
        let mut stopper = EarlyStopping::new(2);
        assert!(!stopper.observe(3.0));
        assert!(!stopper.observe(2.5));
        assert!(!stopper.observe(2.6));
        assert!(stopper.observe(2.5));
        assert_eq!(stopper.best(), 2.5);
    }

    #[test]
    fn improvement_resets_the_count() {
        let mut stopper = EarlyStopping::new(2);
        assert!(!stopper.observe(3.0));
        assert!(!stopper.observe(3.1));
        assert!(!stopper.observe(2.0));
        assert!(!stopper.observe(2.1));
        assert!(stopper.observe(2.2));
    }

    #[test]
    fn zero_patience_never_stops() {
        let mut stopper = EarlyStopping::new(0);
        for nll in [1.0, 2.0, 3.0, 4.0] {
            assert!(!stopper.observe(nll));
        }
        assert_eq!(stopper.best(), 1.0);
    }

    #[test]
    fn nan_counts_as_no_improvement() {
        let mut stopper = EarlyStopping::new(1);
        assert!(!stopper.observe(1.0));
        assert!(stopper.observe(f32::NAN));
    }
}
