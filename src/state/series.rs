use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Proportions of one compartment indexed by the number of days spent in it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseSeries(Vec<f64>);

impl PhaseSeries {
    #[must_use]
    pub fn new(values: Vec<f64>) -> PhaseSeries {
        PhaseSeries(values)
    }

    #[must_use]
    pub fn zeros(phases: usize) -> PhaseSeries {
        PhaseSeries(vec![0.0; phases])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// The newest cohort, or zero for an empty series.
    #[must_use]
    pub fn first(&self) -> f64 {
        self.0.first().copied().unwrap_or(0.0)
    }

    /// The oldest cohort, or zero for an empty series.
    #[must_use]
    pub fn last(&self) -> f64 {
        self.0.last().copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    pub(crate) fn values_mut(&mut self) -> std::slice::IterMut<'_, f64> {
        self.0.iter_mut()
    }

    /// Moves every cohort one day forward.
    ///
    /// For `q` from `len - 1` down to `1`, `next[q] = carry(q - 1, prev[q - 1])`; then
    /// `next[0] = inflow`. Whatever `carry` does not return has left the compartment. With
    /// `sink` set, the last phase keeps its population and additionally receives the carry
    /// from the phase before it, so nobody ever leaves the last phase.
    ///
    /// The update happens in place from the highest index down so that `prev[q - 1]` is read
    /// before it is overwritten.
    #[must_use]
    pub fn advance<F>(&self, inflow: f64, sink: bool, mut carry: F) -> PhaseSeries
    where
        F: FnMut(usize, f64) -> f64,
    {
        let mut next = self.clone();
        let phases = next.0.len();
        if phases == 0 {
            return next;
        }
        let last = phases - 1;
        let mut top = last;
        if sink && last > 0 {
            next.0[last] += carry(last - 1, next.0[last - 1]);
            top = last - 1;
        }
        for q in (1..=top).rev() {
            next.0[q] = carry(q - 1, next.0[q - 1]);
        }
        if sink && last == 0 {
            next.0[0] += inflow;
        } else {
            next.0[0] = inflow;
        }
        next
    }
}

impl From<Vec<f64>> for PhaseSeries {
    fn from(values: Vec<f64>) -> Self {
        PhaseSeries(values)
    }
}

impl Index<usize> for PhaseSeries {
    type Output = f64;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for PhaseSeries {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}
