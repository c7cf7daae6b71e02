//! A priority queue that stores arbitrary data sorted by step
//!
//! Defines a `Queue<T, P>` that is intended to store a queue of items of type
//! T - sorted by `u64` step and definable priority `P` - called 'plans'.
//! This queue has methods for adding plans and retrieving the earliest plans
//! in the queue. Adding and retrieving a plan are both *O*(log(*n*)).
//!
//! The `Simulation` uses this queue to hold cell states that have been
//! computed but are not yet visible to their neighbors.

use std::{cmp::Ordering, collections::BinaryHeap};

/// A priority queue that stores arbitrary data sorted by step
///
/// Items of type `T` are stored in order by `u64` step and called `Plan<T>`.
/// Plans can have priorities given by some specified orderable type `P`.
/// If two plans are scheduled for the same step then the plan with the lowest
/// priority is placed earlier. If two plans have the same step and priority
/// then the plan that is scheduled first is placed earlier.
pub struct Queue<T, P: Eq + PartialEq + Ord> {
    queue: BinaryHeap<Entry<T, P>>,
    plan_counter: u64,
}

impl<T, P: Eq + PartialEq + Ord> Queue<T, P> {
    /// Create a new empty `Queue<T, P>`
    #[must_use]
    pub fn new() -> Queue<T, P> {
        Queue {
            queue: BinaryHeap::new(),
            plan_counter: 0,
        }
    }

    /// Add a plan to the queue at the specified step
    pub fn add_plan(&mut self, step: u64, data: T, priority: P) {
        let id = self.plan_counter;
        self.queue.push(Entry {
            step,
            id,
            priority,
            data,
        });
        self.plan_counter += 1;
    }

    /// The step of the earliest plan in the queue
    #[must_use]
    pub fn next_step(&self) -> Option<u64> {
        self.queue.peek().map(|entry| entry.step)
    }

    /// Retrieve the earliest plan in the queue
    ///
    /// Returns the next plan if it exists or else `None` if the queue is empty
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        self.queue.pop().map(|entry| Plan {
            step: entry.step,
            data: entry.data,
        })
    }

    /// Retrieve every plan scheduled at or before `step`, earliest first
    pub fn take_due(&mut self, step: u64) -> Vec<Plan<T>> {
        let mut due = Vec::new();
        while self.next_step().is_some_and(|next| next <= step) {
            if let Some(plan) = self.get_next_plan() {
                due.push(plan);
            }
        }
        due
    }
}

impl<T, P: Eq + PartialEq + Ord> Default for Queue<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// A scheduled payload, ordered by step, priority and then insertion order
struct Entry<T, P: Eq + PartialEq + Ord> {
    step: u64,
    id: u64,
    priority: P,
    data: T,
}

impl<T, P: Eq + PartialEq + Ord> PartialEq for Entry<T, P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, P: Eq + PartialEq + Ord> Eq for Entry<T, P> {}

impl<T, P: Eq + PartialEq + Ord> PartialOrd for Entry<T, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Entry objects are ordered in increasing order by step, priority, and then
/// plan id; the payload takes no part in the ordering
impl<T, P: Eq + PartialEq + Ord> Ord for Entry<T, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.step
            .cmp(&other.step)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.id.cmp(&other.id))
            // `BinaryHeap` is a max-heap
            .reverse()
    }
}

/// A plan that holds data of type `T` intended to be used at the specified step
pub struct Plan<T> {
    pub step: u64,
    pub data: T,
}
