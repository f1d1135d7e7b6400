/// Handle to a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Entry<T> {
    id: TimerId,
    deadline_ms: f64,
    period_ms: Option<f64>,
    task: T,
}

/// Single-threaded timer queue driven by an external millisecond clock.
///
/// Holds one-shot (`set_timeout`) and repeating (`set_interval`) timers.
/// Nothing fires on its own: the owner calls [`TimerQueue::advance_to`] and
/// then drains [`TimerQueue::pop_due`].
#[derive(Debug, Clone)]
pub struct TimerQueue<T> {
    now_ms: f64,
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            now_ms: 0.0,
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Moves the queue's clock forward. Earlier instants are ignored.
    pub fn advance_to(&mut self, now_ms: f64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    pub fn set_timeout(&mut self, delay_ms: f64, task: T) -> TimerId {
        self.insert(self.now_ms + delay_ms.max(0.0), None, task)
    }

    /// Repeating timer. The first fire is due immediately.
    pub fn set_interval(&mut self, period_ms: f64, task: T) -> TimerId {
        self.insert(self.now_ms, Some(period_ms.max(f64::EPSILON)), task)
    }

    fn insert(&mut self, deadline_ms: f64, period_ms: Option<f64>, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            deadline_ms,
            period_ms,
            task,
        });
        id
    }

    /// Returns `true` if the timer was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Takes the earliest due timer, ties broken by creation order.
    ///
    /// A repeating timer is rescheduled one period after its deadline; if it
    /// is late by more than a period the missed fires collapse into this one.
    pub fn pop_due(&mut self) -> Option<(TimerId, T)> {
        let now = self.now_ms;
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.deadline_ms <= now)
            .min_by(|(_, a), (_, b)| {
                a.deadline_ms
                    .total_cmp(&b.deadline_ms)
                    .then(a.id.cmp(&b.id))
            })
            .map(|(index, _)| index)?;

        let id = self.entries[index].id;
        match self.entries[index].period_ms {
            Some(period) => {
                let entry = &mut self.entries[index];
                let task = entry.task.clone();
                let next = entry.deadline_ms + period;
                entry.deadline_ms = if next <= now { now + period } else { next };
                Some((id, task))
            }
            None => {
                let entry = self.entries.swap_remove(index);
                Some((id, entry.task))
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
