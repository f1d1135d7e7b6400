use std::collections::HashMap;
use std::fmt;

/// Identifier handed out by [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// One-shot action tied to a position on an audio source.
pub struct ScheduledCallback {
    id: CallbackId,
    key: Option<String>,
    timestamp_ms: f64,
    action: Box<dyn FnMut()>,
    pub(crate) armed: bool,
    pub(crate) fired: bool,
}

impl ScheduledCallback {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_ms
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

impl fmt::Debug for ScheduledCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledCallback")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("armed", &self.armed)
            .field("fired", &self.fired)
            .finish()
    }
}

/// Scheduled callbacks grouped by audio source, in registration order.
///
/// Entries are never removed; the scheduler only flips their armed/fired
/// state.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    entries: HashMap<String, Vec<ScheduledCallback>>,
    next_id: u64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty entry list for every source up front.
    pub fn with_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Self {
        let mut registry = Self::new();
        for source in sources {
            registry.entries.entry(source.to_string()).or_default();
        }
        registry
    }

    pub fn knows_source(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    /// Registering again at the same timestamp of the same source swaps the
    /// action of the existing unkeyed entry, so mount-time registration can
    /// repeat. Distinct actions sharing a timestamp need
    /// [`CallbackRegistry::register_keyed`].
    pub fn register<F>(&mut self, source: &str, timestamp_ms: f64, action: F) -> CallbackId
    where
        F: FnMut() + 'static,
    {
        let timestamp_ms = timestamp_ms.max(0.0);
        if let Some(existing) = self.entries.get_mut(source).and_then(|list| {
            list.iter_mut()
                .find(|cb| cb.key.is_none() && cb.timestamp_ms == timestamp_ms)
        }) {
            existing.action = Box::new(action);
            return existing.id;
        }
        self.push(source, None, timestamp_ms, Box::new(action))
    }

    /// Like [`CallbackRegistry::register`], but a second registration with the
    /// same key on the same source swaps the action and timestamp of the
    /// existing entry instead of adding another one.
    pub fn register_keyed<F>(
        &mut self,
        source: &str,
        key: &str,
        timestamp_ms: f64,
        action: F,
    ) -> CallbackId
    where
        F: FnMut() + 'static,
    {
        if let Some(existing) = self
            .entries
            .get_mut(source)
            .and_then(|list| list.iter_mut().find(|cb| cb.key.as_deref() == Some(key)))
        {
            existing.action = Box::new(action);
            if existing.timestamp_ms != timestamp_ms && !existing.armed {
                existing.timestamp_ms = timestamp_ms;
            }
            return existing.id;
        }
        self.push(source, Some(key.to_string()), timestamp_ms, Box::new(action))
    }

    fn push(
        &mut self,
        source: &str,
        key: Option<String>,
        timestamp_ms: f64,
        action: Box<dyn FnMut()>,
    ) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.entries
            .entry(source.to_string())
            .or_default()
            .push(ScheduledCallback {
                id,
                key,
                timestamp_ms: timestamp_ms.max(0.0),
                action,
                armed: false,
                fired: false,
            });
        id
    }

    pub fn entries(&self, source: &str) -> &[ScheduledCallback] {
        self.entries.get(source).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn entries_mut(&mut self, source: &str) -> &mut [ScheduledCallback] {
        self.entries
            .get_mut(source)
            .map(Vec::as_mut_slice)
            .unwrap_or_default()
    }

    /// Runs the action at `index` unless it already fired. Returns whether it ran.
    pub fn fire(&mut self, source: &str, index: usize) -> bool {
        let Some(callback) = self.entries.get_mut(source).and_then(|list| list.get_mut(index))
        else {
            return false;
        };
        if callback.fired {
            return false;
        }
        callback.armed = false;
        callback.fired = true;
        (callback.action)();
        true
    }

    /// Starts a fresh forward pass over `source`.
    pub fn reset_source(&mut self, source: &str) {
        for callback in self.entries_mut(source) {
            callback.armed = false;
            callback.fired = false;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears the fired flag of entries at or after `position_ms`. Returns how
/// many were rearmed.
pub fn rearm_from(callbacks: &mut [ScheduledCallback], position_ms: f64) -> usize {
    let mut count = 0;
    for callback in callbacks {
        if callback.fired && callback.timestamp_ms >= position_ms {
            callback.fired = false;
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
        let count = Rc::new(Cell::new(0));
        let handle = count.clone();
        (count, move || handle.set(handle.get() + 1))
    }

    #[test]
    fn keeps_entries_per_source_in_order() {
        let mut registry = CallbackRegistry::with_sources(["a.mp3", "b.mp3"]);
        registry.register("a.mp3", 600.0, || {});
        registry.register("a.mp3", 100.0, || {});
        registry.register("b.mp3", 50.0, || {});

        let stamps: Vec<f64> = registry
            .entries("a.mp3")
            .iter()
            .map(ScheduledCallback::timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![600.0, 100.0]);
        assert_eq!(registry.len(), 3);
        assert!(registry.entries("missing.mp3").is_empty());
    }

    #[test]
    fn fires_at_most_once() {
        let (count, action) = counter();
        let mut registry = CallbackRegistry::new();
        registry.register("a.mp3", 10.0, action);

        assert!(registry.fire("a.mp3", 0));
        assert!(!registry.fire("a.mp3", 0));
        assert_eq!(count.get(), 1);
        assert!(registry.entries("a.mp3")[0].has_fired());
    }

    #[test]
    fn keyed_registration_is_idempotent() {
        let (first, first_action) = counter();
        let (second, second_action) = counter();
        let mut registry = CallbackRegistry::new();

        let a = registry.register_keyed("a.mp3", "intro", 10.0, first_action);
        let b = registry.register_keyed("a.mp3", "intro", 10.0, second_action);
        assert_eq!(a, b);
        assert_eq!(registry.entries("a.mp3").len(), 1);

        registry.fire("a.mp3", 0);
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn repeated_registration_at_same_timestamp_keeps_one_entry() {
        let (first, first_action) = counter();
        let (second, second_action) = counter();
        let mut registry = CallbackRegistry::new();

        let a = registry.register("a.mp3", 250.0, first_action);
        let b = registry.register("a.mp3", 250.0, second_action);
        registry.register("a.mp3", 300.0, || {});
        assert_eq!(a, b);
        assert_eq!(registry.entries("a.mp3").len(), 2);

        registry.fire("a.mp3", 0);
        assert_eq!((first.get(), second.get()), (0, 1));
    }

    #[test]
    fn rearms_only_entries_ahead_of_position() {
        let mut registry = CallbackRegistry::new();
        registry.register("a.mp3", 100.0, || {});
        registry.register("a.mp3", 900.0, || {});
        registry.fire("a.mp3", 0);
        registry.fire("a.mp3", 1);

        assert_eq!(rearm_from(registry.entries_mut("a.mp3"), 500.0), 1);
        assert!(registry.entries("a.mp3")[0].has_fired());
        assert!(!registry.entries("a.mp3")[1].has_fired());
    }
}
