// logmask-core/src/manager.rs
//! Priority-ordered dispatch over registered [`MaskingStrategy`] objects.
//!
//! Exactly one strategy runs per value: the first, in descending priority
//! order, whose `should_apply` returns `true`. Equal priorities keep their
//! registration order. The sorted view is memoized and rebuilt lazily after
//! any mutation.
//!
//! License: MIT OR APACHE 2.0

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use serde_json::Value;

use crate::errors::MaskingError;
use crate::record::{MaskResult, RecordContext};
use crate::strategy::{MaskingStrategy, StrategySummary};

type StrategyList = Vec<Arc<dyn MaskingStrategy>>;

#[derive(Default)]
pub struct StrategyManager {
    strategies: RwLock<StrategyList>,
    sorted: RwLock<Option<Arc<StrategyList>>>,
}

impl fmt::Debug for StrategyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyManager")
            .field("strategies", &self.summaries())
            .finish()
    }
}

impl StrategyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_strategy(&self, strategy: Arc<dyn MaskingStrategy>) {
        debug!(
            "Registering masking strategy '{}' (priority {}).",
            strategy.name(),
            strategy.priority()
        );
        let mut strategies = self.strategies.write().unwrap_or_else(PoisonError::into_inner);
        strategies.push(strategy);
        self.invalidate();
    }

    /// Removes every strategy named `name`. Returns how many were removed.
    pub fn remove_strategy(&self, name: &str) -> usize {
        let mut strategies = self.strategies.write().unwrap_or_else(PoisonError::into_inner);
        let before = strategies.len();
        strategies.retain(|s| s.name() != name);
        let removed = before - strategies.len();
        if removed > 0 {
            debug!("Removed {} masking strateg(ies) named '{}'.", removed, name);
            self.invalidate();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.strategies.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name and priority of each strategy, in dispatch order.
    pub fn summaries(&self) -> Vec<StrategySummary> {
        self.ordered()
            .iter()
            .map(|s| StrategySummary::of(s.as_ref()))
            .collect()
    }

    /// The strategy that would handle `value` at `path`, if any.
    pub fn resolve(&self, value: &Value, path: &str, record: &RecordContext) -> Option<Arc<dyn MaskingStrategy>> {
        self.ordered()
            .iter()
            .find(|s| s.should_apply(value, path, record))
            .cloned()
    }

    /// The strategy that masks the container `value` at `path` as a whole,
    /// if any. Only strategies whose `masks_container` accepts the path are
    /// considered; priority order is the same as for [`Self::resolve`].
    pub fn resolve_container(
        &self,
        value: &Value,
        path: &str,
        record: &RecordContext,
    ) -> Option<Arc<dyn MaskingStrategy>> {
        self.ordered()
            .iter()
            .find(|s| s.masks_container(path) && s.should_apply(value, path, record))
            .cloned()
    }

    /// Masks `value` with the first applicable strategy. Values no strategy
    /// wants are returned unchanged.
    pub fn mask_value(&self, value: &Value, path: &str, record: &RecordContext) -> Result<MaskResult, MaskingError> {
        match self.resolve(value, path, record) {
            Some(strategy) => strategy.apply(value, path, record),
            None => Ok(MaskResult::Value(value.clone())),
        }
    }

    /// Callers hold the `strategies` write lock. Lock order is always
    /// `strategies` before `sorted`.
    fn invalidate(&self) {
        *self.sorted.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn ordered(&self) -> Arc<StrategyList> {
        if let Some(sorted) = self.sorted.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Arc::clone(sorted);
        }
        // Held until the memo is stored so a concurrent add/remove cannot
        // invalidate between the snapshot and the write.
        let strategies = self.strategies.read().unwrap_or_else(PoisonError::into_inner);
        let mut sorted = strategies.clone();
        // `sort_by_key` is stable: ties keep registration order.
        sorted.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        let sorted = Arc::new(sorted);
        *self.sorted.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&sorted));
        drop(strategies);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed {
        name: &'static str,
        priority: i32,
        output: &'static str,
    }

    impl MaskingStrategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn should_apply(&self, _: &Value, _: &str, _: &RecordContext) -> bool {
            true
        }
        fn apply(&self, _: &Value, _: &str, _: &RecordContext) -> Result<MaskResult, MaskingError> {
            Ok(MaskResult::Value(json!(self.output)))
        }
    }

    fn fixed(name: &'static str, priority: i32, output: &'static str) -> Arc<dyn MaskingStrategy> {
        Arc::new(Fixed { name, priority, output })
    }

    #[test]
    fn test_highest_priority_wins() {
        let manager = StrategyManager::new();
        manager.add_strategy(fixed("low", 10, "low"));
        manager.add_strategy(fixed("high", 90, "high"));
        let record = RecordContext::default();
        let result = manager.mask_value(&json!("v"), "a", &record).unwrap();
        assert_eq!(result, MaskResult::Value(json!("high")));
        for _ in 0..10 {
            assert_eq!(manager.mask_value(&json!("v"), "a", &record).unwrap(), result);
        }
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let manager = StrategyManager::new();
        manager.add_strategy(fixed("first", 50, "first"));
        manager.add_strategy(fixed("second", 50, "second"));
        let names: Vec<_> = manager.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(
            manager.mask_value(&json!(1), "a", &RecordContext::default()).unwrap(),
            MaskResult::Value(json!("first"))
        );
    }

    #[test]
    fn test_removal_invalidates_order() {
        let manager = StrategyManager::new();
        manager.add_strategy(fixed("high", 90, "high"));
        manager.add_strategy(fixed("low", 10, "low"));
        assert_eq!(manager.summaries()[0].name, "high");
        assert_eq!(manager.remove_strategy("high"), 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(
            manager.mask_value(&json!(1), "a", &RecordContext::default()).unwrap(),
            MaskResult::Value(json!("low"))
        );
    }

    #[test]
    fn test_concurrent_registration_is_never_lost() {
        use std::thread;

        const NAMES: [&str; 8] = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"];
        let manager = Arc::new(StrategyManager::new());
        let record = RecordContext::default();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let record = record.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let _ = manager.mask_value(&json!("v"), "a", &record);
                    }
                })
            })
            .collect();
        let writers: Vec<_> = NAMES
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || manager.add_strategy(fixed(name, i as i32, name)))
            })
            .collect();
        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert_eq!(manager.summaries().len(), NAMES.len());
        assert_eq!(
            manager.mask_value(&json!("v"), "a", &record).unwrap(),
            MaskResult::Value(json!("s7"))
        );
        manager.add_strategy(fixed("late", 100, "late"));
        assert_eq!(manager.summaries()[0].name, "late");
    }

    #[test]
    fn test_container_resolution_requires_opt_in() {
        let manager = StrategyManager::new();
        manager.add_strategy(fixed("scalar_only", 90, "x"));
        let record = RecordContext::default();
        assert!(manager.resolve(&json!({"k": 1}), "a", &record).is_some());
        assert!(manager.resolve_container(&json!({"k": 1}), "a", &record).is_none());
    }

    #[test]
    fn test_no_applicable_strategy_returns_value() {
        let manager = StrategyManager::new();
        assert!(manager.is_empty());
        assert_eq!(
            manager.mask_value(&json!(7), "n", &RecordContext::default()).unwrap(),
            MaskResult::Value(json!(7))
        );
    }
}
