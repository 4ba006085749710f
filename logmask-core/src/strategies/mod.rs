//! Concrete implementations of the `MaskingStrategy` trait.
//!
//! * `regex_strategy`: substitutes pattern matches in the string form of a value.
//! * `field_path`: applies a [`crate::config::FieldRule`] addressed by dot path.
//! * `data_type`: replaces values by their primitive type.
//! * `conditional`: gates another strategy on record-level predicates.
//! * `callback`: runs a user-supplied function for selected paths.
//! * `conditions`: ready-made predicates for `conditional`.

pub mod callback;
pub mod conditional;
pub mod conditions;
pub mod data_type;
pub mod field_path;
pub mod regex_strategy;

pub use callback::{CallbackMaskingStrategy, CallbackStrategyBuilder, MaskCallback};
pub use conditional::{Condition, ConditionSet, ConditionalMaskingStrategy, Conjunction};
pub use data_type::DataTypeMaskingStrategy;
pub use field_path::FieldPathMaskingStrategy;
pub use regex_strategy::RegexMaskingStrategy;

/// Default priority of [`CallbackMaskingStrategy`].
pub const CALLBACK_PRIORITY: i32 = 100;
/// Default priority of [`FieldPathMaskingStrategy`].
pub const FIELD_PATH_PRIORITY: i32 = 80;
/// Default priority of [`RegexMaskingStrategy`].
pub const REGEX_PRIORITY: i32 = 60;
/// Default priority of [`DataTypeMaskingStrategy`].
pub const DATA_TYPE_PRIORITY: i32 = 40;

/// Include/exclude filtering shared by strategies that accept path filters.
/// An empty include list admits every path; exclusion always wins.
pub(crate) fn path_admitted(include: &[String], exclude: &[String], path: &str) -> bool {
    if exclude.iter().any(|p| crate::path::matches(p, path)) {
        return false;
    }
    include.is_empty() || include.iter().any(|p| crate::path::matches(p, path))
}
