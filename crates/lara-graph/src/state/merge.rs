//! Per-field merge strategies and the `declare_state!` schema macro

use serde::{Deserialize, Serialize};

/// How a field's incoming value is combined with its current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Incoming value replaces the current one
    Overwrite,
    /// Incoming items are appended after the current ones, order preserved
    Append,
}

/// A merge rule for values of type `T`
pub trait Reducer<T> {
    /// Strategy reported in the state's field table
    const STRATEGY: MergeStrategy;

    /// Fold `incoming` into `current`
    fn reduce(current: &mut T, incoming: T);
}

/// Last write wins
#[derive(Debug, Clone, Copy, Default)]
pub struct Overwrite;

impl<T> Reducer<T> for Overwrite {
    const STRATEGY: MergeStrategy = MergeStrategy::Overwrite;

    fn reduce(current: &mut T, incoming: T) {
        *current = incoming;
    }
}

/// Concatenation; duplicates are not removed
#[derive(Debug, Clone, Copy, Default)]
pub struct Append;

impl<T> Reducer<Vec<T>> for Append {
    const STRATEGY: MergeStrategy = MergeStrategy::Append;

    fn reduce(current: &mut Vec<T>, incoming: Vec<T>) {
        current.extend(incoming);
    }
}

/// One entry of a declared state schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub strategy: MergeStrategy,
}

/// Declare a state record together with its partial-update type.
///
/// Each field names its reducer (`Overwrite` or `Append`, which must be in
/// scope). The macro generates:
///
/// - the state struct (`Debug, Clone, Default, PartialEq, Serialize, Deserialize`)
/// - the update struct, one `Option<T>` per field, with builder setters
/// - `State::merge(&mut self, update)` folding every present field through its reducer
/// - `Update::combine(self, later)` folding two updates with the same rules
/// - `State::FIELDS` and `State::merge_strategy(name)`
/// - a `StateUpdate` impl for the update type
///
/// ```ignore
/// declare_state! {
///     pub struct DraftState => DraftUpdate {
///         title: String => Overwrite,
///         revisions: Vec<String> => Append,
///     }
/// }
/// ```
#[macro_export]
macro_rules! declare_state {
    (
        $(#[$smeta:meta])*
        pub struct $state:ident => $update:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty => $reducer:ident
            ),* $(,)?
        }
    ) => {
        $(#[$smeta])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(default)]
        pub struct $state {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        #[doc = concat!("Partial update for [`", stringify!($state), "`]; absent fields are left untouched.")]
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $update {
            $(
                pub $field: Option<$ty>,
            )*
        }

        impl $update {
            $(
                #[doc = concat!("Set `", stringify!($field), "` in this update.")]
                pub fn $field(mut self, value: impl Into<$ty>) -> Self {
                    self.$field = Some(value.into());
                    self
                }
            )*

            /// Fold a later update into this one using each field's reducer.
            pub fn combine(mut self, later: Self) -> Self {
                $(
                    if let Some(incoming) = later.$field {
                        self.$field = Some(match self.$field.take() {
                            Some(mut current) => {
                                <$reducer as $crate::state::Reducer<$ty>>::reduce(&mut current, incoming);
                                current
                            }
                            None => incoming,
                        });
                    }
                )*
                self
            }
        }

        impl $crate::state::StateUpdate for $update {
            fn empty() -> Self {
                Self::default()
            }

            fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }
        }

        impl $state {
            /// Declared fields and their merge strategies, in declaration order
            pub const FIELDS: &'static [$crate::state::FieldSpec] = &[
                $(
                    $crate::state::FieldSpec {
                        name: stringify!($field),
                        strategy: <$reducer as $crate::state::Reducer<$ty>>::STRATEGY,
                    },
                )*
            ];

            /// Look up the merge strategy of a field by name
            pub fn merge_strategy(name: &str) -> Option<$crate::state::MergeStrategy> {
                Self::FIELDS
                    .iter()
                    .find(|spec| spec.name == name)
                    .map(|spec| spec.strategy)
            }

            /// Fold an update into this state, field by field
            pub fn merge(&mut self, update: $update) {
                $(
                    if let Some(incoming) = update.$field {
                        <$reducer as $crate::state::Reducer<$ty>>::reduce(&mut self.$field, incoming);
                    }
                )*
            }
        }
    };
}
