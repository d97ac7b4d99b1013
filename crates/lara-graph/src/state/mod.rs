//! Workflow state abstraction
//!
//! Defines how a step's partial output is folded into the shared state
//! record. Steps never mutate state directly: they return an update and the
//! runner calls [`WorkflowState::apply_update`] between steps.

mod merge;

pub use merge::{Append, FieldSpec, MergeStrategy, Overwrite, Reducer};

/// Trait for partial updates produced by a step
pub trait StateUpdate: Clone + Send + Sync + 'static {
    /// Create an empty (no-op) update
    fn empty() -> Self;

    /// Check if this update has no effect
    fn is_empty(&self) -> bool;
}

/// Trait for workflow state owned by the graph runner
///
/// # Example
///
/// ```ignore
/// declare_state! {
///     pub struct CounterState => CounterUpdate {
///         label: String => Overwrite,
///         events: Vec<String> => Append,
///     }
/// }
///
/// impl WorkflowState for CounterState {
///     type Update = CounterUpdate;
///
///     fn apply_update(&self, update: Self::Update) -> Self {
///         let mut next = self.clone();
///         next.merge(update);
///         next
///     }
/// }
/// ```
pub trait WorkflowState: Clone + Send + Sync + 'static {
    /// The update type produced by steps
    type Update: StateUpdate;

    /// Apply an update to produce a new state
    ///
    /// This should be a pure function - the original state is not modified.
    fn apply_update(&self, update: Self::Update) -> Self;

    /// Apply several updates in order
    fn apply_updates(&self, updates: Vec<Self::Update>) -> Self {
        updates
            .into_iter()
            .fold(self.clone(), |state, update| state.apply_update(update))
    }
}
