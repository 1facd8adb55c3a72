/// What to do with containers left behind once a run has failed.
///
/// - `Cleanup`: stop and remove everything that was created (default).
/// - `DontCleanup`: leave created containers in place so they can be
///   inspected, and tell the user how to remove them afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BehaviourAfterFailure {
    #[default]
    Cleanup,
    DontCleanup,
}

impl BehaviourAfterFailure {
    pub fn from_no_cleanup_flag(no_cleanup_after_failure: bool) -> Self {
        if no_cleanup_after_failure {
            BehaviourAfterFailure::DontCleanup
        } else {
            BehaviourAfterFailure::Cleanup
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_maps_to_policy() {
        assert_eq!(
            BehaviourAfterFailure::from_no_cleanup_flag(true),
            BehaviourAfterFailure::DontCleanup
        );
        assert_eq!(
            BehaviourAfterFailure::from_no_cleanup_flag(false),
            BehaviourAfterFailure::Cleanup
        );
        assert_eq!(
            BehaviourAfterFailure::default(),
            BehaviourAfterFailure::Cleanup
        );
    }
}
