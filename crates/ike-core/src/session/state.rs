/// Lifecycle state of an IKE session (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Phase-1 is negotiating; not yet authenticated.
    HalfOpen,
    /// Phase-1 is complete; ModeCfg and Phase-2 may proceed.
    Established,
    /// Torn down, whether by peer delete, local request, or liveness
    /// failure.
    Deleted,
}
