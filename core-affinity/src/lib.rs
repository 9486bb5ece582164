#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Identifies one of the switch's pinned OS threads for core-affinity purposes.
///
/// `Forward(n)` covers however many per-core forward workers the process
/// starts, so unlike a fixed enum this maps to a core index rather than a
/// variant index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Control,
    Tap,
    Forward(usize),
}

impl ThreadRole {
    fn core_index(self) -> usize {
        match self {
            ThreadRole::Control => 0,
            ThreadRole::Tap => 1,
            ThreadRole::Forward(n) => 2 + n,
        }
    }
}

/// Number of CPUs available for pinning, used to size the forward-worker
/// cohort (`CPU_count - 2`, per the control and TAP threads taking the
/// first two slots).
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn core_count() -> usize {
    core_affinity::get_core_ids().map(|ids| ids.len()).unwrap_or(1)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn core_count() -> usize {
    1
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn set_core_affinity(thread: ThreadRole) {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        tracing::debug!("Unable to retrieve core IDs");
        return;
    };

    let index = thread.core_index();

    if core_ids.len() <= index {
        tracing::debug!(
            num_cores = %core_ids.len(),
            ?thread,
            "Not enough cores to uniquely pin this thread"
        );
        return;
    }

    let Some(core) = core_ids.get(index) else {
        tracing::debug!(?thread, "Failed to get core by index");
        return;
    };

    let result = core_affinity::set_for_current(*core);

    if !result {
        tracing::info!(?thread, ?core, "Failed to set core affinity");
        return;
    }

    tracing::debug!(?thread, ?core, "Set core affinity");
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn set_core_affinity(_: ThreadRole) {
    tracing::debug!("MacOS / iOS do not support setting core affinity");
}
