use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

/// Cooperative abort request, set from a signal listener and polled at
/// checkpoints between subprocess calls.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Starts a background thread that sets `flag` on SIGINT or SIGTERM.
///
/// A running subprocess is never interrupted; the run stops at the next
/// checkpoint.
#[cfg(unix)]
pub fn capture(flag: &AbortFlag) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::warn;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let flag = flag.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            warn!(signal = sig, "interrupt received, stopping at next checkpoint");
            flag.set();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn capture(_flag: &AbortFlag) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = AbortFlag::new();
        let other = flag.clone();
        assert!(!other.is_set());
        flag.set();
        assert!(other.is_set());
    }
}
