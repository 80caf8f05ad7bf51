use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generation of the session currently live on the line; 0 when idle.
///
/// Shared between the tracker, which opens and closes it, and in-flight
/// termination tasks, which check it before touching the call.
#[derive(Clone, Default)]
pub struct GenerationGate {
    live: Arc<AtomicU64>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, generation: u64) {
        self.live.store(generation, Ordering::SeqCst);
    }

    /// Close the gate if `generation` still owns it
    pub fn close(&self, generation: u64) -> bool {
        self.live
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn current(&self) -> Option<u64> {
        match self.live.load(Ordering::SeqCst) {
            0 => None,
            generation => Some(generation),
        }
    }

    pub fn is_live(&self, generation: u64) -> bool {
        generation != 0 && self.live.load(Ordering::SeqCst) == generation
    }
}

impl fmt::Debug for GenerationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GenerationGate").field(&self.current()).finish()
    }
}

/// A call the adapter may act on, tied to the session that owns it
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub generation: u64,
    pub number: String,
    gate: GenerationGate,
}

impl SessionHandle {
    pub fn new(generation: u64, number: impl Into<String>, gate: GenerationGate) -> Self {
        Self {
            generation,
            number: number.into(),
            gate,
        }
    }

    /// Whether the owning session is still the live one
    pub fn is_current(&self) -> bool {
        self.gate.is_live(self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_only_by_owner() {
        let gate = GenerationGate::new();
        assert_eq!(gate.current(), None);

        gate.open(3);
        assert!(!gate.close(2));
        assert_eq!(gate.current(), Some(3));
        assert!(gate.close(3));
        assert_eq!(gate.current(), None);
    }

    #[test]
    fn test_handle_goes_stale_on_supersede() {
        let gate = GenerationGate::new();
        gate.open(1);
        let first = SessionHandle::new(1, "5550100", gate.clone());
        assert!(first.is_current());

        gate.open(2);
        assert!(!first.is_current());
        assert!(SessionHandle::new(2, "5550199", gate).is_current());
    }
}
