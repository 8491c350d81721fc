//! Debounced persistence scheduling.
//!
//! Time is passed in by the caller as a monotonic timestamp (a `Duration`
//! since any fixed origin), so the same logic runs under a native clock, a
//! browser clock, or a test.

use std::time::Duration;

use log::{debug, info};

use crate::animation::{Codec, CodecError};
use crate::timeline::LayerStack;

/// Collapses bursts of events into one deferred action.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Duration>,
    muted: bool,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            muted: false,
        }
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// While muted nothing can be scheduled and a pending deadline is
    /// swallowed when it passes.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Replace any pending deadline with `now + delay`.
    pub fn schedule(&mut self, now: Duration) -> bool {
        if self.muted {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True exactly once per schedule, on the first poll at or after the
    /// deadline.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                !self.muted
            }
            _ => false,
        }
    }
}

/// Debounced pack of the whole stack. Storing the bytes is up to the caller.
#[derive(Debug, Clone)]
pub struct Autosave {
    debouncer: Debouncer,
    codec: Codec,
}

impl Autosave {
    pub fn new(codec: Codec, delay: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            codec,
        }
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn schedule(&mut self, now: Duration) {
        if self.debouncer.schedule(now) {
            debug!("autosave scheduled");
        }
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.debouncer.set_muted(muted);
    }

    /// Pack `stack` if the debounce deadline has passed.
    pub fn poll(
        &mut self,
        now: Duration,
        stack: &mut LayerStack,
    ) -> Result<Option<Vec<u8>>, CodecError> {
        if !self.debouncer.poll(now) {
            return Ok(None);
        }
        let bytes = self.codec.pack(stack)?;
        info!("autosave: {} bytes", bytes.len());
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CanvasConfig;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_debounce_collapses_bursts() {
        let mut debouncer = Debouncer::new(ms(100));
        debouncer.schedule(ms(0));
        debouncer.schedule(ms(50));
        assert!(!debouncer.poll(ms(120)));
        assert!(debouncer.poll(ms(150)));
        assert!(!debouncer.poll(ms(500)));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_cancel_and_mute() {
        let mut debouncer = Debouncer::new(ms(10));
        debouncer.schedule(ms(0));
        debouncer.cancel();
        assert!(!debouncer.poll(ms(100)));

        debouncer.set_muted(true);
        assert!(!debouncer.schedule(ms(0)));
        assert!(!debouncer.is_pending());

        debouncer.set_muted(false);
        debouncer.schedule(ms(0));
        debouncer.set_muted(true);
        assert!(!debouncer.poll(ms(100)));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_autosave_packs_when_due() {
        let config = CanvasConfig {
            cols: 8,
            rows: 8,
            frames: 2,
            ..Default::default()
        };
        let mut stack = LayerStack::new(&config);
        let codec = Codec::new(config.dimensions());
        let mut autosave = Autosave::new(codec, ms(500));

        assert_eq!(autosave.poll(ms(0), &mut stack).unwrap(), None);
        autosave.schedule(ms(0));
        assert_eq!(autosave.poll(ms(499), &mut stack).unwrap(), None);

        let bytes = autosave.poll(ms(500), &mut stack).unwrap().unwrap();
        assert_eq!(codec.unpack(&bytes).unwrap().layers.len(), 1);
    }
}
