//! Validated, immutable pattern snapshots handed to the engine.
//!
//! Editors mutate their own `StepPattern` and publish a new snapshot; the
//! engine swaps snapshots between handlers and never observes a half-edited
//! pattern.

use std::ops::Deref;
use std::sync::Arc;

use stepclock_types::{PatternError, ScaleMask, StepPattern};

#[derive(Debug, Clone)]
pub struct PatternSnapshot {
    pattern: Arc<StepPattern>,
    scale_mask: Option<ScaleMask>,
}

impl PatternSnapshot {
    /// Validate and freeze a pattern. Structural errors are reported here, never at tick time.
    pub fn new(pattern: StepPattern) -> Result<Self, PatternError> {
        pattern.validate()?;
        let scale_mask = pattern.scale_mask();
        Ok(Self {
            pattern: Arc::new(pattern),
            scale_mask,
        })
    }

    pub fn pattern(&self) -> &StepPattern {
        &self.pattern
    }

    pub fn scale_mask(&self) -> Option<&ScaleMask> {
        self.scale_mask.as_ref()
    }

    /// Copy with a different loop flag, sharing nothing mutable with `self`.
    pub fn with_looping(&self, looping: bool) -> Self {
        if self.pattern.looping == looping {
            return self.clone();
        }
        let mut pattern = (*self.pattern).clone();
        pattern.looping = looping;
        Self {
            pattern: Arc::new(pattern),
            scale_mask: self.scale_mask,
        }
    }
}

impl Deref for PatternSnapshot {
    type Target = StepPattern;

    fn deref(&self) -> &StepPattern {
        &self.pattern
    }
}
