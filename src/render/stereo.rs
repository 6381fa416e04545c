//! Once-per-pair gating for stereo rendering
//!
//! Multi-pass stereo invokes the pipeline twice per displayed frame. Work that
//! must happen once per frame (volume blending, the opaque copy) is gated by an
//! alternating latch that assumes strict left-then-right invocation.

use crate::core::view::{Eye, StereoMode};

#[derive(Debug, Default)]
pub struct StereoLatch {
    /// Left eye seen, right eye still to come
    mid_pair: bool,
    misfires: u64,
}

impl StereoLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true on the first invocation of a displayed frame
    pub fn fire(&mut self, mode: StereoMode, eye: Eye) -> bool {
        if mode.invocations_per_frame() < 2 {
            self.mid_pair = false;
            return true;
        }

        let fires = !self.mid_pair;
        self.mid_pair = !self.mid_pair;
        if fires && eye == Eye::Right {
            // Eyes arrived out of order; the pairing is now off by one
            self.misfires += 1;
            log::warn!("stereo latch fired on the right eye; per-frame work may repeat or be skipped");
        }
        fires
    }

    pub fn is_mid_pair(&self) -> bool {
        self.mid_pair
    }

    /// Number of times the latch fired on a right eye
    pub fn misfires(&self) -> u64 {
        self.misfires
    }

    pub fn reset(&mut self) {
        self.mid_pair = false;
    }
}
