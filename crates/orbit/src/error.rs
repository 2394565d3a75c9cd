use geom::FrameId;
use hifitime::Epoch;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("date {requested} is outside the covered span [{min}, {max}]")]
    OutOfTimeRange {
        requested: Epoch,
        min: Epoch,
        max: Epoch,
    },
    #[error("invalid resampling step {step} s")]
    InvalidStep { step: f64 },
    #[error("expected samples in frame {expected}, got {actual}")]
    FrameMismatch { expected: FrameId, actual: FrameId },
    #[error("trajectory dates are not strictly increasing at sample {index}")]
    UnsortedTrajectory { index: usize },
    #[error("not enough samples: {needed} needed, {available} available")]
    NotEnoughSamples { needed: usize, available: usize },
}
