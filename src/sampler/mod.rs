mod loop_worker;
mod round;

pub(crate) use loop_worker::{sampling_loop, SamplerContext, SamplerExit};
pub use round::DetectionPipeline;
