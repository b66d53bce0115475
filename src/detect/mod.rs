mod backend;
mod backends;
mod result;

pub use backend::{backend_by_name, DetectorBackend, BACKEND_NAMES};
pub use backends::{ChangeBackend, MotionBackend};
pub use result::DetectionResult;
