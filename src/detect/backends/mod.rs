pub mod change;
pub mod motion;

pub use change::ChangeBackend;
pub use motion::MotionBackend;
