pub mod barrier;
pub mod cancel;

pub use barrier::SessionBarrier;
pub use cancel::CancelToken;
