// Stage control module for the Thorlabs ELL7 linear stage
//
// Provides:
// - ELL7 ASCII protocol (frames, position codec, response parsing)
// - Serial transport abstraction
// - High-level motion controller API

mod driver;
pub mod observer;
pub mod protocol;
pub mod transport;

pub use driver::MotionController;
pub use observer::{LogObserver, MotionObserver};
pub use protocol::{decode_position, encode_position, extract_position, Ell7Error};
pub use transport::{SerialTransport, Transport};
