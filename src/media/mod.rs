//! Media intake: container sniffing, image decoding, video frame access, and key-frame sampling.

pub mod decode;
pub mod sample;
pub mod video;
