//! Audio artifact encoding.

mod wav;

pub use wav::{encode_wav, write_wav};
