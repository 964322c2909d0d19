pub mod buffer2;
pub mod file_format;
pub mod log_setup;
pub mod test_utils;

pub use buffer2::Buffer2;
pub use file_format::{deserialize, serialize, SerdeFormat, SerdeFormatError, SerdeFormatResult};

pub const EPSILON: f64 = 1e-6;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}
