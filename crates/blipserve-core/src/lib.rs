pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod source;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use config::*;
pub use error::*;
pub use source::*;
pub use tensor::*;

pub use image::RgbImage;
