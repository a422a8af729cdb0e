pub mod adapter;
pub mod instance;
pub mod request;

pub use adapter::*;
pub use instance::*;
pub use request::*;
