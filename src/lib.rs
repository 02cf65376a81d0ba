pub mod encoder;
pub mod error;
pub mod frames;
pub mod page;
pub mod session;
pub mod settings;

pub use error::{RecorderError, RecorderResult};
pub use settings::Settings;
