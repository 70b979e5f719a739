pub mod alert;
pub mod audio;
pub mod config;
pub mod display;
pub mod model_download;
pub mod pipeline;
pub mod posture;
pub mod types;
