pub mod client;
pub mod encode;
pub mod parser;
pub mod prompt;

pub use client::{GeminiClient, InferenceConfig, VisionModel};
pub use encode::{encode_file_for_model, encode_for_model, ModelImage};
pub use parser::{first_line, parse_line};
