pub mod openai;

pub use openai::{OpenAIEmbedder, DEFAULT_OPENAI_BASE_URL};
