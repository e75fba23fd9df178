pub mod openai;
pub mod transcription;

pub use openai::OpenAiClient;
pub use transcription::OpenAiTranscriber;
