pub mod cloud;
pub mod mock;
pub mod ports;

pub use cloud::CloudTtsService;
pub use mock::MockTtsService;
pub use ports::{SpeechRequest, SpeechResponse, TtsService};
