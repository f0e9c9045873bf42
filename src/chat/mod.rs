pub mod gateway;
pub mod http;
pub mod intent;

pub use gateway::{ChatGateway, ChatMessage, ChatReply};
pub use intent::{Intent, classify, detect_units, extract_city_heuristic};
