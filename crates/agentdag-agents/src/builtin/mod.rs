pub mod llm_chat;
pub mod mock;
pub mod nearby_search;
pub mod text;
pub mod weather;

pub use llm_chat::LlmChatAgent;
pub use mock::{CryptoMentionsAgent, CryptoSentimentAgent};
pub use nearby_search::NearBySearchAgent;
pub use text::{StaticAgent, TemplateAgent};
pub use weather::WeatherForecastAgent;
