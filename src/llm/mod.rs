mod client_core;
pub mod error;
pub mod gateway;
pub mod history;
pub mod model_select;
pub mod normalize;
pub mod tool_execution;
pub mod tool_runtime;
pub mod types;

pub use client_core::OpenAIClient;
pub use error::{AgentError, GatewayError};
pub use gateway::ModelGateway;
pub use history::{CompressionPolicy, CompressionReport, ConversationState, HistoryError};
pub use model_select::{DefaultModelSelector, ModelSelector};
pub use normalize::{CallSource, NormalizedResponse, normalize};
pub use tool_execution::*;
pub use tool_runtime::RuntimeSettings;
pub use types::*;
