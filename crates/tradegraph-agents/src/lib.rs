pub mod debate;
pub mod error;
pub mod model_cli;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod reflection;
pub mod role_agent;
pub mod roster;

pub mod test_support;

pub use debate::{compute_thesis, DebateCoordinator, TIE_BAND};
pub use error::{AgentError, PipelineError};
pub use model_cli::{CliModelBackend, ModelBackend, ModelCliConfig};
pub use pipeline::DecisionPipeline;
pub use reflection::{reward, ReflectionReport, Reflector};
pub use role_agent::{LlmRoleAgent, OutcomeView, RoleAgent, RoleContext};
pub use roster::AgentRoster;
