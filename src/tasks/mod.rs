//! Domain entities persisted by the `store` module: tasks, workflows, agent
//! state, recovery records, content dedup, and alert batches/deliveries.

pub mod agent_state;
pub mod alert;
pub mod dedup;
pub mod recovery;
pub mod task;
pub mod workflow;

pub use agent_state::{AgentState, AgentStatus};
pub use alert::{AlertBatch, AlertDelivery, BatchStatus, DeliveryStatus, ScheduleType};
pub use dedup::{ContentDedup, ContentType, ProcessingStatus};
pub use recovery::{RecoveryStatus, RecoveryStrategy, TaskRecovery};
pub use task::{Task, TaskStatus};
pub use workflow::{Workflow, WorkflowStatus};
