pub mod coordinator;
pub mod engine;
pub mod job;
pub mod queue;
pub mod results;
pub mod task;
pub mod wordcount;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorError};
pub use engine::{MapReduceApp, WorkDirs};
pub use job::{JobId, JobInfo, JobPhase, JobRequest};
pub use queue::{TaskQueue, DEFAULT_QUEUE_CAPACITY};
pub use results::JobResults;
pub use task::{KeyValue, Task, TaskId, TaskKind, TaskState};
pub use wordcount::WordCount;
pub use worker::{
    TaskAssignmentRequest, TaskAssignmentResponse, TaskCompleteRequest, TaskCompleteResponse,
    WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerId, WorkerMetrics,
    WorkerRegisterRequest, WorkerRegisterResponse,
};
