//! Fulfillment worker.
//!
//! Consumes dining jobs, looks up matching restaurants and emails the
//! recommendations:
//!
//! - **WorkerContext**: Injected queue, search index, record store and notifier
//! - **Invocation**: Push (batch in the payload) or pull (receive from the queue)
//! - **FulfillmentWorker**: The per-job pipeline and its acknowledgement rules
//! - **Poller**: Repeated pull invocations until shutdown
//!
//! # Example
//!
//! ```rust,ignore
//! use dining_concierge::worker::{FulfillmentWorker, WorkerContext};
//!
//! let ctx = WorkerContext::new(queue, search, store, notifier).with_config(config);
//! let worker = FulfillmentWorker::new(ctx);
//! let result = worker.handle_event(&serde_json::json!({})).await;
//! println!("{}", serde_json::to_string(&result)?);
//! ```

pub mod context;
pub mod fulfillment;
pub mod invocation;
pub mod poller;

pub use context::WorkerContext;
pub use fulfillment::{BatchReport, FulfillmentWorker, JobOutcome, TerminalFailure};
pub use invocation::{
    BatchItemFailure, DeliveryMode, Invocation, InvocationBody, InvocationError,
    InvocationResult,
};
pub use poller::{Poller, PollerStats};
