pub mod config;
pub mod dead_letter;
pub mod error;
pub mod http;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod message;
pub mod processor;
pub mod retry;
pub mod sequence;
pub mod worker;

pub use config::ConsumerConfig;
pub use dead_letter::DeadLetterPublisher;
pub use error::{AckError, DeadLetterReason, SettlementError};
pub use message::InboundMessage;
pub use processor::{BatchReport, MessageOutcome, SettlementProcessor};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use sequence::GlobalSequence;
pub use worker::{Acknowledger, FlowControl, NoFlowControl, WorkerPool};
