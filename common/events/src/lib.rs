pub mod model;
pub mod producer;
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;

pub use model::{
    BrokerMetadata, DeadLetterEnvelope, ErrorType, ParticipationEvent, ProducerError,
    ProducerResult, SinkError,
};
pub use producer::{EventSink, ParticipationProducer};
#[cfg(feature = "kafka")]
pub use producer::{kafka_producer_config, KafkaEventSink};
#[cfg(any(test, feature = "test-helpers"))]
pub use memory::{MemoryEventSink, SentMessage};

pub const PARTICIPATION_TOPIC: &str = "campaign-participation-topic";
pub const DEAD_LETTER_SUFFIX: &str = ".DLQ";

/// Dead-letter topic paired with a source topic.
pub fn dead_letter_topic(source: &str) -> String {
    format!("{source}{DEAD_LETTER_SUFFIX}")
}
