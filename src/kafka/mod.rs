pub mod partitioner;
pub mod producer;
pub mod router;
pub mod serializer;

#[cfg(test)]
mod tests;

pub use partitioner::assign;
pub use producer::{BrokerSender, KafkaSender};
pub use router::route;
pub use serializer::{EventSerializer, PayloadFormat, PayloadSource};
