pub mod client;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod delta;
pub mod error;
pub mod frame;
pub mod handle;
pub mod http_client;
pub mod model;
pub mod state;
pub mod stream;
pub mod telemetry;
pub mod utf8;

pub use client::StreamClient;
pub use config::{Config, MalformedPolicy};
pub use consumer::{Consumer, DeltaSink, FnSink, Outcome, consume};
pub use decoder::{Completion, SseDecoder, decode_all};
pub use error::{CoreResult, DeltaFeedError};
pub use handle::{ActiveStreams, Finished, StreamHandle};
pub use model::{GenerateRequest, StreamRequest};
pub use stream::{ByteStream, DeltaStream, StreamEvent};
