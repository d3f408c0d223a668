pub mod codec;
pub mod config;
pub mod conn;
pub mod consumer;
pub mod display;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod publisher;
pub mod state;
pub mod transport;

pub use config::MonitorConfig;
pub use conn::{StompConnection, StompConnector};
pub use consumer::{Consumer, ConsumerHandle, ConsumerSettings, Handled};
pub use display::{DisplayAssets, ResultView};
pub use error::{ConfigError, DecodeError, FrameError};
pub use protocol::{ClubType, ControlCommand, IpcMessageKind, LaunchResult, Message, ResultKind};
pub use publisher::{ControlSink, LazyPublisher};
pub use state::{DisplayState, Merge, Monitor};
pub use transport::memory::MemoryBroker;
pub use transport::{Body, Connector, Envelope, TransportError};
