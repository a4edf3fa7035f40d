pub mod actor;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod retry;
pub mod scenario;
pub mod scheduler;
pub mod settings;
pub mod state_machine;
pub mod transport;

pub use actor::{PublisherActor, PublisherHandle};
pub use capability::{ImsTransport, NetworkTechnology, PublishContent};
pub use config::PublisherConfig;
pub use engine::{PublishEngine, PublisherSnapshot, Trigger};
pub use error::{ConfigError, PublisherError, SettingsError, SubmitError};
pub use request::{LocalTrigger, PublishRequest, RequestId};
pub use settings::{SettingsProvider, StaticSettings, TtyMode};
pub use state_machine::{PublishState, StateChangeHandler};
pub use transport::{Accepted, PresenceTransport, Submission};
