//! Types exchanged with collaborators outside the engine: reporting
//! vocabularies, login results and encrypted payload envelopes.

pub mod encrypted;
pub mod login;
pub mod report;
pub mod status;

pub use encrypted::EncryptedData;
pub use login::{LoginResult, LoginStatus};
pub use report::{ChannelReport, ConnectorReport, ContentReport, MessageReport};
pub use status::{ExternalContentType, ExternalDeployedState, ExternalStatus};
