// Domain types, wire protocol and error taxonomy shared by every chatsync crate.

pub mod asset;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use asset::PhotoSource;
pub use error::{ChatError, TransportError};
pub use protocol::{OutgoingPost, TabSignal};
pub use types::{
    ConversationId, ConversationSnapshot, Direction, Message, MessageId, Mode, OperatorInfo,
    PanelState, TabId,
};
