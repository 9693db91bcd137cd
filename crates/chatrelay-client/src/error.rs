//! Error types for the chat client

use thiserror::Error;

use chatrelay_server::identity::UserIdError;
use chatrelay_server::store::StoreError;

/// Errors surfaced to the caller of the chat client
///
/// Relay and upstream failures are not in here: they end a send with an
/// apology message inside the conversation instead.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Another send is still streaming on this consumer
    #[error("A message is already being sent")]
    SendInFlight,

    /// The message text is empty or whitespace only
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// System messages only ever exist inside the relay
    #[error("System messages cannot be added to a conversation")]
    SystemMessage,

    /// `/open` named a chat number missing from the last listing
    #[error("No chat #{0}, run /chats first")]
    UnknownChat(usize),

    /// No user is signed in
    #[error("Not signed in")]
    NotSignedIn,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document store errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid user identifier
    #[error("Identity error: {0}")]
    Identity(#[from] UserIdError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
