use std::num::ParseIntError;

use thiserror::Error;
use tsq_storage::{RecordId, StorageError};

/// A single operator request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Store the rest of the line as a record
    Put(String),
    /// Fetch the record with this identifier
    Get(RecordId),
}

/// Everything that can go wrong handling one action line
///
/// None of these end a session: each is shown to the operator as a single line
/// and the next action is read.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No service is bound")]
    NotBound,

    #[error("No action given")]
    MissingAction,

    #[error("Invalid input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("Invalid argument: {0}")]
    InvalidVerb(String),

    #[error("{0} requires an argument")]
    MissingArgument(&'static str),

    #[error("Invalid identifier {value}: {source}")]
    InvalidId {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Action {
    /// Parse an action line
    ///
    /// The first whitespace-delimited word is the verb, `PUT` or `GET` in any
    /// case. `PUT` takes the rest of the line as the record, spaces and all;
    /// `GET` takes a record identifier.
    ///
    /// # Errors
    /// If the line is blank, the verb is unknown, or the argument is missing or
    /// malformed
    pub fn parse(line: &str) -> Result<Self, DispatchError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DispatchError::MissingAction);
        }

        let (verb, argument) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim_start()));

        if verb.eq_ignore_ascii_case("PUT") {
            if argument.is_empty() {
                return Err(DispatchError::MissingArgument("PUT"));
            }

            Ok(Self::Put(argument.to_string()))
        } else if verb.eq_ignore_ascii_case("GET") {
            if argument.is_empty() {
                return Err(DispatchError::MissingArgument("GET"));
            }

            argument
                .parse::<RecordId>()
                .map(Self::Get)
                .map_err(|source| DispatchError::InvalidId {
                    value: argument.to_string(),
                    source,
                })
        } else {
            Err(DispatchError::InvalidVerb(verb.to_string()))
        }
    }

    /// The verb as the operator would type it.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Put(_) => "PUT",
            Self::Get(_) => "GET",
        }
    }
}
