//! Handler results.

use serde::Serialize;
use serde_json::Value;

use super::stream::StreamReply;
use crate::codec::{FileDownload, RawData};
use crate::status::{HandlerError, Status};

/// Result every handler returns.
pub type HandlerResult = std::result::Result<Reply, HandlerError>;

/// What a handler produced on success.
#[derive(Debug)]
pub enum Reply {
    /// Nothing to return; only the status is sent.
    NoContent,
    /// A structured value, wrapped in a success envelope.
    Data(Value),
    /// Raw bytes, sent without an envelope.
    Raw(RawData),
    /// A file, sent without an envelope.
    File(FileDownload),
    /// A stream of envelopes. Only valid for streaming routes.
    Stream(StreamReply),
    /// Another reply sent with an explicit status and headers.
    WithStatus(Status, Box<Reply>),
}

impl Reply {
    /// Serialize `value` into a [`Reply::Data`].
    pub fn data<T: Serialize + ?Sized>(value: &T) -> HandlerResult {
        Ok(Reply::Data(serde_json::to_value(value)?))
    }

    /// Send this reply with `status`, e.g. `202 Accepted` or `201` plus a
    /// `Location` header. A non-2xx status turns the reply into a failure.
    pub fn with_status(self, status: Status) -> Reply {
        match self {
            Reply::WithStatus(_, inner) => Reply::WithStatus(status, inner),
            other => Reply::WithStatus(status, Box::new(other)),
        }
    }

    /// Whether this reply opens a stream.
    pub fn is_stream(&self) -> bool {
        match self {
            Reply::Stream(_) => true,
            Reply::WithStatus(_, inner) => inner.is_stream(),
            _ => false,
        }
    }

    /// Split off an explicit status, if any.
    pub(crate) fn into_status(self) -> (Option<Status>, Reply) {
        match self {
            Reply::WithStatus(status, inner) => (Some(status), inner.into_status().1),
            other => (None, other),
        }
    }
}

impl From<RawData> for Reply {
    fn from(raw: RawData) -> Self {
        Reply::Raw(raw)
    }
}

impl From<FileDownload> for Reply {
    fn from(file: FileDownload) -> Self {
        Reply::File(file)
    }
}

impl From<StreamReply> for Reply {
    fn from(stream: StreamReply) -> Self {
        Reply::Stream(stream)
    }
}
