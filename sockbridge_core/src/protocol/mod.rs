//! Wire protocol: `{type, data}` JSON envelopes in text frames

mod envelope;
pub mod messages;

pub use envelope::{Envelope, decode, encode};
pub use messages::{
    CHUNK, ChunkData, END_CHUNKED_UPLOAD, ERROR, EndChunkedUpload, NOTIFICATION, POP_UP,
    START_CHUNKED_UPLOAD, StartChunkedUpload, TOAST,
};
