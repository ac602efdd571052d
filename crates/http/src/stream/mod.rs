//! Byte channels and the stream adapter built over them.
//!
//! Bodies flow through two layers:
//!
//! - [`ByteChannel`]: a minimal, synchronous, type-erased byte medium. Three
//!   implementations ship with the crate:
//!   - [`MemoryChannel`]: seekable in-memory buffer
//!   - [`PipeChannel`]: producer/consumer buffer for bodies arriving from the network
//!   - [`IoChannel`]: any blocking `Read + Write` handle, such as a file
//! - [`StreamAdapter`]: the asynchronous stream surface messages hold
//!   ([`InStream`] / [`OutStream`]), with open/close state and exception
//!   propagation.
//!
//! [`pump`] moves bytes between two adapters in fixed-size blocks.

mod adapter;
mod channel;
mod io;
mod memory;
mod pipe;
mod transfer;

pub use adapter::{InStream, OutStream, StreamAdapter, StreamElement};
pub use channel::{ByteChannel, OpenMode, StreamSize};
pub use io::IoChannel;
pub use memory::MemoryChannel;
pub use pipe::PipeChannel;
pub use transfer::{TRANSFER_CHUNK_SIZE, pump};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Creates a linked pair over a fresh [`PipeChannel`]: whatever is written to
/// the output side becomes readable from the input side.
pub fn producer_consumer() -> (InStream, OutStream) {
    let channel: Arc<dyn ByteChannel> = Arc::new(PipeChannel::new());
    (InStream::reader(Arc::clone(&channel)), OutStream::writer(channel))
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
