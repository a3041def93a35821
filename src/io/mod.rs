mod buf;
mod buf_mut;
mod frame;
mod read_buffer;

pub use buf::{Buf, BufExt};
pub use buf_mut::BufMutExt;
pub use frame::{write_message, MessageReader, MAX_FRAME_SIZE};
pub use read_buffer::ReadBuffer;
