mod anorms;
mod buffer;
mod read;
mod write;

pub use anorms::{BYTE_DIRS, NUM_VERTEX_NORMALS};
pub use buffer::MsgBuf;
pub use read::Legacy;
pub use write::{angle16_to_wire, angle_to_wire, coord_to_wire, dir_to_index};
