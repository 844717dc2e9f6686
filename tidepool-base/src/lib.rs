mod bitmap256;
mod error;


pub use bitmap256::{chunked_bitmaps, chunked_get, Bitmap256};
pub use error::{err, err_kind, Error, ErrorKind, Result};
