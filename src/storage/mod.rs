pub mod buffer;
pub mod file;
pub mod header;
pub mod terminal_table;

pub use buffer::ExtendableBuffer;
pub use header::Header;
pub use terminal_table::{TerminalPositionLookupTable, INVALID_TERMINAL_POS};
