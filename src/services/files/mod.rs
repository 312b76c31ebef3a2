pub mod reader;

pub use reader::FileLogReader;
