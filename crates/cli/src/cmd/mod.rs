mod rebuild;

pub use rebuild::cmd_rebuild;
