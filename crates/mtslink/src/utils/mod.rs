mod files;

pub use files::{ensure_dir, non_empty_file_len, sanitize_recording_name};
