//! Weekly archive backup: bundle the ETL archives into one dated zip and
//! mail it.
pub mod compress;
pub mod mailer;

pub use compress::{
    CompressPlan, DEFAULT_ARCHIVE_DIR, DEFAULT_COMPRESSED_DIR, DEFAULT_LOG_FILE, backup_file_name,
    clear_archives, compress_archives,
};
pub use mailer::{build_backup_message, send_backup};
