pub mod db;
pub mod files;

pub use db::{
    create_db, delete_merchant_rule, delete_one_off_override, get_merchant_rules,
    get_one_off_overrides, get_rule_book, save_merchant_rule, save_one_off_override, DbPool,
    StorageError,
};
pub use files::{
    delete_source_file, get_source_files, insert_source_file, list_source_files,
    sanitize_file_name, StoredFile,
};
