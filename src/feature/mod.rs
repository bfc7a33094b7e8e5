pub mod file_crypt;
pub mod files;
pub mod identity;
