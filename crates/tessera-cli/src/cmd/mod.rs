pub mod cache;
pub mod compile;
pub mod fetch;
pub mod find_release_version;
pub mod sync_with_local;
pub mod update_release;
pub mod update_stemcell;
pub mod upload_release;
