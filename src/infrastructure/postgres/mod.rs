pub mod record_repo;
pub mod table_repo;

pub use record_repo::PgRecordRepository;
pub use table_repo::PgTableRepository;
