pub mod checksum;
pub mod storage_service;
