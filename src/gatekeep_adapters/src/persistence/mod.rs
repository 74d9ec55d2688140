pub mod in_memory_document_store;
pub mod postgres_document_store;
