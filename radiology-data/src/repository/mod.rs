// Repository module structure
pub mod errors;
mod billing;
mod in_memory;
mod storage;
mod tables;

// Re-export commonly used types
pub use errors::RepositoryError;
pub use billing::{BillingRepository, BillingRepositoryTrait};
pub use tables::{TableRepository, TableRepositoryTrait, KNOWN_TABLES};
pub use in_memory::InMemoryStorage;

// Mock repositories for both testing and when the mock feature is enabled
#[cfg(any(test, feature = "mock"))]
pub mod tests {
    pub use super::billing::tests::MockBillingRepository;
    pub use super::tables::tests::MockTableRepository;
}
