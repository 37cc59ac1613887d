pub mod invocation_repository;
#[cfg(test)]
pub mod mock_invocation_repository;
pub mod postgres_invocation_repository;
