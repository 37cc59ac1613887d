pub mod application;
pub mod employee_payload;
pub mod invocation;
