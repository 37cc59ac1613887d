pub mod hr;
pub mod http_json;
pub mod recruiting;
pub mod request_logger;
