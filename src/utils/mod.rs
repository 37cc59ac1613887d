pub mod ip;
pub mod request_id;
