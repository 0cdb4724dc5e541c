pub mod cache;
pub mod model;
pub mod quota;
pub mod request;
pub mod response;
pub mod usage;
