pub mod agents;
pub mod ask;
pub mod route;
pub mod serve;
