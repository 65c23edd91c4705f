pub mod dto;
pub mod events;
pub mod routes;
