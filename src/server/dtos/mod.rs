pub mod channel_dto;
pub mod health_dto;
