pub mod admin_dto;
pub mod delivery_dto;
pub mod public_dto;
