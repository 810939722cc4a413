pub mod approval;
pub mod attachment;
pub mod cost;
pub mod customer;
pub mod payment;
pub mod preferences;
pub mod product;
pub mod reservation;
pub mod resource;
pub mod user;
