pub mod cart;
pub mod ops;
pub mod orders;
