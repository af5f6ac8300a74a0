pub mod address;
pub mod cart;
pub mod function;
pub mod turn;
