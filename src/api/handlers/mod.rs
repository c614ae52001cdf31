pub mod health;
pub mod pedidos;
