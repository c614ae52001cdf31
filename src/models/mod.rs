pub mod pedido;

pub use pedido::*;
