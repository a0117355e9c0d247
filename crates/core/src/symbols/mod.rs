//! Symbol resolution for synthetic FX/metal pairs.

mod resolver;


pub use resolver::{ResolvedSpec, SymbolMapSnapshot, SymbolResolver};
