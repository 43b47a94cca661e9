pub mod disposable;
pub mod syntax;

pub use disposable::DisposableChecker;
pub use syntax::{SyntaxOptions, SyntaxValidator};
