pub mod style_declaration;

pub use style_declaration::CssStyleDeclaration;
