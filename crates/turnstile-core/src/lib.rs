//! Turnstile compiler utilities.
pub mod diagnostic;
pub mod span;

pub use diagnostic::{CompilationPhase, Diagnostic, DiagnosticSeverity};
pub use span::Span;

#[derive(Default, Clone)]
#[salsa::db]
pub struct TurnstileDatabaseImpl {
    storage: salsa::Storage<Self>,
}

#[salsa::db]
impl salsa::Database for TurnstileDatabaseImpl {}
