//! Lowering pipeline as salsa queries.
//!
//! ```text
//! GeneratorSource (method + options)
//!     │
//!     ▼
//! lower_generator ─► StateMachineType
//!     │
//!     └─► state_debug_map ─► StateDebugMap
//! ```
//!
//! Lowering failures are reported once per method through the
//! [`Diagnostic`] accumulator; the query then yields `None`.

use salsa::Accumulator;
use turnstile_core::{Diagnostic, DiagnosticSeverity};
use turnstile_ir::{MethodDecl, StateDebugMap, StateMachineType};
use turnstile_lower::{LoweringOptions, lower_method};

#[salsa::input(debug)]
pub struct GeneratorSource {
    #[returns(ref)]
    pub method: MethodDecl,
    #[returns(ref)]
    pub options: LoweringOptions,
}

/// Lower one generator method into its state-machine type.
#[salsa::tracked]
pub fn lower_generator(
    db: &dyn salsa::Database,
    source: GeneratorSource,
) -> Option<StateMachineType> {
    let method = source.method(db);
    match lower_method(method, source.options(db)) {
        Ok(machine) => Some(machine),
        Err(err) => {
            tracing::debug!(method = %method.name, %err, "lowering failed");
            Diagnostic {
                message: err.to_string(),
                span: err.span().unwrap_or(method.span),
                severity: DiagnosticSeverity::Error,
                phase: err.phase(),
            }
            .accumulate(db);
            None
        }
    }
}

/// Resume state → source location table of the lowered method.
#[salsa::tracked]
pub fn state_debug_map(db: &dyn salsa::Database, source: GeneratorSource) -> Option<StateDebugMap> {
    lower_generator(db, source).map(|machine| machine.states)
}

pub fn lowering_diagnostics(db: &dyn salsa::Database, source: GeneratorSource) -> Vec<Diagnostic> {
    lower_generator::accumulated::<Diagnostic>(db, source)
        .into_iter()
        .cloned()
        .collect()
}

/// Lowering result together with whatever was reported along the way.
#[derive(Debug)]
pub struct LoweringOutput {
    pub machine: Option<StateMachineType>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn lower_with_diagnostics(db: &dyn salsa::Database, source: GeneratorSource) -> LoweringOutput {
    LoweringOutput {
        machine: lower_generator(db, source),
        diagnostics: lowering_diagnostics(db, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salsa::Setter as _;
    use turnstile_core::{CompilationPhase, Span, TurnstileDatabaseImpl};
    use turnstile_ir::builder::*;
    use turnstile_ir::{Flavor, ResumeState};

    fn numbers() -> MethodDecl {
        MethodBuilder::new("numbers").build(vec![yield_return(int(1)), yield_return(int(2))])
    }

    #[test]
    fn test_lower_generator() {
        let db = TurnstileDatabaseImpl::default();
        let source = GeneratorSource::new(&db, numbers(), LoweringOptions::default());

        let machine = lower_generator(&db, source).unwrap();
        assert_eq!(machine.flavor, Flavor::Enumerator);
        assert!(lowering_diagnostics(&db, source).is_empty());

        let states = state_debug_map(&db, source).unwrap();
        let states: Vec<_> = states.iter().map(|(state, _)| state).collect();
        assert_eq!(states, vec![ResumeState(-5), ResumeState(-4)]);
    }

    #[test]
    fn test_failure_is_reported_once() {
        let db = TurnstileDatabaseImpl::default();
        let method = MethodBuilder::new("bad").build(vec![try_finally(
            vec![],
            vec![yield_return(int(1))],
        )]);
        let source = GeneratorSource::new(&db, method, LoweringOptions::default());

        let output = lower_with_diagnostics(&db, source);
        assert!(output.machine.is_none());
        assert_eq!(output.diagnostics.len(), 1);
        let diagnostic = &output.diagnostics[0];
        assert_eq!(diagnostic.phase, CompilationPhase::Lowering);
        assert_eq!(diagnostic.severity, DiagnosticSeverity::Error);
        assert_eq!(diagnostic.span, Span::new(4, 5));
        assert!(state_debug_map(&db, source).is_none());
    }

    #[test]
    fn test_options_change_is_picked_up() {
        let mut db = TurnstileDatabaseImpl::default();
        let source = GeneratorSource::new(&db, numbers(), LoweringOptions::default());
        assert!(lower_generator(&db, source).unwrap().get_enumerator.is_none());

        source
            .set_options(&mut db)
            .to(LoweringOptions::reiterable());
        let machine = lower_generator(&db, source).unwrap();
        assert_eq!(machine.flavor, Flavor::Reiterable);
        assert!(machine.get_enumerator.is_some());
    }
}
