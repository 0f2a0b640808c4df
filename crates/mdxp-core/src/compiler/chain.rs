//! Ordered fallback over transpile strategies.

use tracing::{debug, trace};

use super::{CompilerBackend, CompilerError, Diagnostic, FastBackend, SwcBackend};
use super::{TranspileOutput, TranspileSpec};

/// Tries each strategy in order; the first success wins.
///
/// Failures of earlier strategies are kept as diagnostics on the output, and
/// if every strategy fails the error lists all of them.
pub struct TranspileChain {
    strategies: Vec<Box<dyn CompilerBackend>>,
}

impl TranspileChain {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn CompilerBackend>>) -> Self {
        Self { strategies }
    }

    /// `fast`, then `swc`.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![Box::new(FastBackend::new()), Box::new(SwcBackend::new())])
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain.
    ///
    /// # Errors
    /// Returns `COMPILER_TRANSFORM_ERROR` carrying one diagnostic per failed
    /// strategy when none succeeds.
    pub fn transpile(
        &self,
        spec: &TranspileSpec,
        source: &str,
    ) -> Result<TranspileOutput, CompilerError> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.transpile(spec, source) {
                Ok(mut output) => {
                    if !failures.is_empty() {
                        debug!(
                            path = %spec.input_path.display(),
                            strategy = strategy.name(),
                            fallbacks = failures.len(),
                            "transpiled after fallback"
                        );
                    }
                    failures.append(&mut output.diagnostics);
                    return Ok(output.with_diagnostics(failures));
                }
                Err(err) => {
                    trace!(
                        path = %spec.input_path.display(),
                        strategy = strategy.name(),
                        error = %err,
                        "transpile strategy failed"
                    );
                    failures.push(Diagnostic::error(err.to_string()).with_code(strategy.name()));
                }
            }
        }
        Err(CompilerError::transform_error(format!(
            "no transpile strategy could handle {}",
            spec.input_path.display()
        ))
        .with_diagnostics(failures))
    }
}

impl Default for TranspileChain {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(&'static str);

    impl CompilerBackend for Failing {
        fn name(&self) -> &'static str {
            self.0
        }

        fn transpile(&self, _: &TranspileSpec, _: &str) -> Result<TranspileOutput, CompilerError> {
            Err(CompilerError::parse_error(format!("{} gave up", self.0)))
        }
    }

    struct Echo;

    impl CompilerBackend for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn transpile(&self, _: &TranspileSpec, source: &str) -> Result<TranspileOutput, CompilerError> {
            Ok(TranspileOutput::new(source, "echo"))
        }
    }

    #[test]
    fn test_first_success_wins_and_keeps_failures() {
        let chain = TranspileChain::new(vec![Box::new(Failing("first")), Box::new(Echo)]);
        let output = chain.transpile(&TranspileSpec::new("a.js"), "x").unwrap();
        assert_eq!(output.code, "x");
        assert_eq!(output.strategy, "echo");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code.as_deref(), Some("first"));
    }

    #[test]
    fn test_all_failures_are_reported() {
        let chain = TranspileChain::new(vec![Box::new(Failing("a")), Box::new(Failing("b"))]);
        let err = chain.transpile(&TranspileSpec::new("x.js"), "").unwrap_err();
        assert_eq!(err.code, "COMPILER_TRANSFORM_ERROR");
        let text = err.to_string();
        assert!(text.contains("a gave up"));
        assert!(text.contains("b gave up"));
    }

    #[test]
    fn test_standard_order() {
        assert_eq!(TranspileChain::standard().strategy_names(), vec!["fast", "swc"]);
    }

    #[test]
    fn test_standard_chain_on_plain_jsx() {
        let output = TranspileChain::standard()
            .transpile(&TranspileSpec::new("a.jsx"), "export const a = <br/>;")
            .unwrap();
        assert_eq!(output.strategy, "fast");
        assert!(output.code.contains("const a = React.createElement(\"br\", null);"));
    }

    #[test]
    #[cfg(feature = "swc")]
    fn test_decorators_fall_back_to_swc() {
        let output = TranspileChain::standard()
            .transpile(&TranspileSpec::new("a.js"), "export default class { @dec m() {} }")
            .unwrap();
        assert_eq!(output.strategy, "swc");
        assert_eq!(output.diagnostics[0].code.as_deref(), Some("fast"));
    }

    #[test]
    #[cfg(not(feature = "swc"))]
    fn test_decorators_need_swc() {
        let err = TranspileChain::standard()
            .transpile(&TranspileSpec::new("a.js"), "export default class { @dec m() {} }")
            .unwrap_err();
        assert!(err.to_string().contains("decorators are not supported"));
    }
}
