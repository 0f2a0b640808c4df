//! SWC transpile strategy.
//!
//! Full parse and transform through SWC: TypeScript stripping, JSX,
//! decorators and any syntax the fast strategy declines. The emitted module
//! goes through the same CommonJS rewrite as the fast strategy.
//!
//! ## Feature Flags
//!
//! - `swc`: Enable the SWC integration. Without it the strategy declines
//!   every input so the chain reports a clear reason.

#![allow(clippy::default_trait_access)]

use super::{CompilerBackend, CompilerError, TranspileOutput, TranspileSpec};

/// SWC-based compiler backend.
///
/// `SwcBackend` is `Send + Sync`; each call to `transpile` builds its own
/// source map and globals.
#[derive(Debug, Clone, Default)]
pub struct SwcBackend {
    _private: (),
}

impl SwcBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl CompilerBackend for SwcBackend {
    fn name(&self) -> &'static str {
        "swc"
    }

    fn transpile(
        &self,
        spec: &TranspileSpec,
        source: &str,
    ) -> Result<TranspileOutput, CompilerError> {
        if source.is_empty() {
            return Ok(TranspileOutput::new("", self.name()));
        }

        #[cfg(not(feature = "swc"))]
        {
            let _ = spec;
            Err(CompilerError::unsupported_file(
                "built without the `swc` feature",
            ))
        }

        #[cfg(feature = "swc")]
        {
            let code = compile_with_swc(spec, source)?;
            let code = super::cjs::to_commonjs(&code).map_err(|e| {
                CompilerError::transform_error(format!("module rewrite failed: {e}"))
            })?;
            Ok(TranspileOutput::new(code, self.name()))
        }
    }
}

#[cfg(feature = "swc")]
fn compile_with_swc(spec: &TranspileSpec, source: &str) -> Result<String, CompilerError> {
    use super::spec::SourceSyntax;
    use swc_common::{
        comments::SingleThreadedComments, errors::Handler, sync::Lrc, FileName, Globals, Mark,
        SourceMap, GLOBALS,
    };
    use swc_ecma_ast::{EsVersion, Program};
    use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
    use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
    use swc_ecma_transforms_base::{fixer::fixer, hygiene::hygiene, resolver};
    use swc_ecma_transforms_react::{react, Options as ReactOptions, Runtime};
    use swc_ecma_transforms_typescript::strip;
    use swc_ecma_visit::FoldWith;

    let cm: Lrc<SourceMap> = Default::default();

    // Errors travel through Result; the handler output is discarded.
    let handler = Handler::with_emitter_writer(Box::new(std::io::sink()), Some(cm.clone()));

    let filename = spec
        .input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.js");
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(filename.to_string())),
        source.to_string(),
    );

    let is_ts = spec.syntax.is_typescript();
    let is_jsx = spec.syntax.allows_jsx();
    let syntax = match spec.syntax {
        SourceSyntax::TypeScript | SourceSyntax::Tsx => Syntax::Typescript(TsSyntax {
            tsx: is_jsx,
            decorators: true,
            ..Default::default()
        }),
        SourceSyntax::JavaScript => Syntax::Es(EsSyntax {
            jsx: true,
            decorators: true,
            ..Default::default()
        }),
    };

    let target = EsVersion::Es2022;

    let comments = SingleThreadedComments::default();

    let lexer = Lexer::new(syntax, target, StringInput::from(&*fm), Some(&comments));
    let mut parser = Parser::new_from(lexer);

    let module = parser.parse_module().map_err(|e| {
        let kind = format!("{:?}", e.kind());
        e.into_diagnostic(&handler).emit();
        CompilerError::parse_error(format!("Failed to parse: {kind}"))
    })?;

    let errors: Vec<String> = parser
        .take_errors()
        .into_iter()
        .map(|e| format!("{:?}", e.kind()))
        .collect();
    if !errors.is_empty() {
        return Err(CompilerError::parse_error(errors.join(", ")));
    }

    let output = GLOBALS.set(&Globals::default(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        let mut program = Program::Module(module);
        program = program.fold_with(&mut resolver(unresolved_mark, top_level_mark, is_ts));
        if is_ts {
            program = program.fold_with(&mut strip(unresolved_mark, top_level_mark));
        }

        let mut module = match program {
            Program::Module(m) => m,
            Program::Script(s) => swc_ecma_ast::Module {
                span: s.span,
                body: s
                    .body
                    .into_iter()
                    .map(swc_ecma_ast::ModuleItem::Stmt)
                    .collect(),
                shebang: s.shebang,
            },
        };

        if is_jsx {
            let react_options = ReactOptions {
                runtime: Some(Runtime::Classic),
                import_source: Some("react".to_string()),
                ..Default::default()
            };
            module = module.fold_with(&mut react(
                cm.clone(),
                Some(&comments),
                react_options,
                top_level_mark,
                unresolved_mark,
            ));
        }

        module = module.fold_with(&mut hygiene());
        module = module.fold_with(&mut fixer(Some(&comments)));
        module
    });

    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: swc_ecma_codegen::Config::default().with_target(target),
            cm: cm.clone(),
            comments: Some(&comments),
            wr: writer,
        };
        emitter
            .emit_module(&output)
            .map_err(|e| CompilerError::transform_error(format!("Failed to emit: {e}")))?;
    }

    String::from_utf8(buf)
        .map_err(|e| CompilerError::transform_error(format!("Invalid UTF-8 output: {e}")))
}
