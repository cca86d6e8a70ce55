// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Intent router for natural-language code queries.
//!
//! A query is classified into a [`QueryIntent`], its targets (file, symbol,
//! search term) are extracted, and the matching handler answers it. Each
//! handler prefers the code-intelligence backend when the supervisor reports
//! it Ready and falls back to deterministic extraction or text search when
//! the backend is absent, errors, or returns nothing.
//!
//! | Intent        | Backend call                       | Fallback                      |
//! |---------------|------------------------------------|-------------------------------|
//! | ListSymbols   | `document_symbols`                 | regex symbol extraction       |
//! | Definition    | `definition` / `workspace_symbols` | regex extraction, text search |
//! | References    | `references`                       | whole-word text search        |
//! | Diagnostics   | `diagnostics`                      | none                          |
//! | Explain       | `definition`                       | regex extraction + snippet    |
//! | Search        | `workspace_symbols`                | literal text search           |
//!
//! The router never returns `Err` and never panics on bad input; every
//! outcome is a [`CodeQueryResult`].

pub mod fallback;
mod intent;
mod types;

pub use intent::{classify, extract_paths, extract_search_term, extract_symbol, QueryIntent, QueryTargets};
pub use types::{Citation, CodeQueryResult, Explanation, QueryData, SymbolInfo};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::debug;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::RuntimeError;
use crate::lsp::{uri_to_path, CodeIntelligence, Location};
use crate::supervisor::RuntimeSupervisor;
use crate::tools::{SearchHit, SearchOptions, TextSearcher};
use crate::trace::TraceCategory;
use fallback::{definition_pattern, extract_symbols, locate_symbol, reference_pattern, snippet, Language};

/// Lines of source returned with an explanation.
pub const EXPLAIN_CONTEXT_LINES: usize = 15;

/// Resolved targets for one query.
struct QueryContext {
    workspace: PathBuf,
    file: Option<PathBuf>,
    targets: QueryTargets,
}

impl QueryContext {
    /// Path relative to the workspace when inside it.
    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.workspace)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    fn cite(&self, location: &Location) -> Citation {
        let path = uri_to_path(&location.uri).unwrap_or_else(|| PathBuf::from(&location.uri));
        Citation::new(self.relative(&path), location.range.start.display_line())
    }
}

/// Routes code queries to the backend or a deterministic fallback.
pub struct IntentRouter {
    supervisor: Arc<RuntimeSupervisor>,
    searcher: Arc<dyn TextSearcher>,
    max_results: usize,
}

impl IntentRouter {
    pub fn new(supervisor: Arc<RuntimeSupervisor>, searcher: Arc<dyn TextSearcher>) -> Self {
        let max_results = supervisor.config().search.max_results;
        Self {
            supervisor,
            searcher,
            max_results,
        }
    }

    pub fn classify(&self, query: &str) -> QueryIntent {
        classify(query)
    }

    /// Answer a query. `file` overrides any path mentioned in the query.
    #[cfg_attr(feature = "telemetry", instrument(skip(self), fields(intent)))]
    pub async fn handle(&self, query: &str, file: Option<&Path>) -> CodeQueryResult {
        let started = Instant::now();
        let intent = classify(query);

        #[cfg(feature = "telemetry")]
        tracing::Span::current().record("intent", intent.as_str());

        let ctx = self.context(query, file);
        let result = match intent {
            QueryIntent::ListSymbols => self.list_symbols(&ctx).await,
            QueryIntent::Definition => self.definition(&ctx).await,
            QueryIntent::References => self.references(&ctx).await,
            QueryIntent::Diagnostics => self.diagnostics(&ctx).await,
            QueryIntent::Explain => self.explain(&ctx).await,
            QueryIntent::Search => self.search(&ctx).await,
            QueryIntent::Unknown => CodeQueryResult::failed(
                intent,
                RuntimeError::UnknownIntent(query.to_string()).to_string(),
            ),
        };

        let params = json!({ "query": query, "intent": intent });
        match result.error {
            Some(ref error) if !result.success => self.supervisor.trace().record_err(
                TraceCategory::Router,
                "handle",
                params,
                error,
                started.elapsed(),
            ),
            _ => self.supervisor.trace().record_ok(
                TraceCategory::Router,
                "handle",
                params,
                json!({
                    "backend_used": result.backend_used,
                    "fallback_used": result.fallback_used,
                    "items": result.item_count(),
                }),
                started.elapsed(),
            ),
        }

        debug!(
            intent = %intent,
            success = result.success,
            backend_used = result.backend_used,
            fallback_used = result.fallback_used,
            "Query handled"
        );
        result
    }

    fn context(&self, query: &str, file: Option<&Path>) -> QueryContext {
        let workspace = self.supervisor.workspace();
        let targets = QueryTargets::extract(query);

        let absolute = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                workspace.join(p)
            }
        };

        let file = match file {
            Some(explicit) => Some(absolute(explicit)),
            None => {
                let candidates: Vec<PathBuf> =
                    targets.files.iter().map(|f| absolute(Path::new(f))).collect();
                candidates
                    .iter()
                    .find(|p| p.is_file())
                    .or_else(|| candidates.first())
                    .cloned()
            }
        };

        QueryContext {
            workspace,
            file,
            targets,
        }
    }

    async fn backend(&self) -> Option<Arc<dyn CodeIntelligence>> {
        self.supervisor.code_intelligence().await
    }

    /// The query names nothing to look up. With the backend down this is
    /// still reported as a failed fallback.
    async fn missing_target(&self, intent: QueryIntent, message: &str) -> CodeQueryResult {
        let result = CodeQueryResult::failed(intent, message);
        if self.backend().await.is_some() {
            result
        } else {
            with_fallback(result, None)
        }
    }

    async fn text_search(
        &self,
        ctx: &QueryContext,
        pattern: &str,
        root: &Path,
    ) -> Result<Vec<SearchHit>, String> {
        let options = SearchOptions::default().with_max_results(self.max_results);
        let hits = self
            .searcher
            .search(pattern, root, &options)
            .await
            .map_err(|e| e.to_string())?;
        Ok(hits
            .into_iter()
            .map(|mut hit| {
                hit.file = ctx.relative(&hit.file);
                hit
            })
            .collect())
    }

    // ------------------------------------------------------------------------
    // ListSymbols
    // ------------------------------------------------------------------------

    async fn list_symbols(&self, ctx: &QueryContext) -> CodeQueryResult {
        let intent = QueryIntent::ListSymbols;
        let Some(file) = ctx.file.as_deref() else {
            return self.missing_target(intent, "No file given: name a file to list its symbols").await;
        };
        let relative = ctx.relative(file);

        let mut backend_error = None;
        if let Some(backend) = self.backend().await {
            match backend.document_symbols(file).await {
                Ok(symbols) if !symbols.is_empty() => {
                    let infos: Vec<SymbolInfo> = symbols
                        .iter()
                        .flat_map(|s| s.flatten())
                        .map(|s| {
                            SymbolInfo::new(
                                &s.name,
                                s.kind.to_symbol_kind(),
                                s.selection_range.start.display_line(),
                            )
                        })
                        .collect();
                    let citations = infos
                        .iter()
                        .map(|s| Citation::new(&relative, s.line))
                        .collect();
                    return CodeQueryResult::answered(intent, QueryData::Symbols(infos), citations)
                        .via_backend();
                }
                Ok(_) => backend_error = Some("backend returned no symbols".to_string()),
                Err(e) => backend_error = Some(e.to_string()),
            }
        }

        let result = match tokio::fs::read_to_string(file).await {
            Ok(content) => {
                let symbols = extract_symbols(&content, Language::from_path(file));
                if symbols.is_empty() {
                    CodeQueryResult::failed(intent, format!("No symbols found in {}", relative.display()))
                } else {
                    let citations = symbols
                        .iter()
                        .map(|s| Citation::new(&relative, s.line))
                        .collect();
                    CodeQueryResult::answered(intent, QueryData::Symbols(symbols), citations)
                }
            }
            Err(e) => CodeQueryResult::failed(intent, format!("Cannot read {}: {e}", relative.display())),
        };
        with_fallback(result, backend_error)
    }

    // ------------------------------------------------------------------------
    // Definition
    // ------------------------------------------------------------------------

    async fn definition(&self, ctx: &QueryContext) -> CodeQueryResult {
        let intent = QueryIntent::Definition;
        let Some(symbol) = ctx.targets.symbol.as_deref() else {
            return self.missing_target(intent, "No symbol given: name the symbol to look up").await;
        };

        let mut backend_error = None;
        if let Some(backend) = self.backend().await {
            match self.backend_definition(backend.as_ref(), ctx, symbol).await {
                Ok(citations) if !citations.is_empty() => {
                    return CodeQueryResult::answered(
                        intent,
                        QueryData::Locations(citations.clone()),
                        citations,
                    )
                    .via_backend();
                }
                Ok(_) => backend_error = Some(format!("backend found no definition of {symbol}")),
                Err(e) => backend_error = Some(e),
            }
        }

        let result = match self.find_definitions(ctx, symbol).await {
            Ok(citations) if !citations.is_empty() => {
                CodeQueryResult::answered(intent, QueryData::Locations(citations.clone()), citations)
            }
            Ok(_) => CodeQueryResult::failed(intent, format!("No definition of {symbol} found")),
            Err(e) => CodeQueryResult::failed(intent, e),
        };
        with_fallback(result, backend_error)
    }

    /// 0-indexed position of `symbol` in `file`.
    async fn position_of(&self, file: &Path, symbol: &str) -> Result<(u32, u32), String> {
        let content = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
        locate_symbol(&content, symbol)
            .ok_or_else(|| format!("{symbol} does not appear in {}", file.display()))
    }

    async fn backend_definition(
        &self,
        backend: &dyn CodeIntelligence,
        ctx: &QueryContext,
        symbol: &str,
    ) -> Result<Vec<Citation>, String> {
        match ctx.file.as_deref() {
            Some(file) => {
                let (line, character) = self.position_of(file, symbol).await?;
                let locations = backend
                    .definition(file, line, character)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(locations.iter().map(|l| ctx.cite(l)).collect())
            }
            None => {
                let symbols = backend
                    .workspace_symbols(symbol)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(symbols
                    .iter()
                    .filter(|s| s.name == symbol)
                    .map(|s| ctx.cite(&s.location))
                    .collect())
            }
        }
    }

    /// Regex extraction in the named file, then a declaration search across
    /// the workspace.
    async fn find_definitions(&self, ctx: &QueryContext, symbol: &str) -> Result<Vec<Citation>, String> {
        if let Some(file) = ctx.file.as_deref() {
            if let Ok(content) = tokio::fs::read_to_string(file).await {
                let relative = ctx.relative(file);
                let citations: Vec<Citation> = extract_symbols(&content, Language::from_path(file))
                    .into_iter()
                    .filter(|s| s.name == symbol)
                    .map(|s| Citation::new(&relative, s.line))
                    .collect();
                if !citations.is_empty() {
                    return Ok(citations);
                }
            }
        }

        let hits = self
            .text_search(ctx, &definition_pattern(symbol), &ctx.workspace)
            .await?;
        Ok(hits.into_iter().map(|h| Citation::new(h.file, h.line)).collect())
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    async fn references(&self, ctx: &QueryContext) -> CodeQueryResult {
        let intent = QueryIntent::References;
        let Some(symbol) = ctx.targets.symbol.as_deref() else {
            return self.missing_target(intent, "No symbol given: name the symbol to find references to").await;
        };

        let mut backend_error = None;
        if let Some(backend) = self.backend().await {
            let attempt = match ctx.file.as_deref() {
                Some(file) => match self.position_of(file, symbol).await {
                    Ok((line, character)) => backend
                        .references(file, line, character)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e),
                },
                None => Err("no file to anchor the references request".to_string()),
            };
            match attempt {
                Ok(locations) if !locations.is_empty() => {
                    let citations: Vec<Citation> = locations.iter().map(|l| ctx.cite(l)).collect();
                    return CodeQueryResult::answered(
                        intent,
                        QueryData::Locations(citations.clone()),
                        citations,
                    )
                    .via_backend();
                }
                Ok(_) => backend_error = Some(format!("backend found no references to {symbol}")),
                Err(e) => backend_error = Some(e),
            }
        }

        let result = match self
            .text_search(ctx, &reference_pattern(symbol), &ctx.workspace)
            .await
        {
            Ok(hits) if !hits.is_empty() => {
                let citations = hits.iter().map(|h| Citation::new(&h.file, h.line)).collect();
                CodeQueryResult::answered(intent, QueryData::Matches(hits), citations)
            }
            Ok(_) => CodeQueryResult::failed(intent, format!("No references to {symbol} found")),
            Err(e) => CodeQueryResult::failed(intent, e),
        };
        with_fallback(result, backend_error)
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    async fn diagnostics(&self, ctx: &QueryContext) -> CodeQueryResult {
        let intent = QueryIntent::Diagnostics;
        let Some(backend) = self.backend().await else {
            return with_fallback(
                CodeQueryResult::failed(intent, "Diagnostics have no deterministic fallback"),
                None,
            );
        };

        match backend.diagnostics(ctx.file.as_deref()).await {
            Ok(diagnostics) if diagnostics.is_empty() => {
                CodeQueryResult::failed(intent, "No diagnostics reported").via_backend()
            }
            Ok(diagnostics) => {
                let citations = diagnostics
                    .iter()
                    .map(|d| {
                        let path = uri_to_path(&d.uri).unwrap_or_else(|| PathBuf::from(&d.uri));
                        Citation::new(ctx.relative(&path), d.range.start.display_line())
                    })
                    .collect();
                CodeQueryResult::answered(intent, QueryData::Diagnostics(diagnostics), citations)
                    .via_backend()
            }
            Err(e) => with_fallback(
                CodeQueryResult::failed(intent, "Diagnostics have no deterministic fallback"),
                Some(e.to_string()),
            ),
        }
    }

    // ------------------------------------------------------------------------
    // Explain
    // ------------------------------------------------------------------------

    async fn explain(&self, ctx: &QueryContext) -> CodeQueryResult {
        let intent = QueryIntent::Explain;
        let Some(symbol) = ctx.targets.symbol.as_deref() else {
            return self.missing_target(intent, "No symbol given: name the symbol to explain").await;
        };

        let mut backend_error = None;
        if let Some(backend) = self.backend().await {
            match self.backend_definition(backend.as_ref(), ctx, symbol).await {
                Ok(citations) => match citations.into_iter().next() {
                    Some(citation) => match self.explanation(ctx, symbol, citation).await {
                        Ok(result) => return result.via_backend(),
                        Err(e) => backend_error = Some(e),
                    },
                    None => backend_error = Some(format!("backend found no definition of {symbol}")),
                },
                Err(e) => backend_error = Some(e),
            }
        }

        let result = match self.find_definitions(ctx, symbol).await {
            Ok(citations) => match citations.into_iter().next() {
                Some(citation) => self
                    .explanation(ctx, symbol, citation)
                    .await
                    .unwrap_or_else(|e| CodeQueryResult::failed(intent, e)),
                None => CodeQueryResult::failed(intent, format!("No definition of {symbol} found")),
            },
            Err(e) => CodeQueryResult::failed(intent, e),
        };
        with_fallback(result, backend_error)
    }

    async fn explanation(
        &self,
        ctx: &QueryContext,
        symbol: &str,
        citation: Citation,
    ) -> Result<CodeQueryResult, String> {
        let path = ctx.absolute(&citation.file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Cannot read {}: {e}", citation.file.display()))?;
        let explanation = Explanation {
            symbol: symbol.to_string(),
            file: citation.file.clone(),
            line: citation.line,
            snippet: snippet(&content, citation.line, EXPLAIN_CONTEXT_LINES),
        };
        Ok(CodeQueryResult::answered(
            QueryIntent::Explain,
            QueryData::Explanation(explanation),
            vec![citation],
        ))
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    async fn search(&self, ctx: &QueryContext) -> CodeQueryResult {
        let intent = QueryIntent::Search;
        let Some(term) = ctx
            .targets
            .search_term
            .as_deref()
            .or(ctx.targets.symbol.as_deref())
        else {
            return self.missing_target(intent, "No search term given").await;
        };

        let mut backend_error = None;
        if let Some(backend) = self.backend().await {
            match backend.workspace_symbols(term).await {
                Ok(symbols) if !symbols.is_empty() => {
                    let citations: Vec<Citation> =
                        symbols.iter().map(|s| ctx.cite(&s.location)).collect();
                    return CodeQueryResult::answered(
                        intent,
                        QueryData::Locations(citations.clone()),
                        citations,
                    )
                    .via_backend();
                }
                Ok(_) => backend_error = Some(format!("backend found no symbols matching {term}")),
                Err(e) => {
                    if e.is_unsupported() {
                        debug!("Workspace symbol search unsupported, using text search");
                    }
                    backend_error = Some(e.to_string());
                }
            }
        }

        let root = ctx.file.clone().unwrap_or_else(|| ctx.workspace.clone());
        let result = match self.text_search(ctx, &regex::escape(term), &root).await {
            Ok(hits) if !hits.is_empty() => {
                let citations = hits.iter().map(|h| Citation::new(&h.file, h.line)).collect();
                CodeQueryResult::answered(intent, QueryData::Matches(hits), citations)
            }
            Ok(_) => CodeQueryResult::failed(intent, format!("No matches for {term:?}")),
            Err(e) => CodeQueryResult::failed(intent, e),
        };
        with_fallback(result, backend_error)
    }
}

/// Mark a result as coming from the fallback path. On failure the error
/// also names why the backend was not used.
fn with_fallback(result: CodeQueryResult, backend_error: Option<String>) -> CodeQueryResult {
    let mut result = result.via_fallback();
    if !result.success {
        let backend = backend_error
            .unwrap_or_else(|| RuntimeError::BackendUnavailable("code intelligence".to_string()).to_string());
        let fallback = result.error.take().unwrap_or_default();
        result.error = Some(format!("{fallback} ({backend})"));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::lsp::{
        Diagnostic, DiagnosticSeverity, DocumentSymbol, LspError, LspResult, LspSymbolKind, Range,
        StaticLauncher, SymbolKind,
    };
    use crate::tools::WalkSearcher;
    use async_trait::async_trait;
    use tempfile::{tempdir, TempDir};

    /// Backend answering from fixed data.
    #[derive(Default)]
    struct FakeBackend {
        fail: bool,
        diagnostics: Vec<Diagnostic>,
    }

    impl FakeBackend {
        fn check(&self) -> LspResult<()> {
            if self.fail {
                Err(LspError::Timeout(500))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CodeIntelligence for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn document_symbols(&self, _file: &Path) -> LspResult<Vec<DocumentSymbol>> {
            self.check()?;
            Ok(vec![DocumentSymbol::new("foo", LspSymbolKind::Function, Range::line(0))])
        }

        async fn definition(&self, file: &Path, line: u32, _c: u32) -> LspResult<Vec<Location>> {
            self.check()?;
            Ok(vec![Location::from_path(file, Range::line(line))])
        }

        async fn references(&self, file: &Path, _l: u32, _c: u32) -> LspResult<Vec<Location>> {
            self.check()?;
            Ok(vec![
                Location::from_path(file, Range::line(0)),
                Location::from_path(file, Range::line(5)),
            ])
        }

        async fn diagnostics(&self, _file: Option<&Path>) -> LspResult<Vec<Diagnostic>> {
            self.check()?;
            Ok(self.diagnostics.clone())
        }
    }

    fn workspace() -> TempDir {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "def foo():\nclass Bar:\n").unwrap();
        std::fs::write(
            dir.path().join("util.py"),
            "from app import foo\n\ndef helper(x):\n    return foo(x)\n",
        )
        .unwrap();
        dir
    }

    async fn router(dir: &TempDir, backend: Option<FakeBackend>) -> IntentRouter {
        let mut builder = RuntimeSupervisor::builder(RuntimeConfig::for_workspace(dir.path()));
        if let Some(backend) = backend {
            builder = builder.code_intelligence(Arc::new(StaticLauncher::new(Arc::new(backend))));
        }
        let supervisor = Arc::new(builder.build().unwrap());
        supervisor.start().await.unwrap();
        IntentRouter::new(supervisor, Arc::new(WalkSearcher))
    }

    #[tokio::test]
    async fn test_list_symbols_fallback() {
        let dir = workspace();
        let router = router(&dir, None).await;

        let result = router
            .handle("list all functions and classes in app.py", None)
            .await;

        assert!(result.success);
        assert!(result.fallback_used);
        assert!(!result.backend_used);
        assert_eq!(
            result.data,
            Some(QueryData::Symbols(vec![
                SymbolInfo::new("foo", SymbolKind::Function, 1),
                SymbolInfo::new("Bar", SymbolKind::Class, 2),
            ]))
        );
        assert_eq!(result.citations[0], Citation::new("app.py", 1));
    }

    #[tokio::test]
    async fn test_list_symbols_backend() {
        let dir = workspace();
        let router = router(&dir, Some(FakeBackend::default())).await;

        let result = router.handle("list the functions in app.py", None).await;
        assert!(result.success);
        assert!(result.backend_used);
        assert!(!result.fallback_used);
        assert_eq!(result.item_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_falls_back() {
        let dir = workspace();
        let backend = FakeBackend {
            fail: true,
            ..Default::default()
        };
        let router = router(&dir, Some(backend)).await;

        let result = router.handle("list the functions in app.py", None).await;
        assert!(result.success);
        assert!(result.fallback_used);
        assert!(!result.backend_used);
        assert_eq!(result.item_count(), 2);
    }

    #[tokio::test]
    async fn test_definition_fallback_searches_workspace() {
        let dir = workspace();
        let router = router(&dir, None).await;

        let result = router.handle("where is helper defined?", None).await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.fallback_used);
        assert_eq!(result.citations, vec![Citation::new("util.py", 3)]);
    }

    #[tokio::test]
    async fn test_definition_backend_uses_symbol_position() {
        let dir = workspace();
        let router = router(&dir, Some(FakeBackend::default())).await;

        let result = router.handle("go to definition of helper", Some(Path::new("util.py"))).await;
        assert!(result.backend_used);
        // FakeBackend echoes the requested position.
        assert_eq!(result.citations, vec![Citation::new("util.py", 3)]);
    }

    #[tokio::test]
    async fn test_references_fallback() {
        let dir = workspace();
        let router = router(&dir, None).await;

        let result = router.handle("find references to foo", None).await;
        assert!(result.success);
        assert!(result.fallback_used);
        let files: Vec<_> = result.citations.iter().map(|c| c.file.clone()).collect();
        assert!(files.contains(&PathBuf::from("app.py")));
        assert!(files.contains(&PathBuf::from("util.py")));
        assert!(matches!(result.data, Some(QueryData::Matches(_))));
    }

    #[tokio::test]
    async fn test_references_backend() {
        let dir = workspace();
        let router = router(&dir, Some(FakeBackend::default())).await;

        let result = router.handle("who calls foo in util.py", None).await;
        assert!(result.backend_used);
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.citations[1], Citation::new("util.py", 6));
    }

    #[tokio::test]
    async fn test_diagnostics_without_backend() {
        let dir = workspace();
        let router = router(&dir, None).await;

        let result = router.handle("show diagnostics for app.py", None).await;
        assert!(!result.success);
        assert!(result.fallback_used);
        assert!(!result.backend_used);
        assert!(result.error.unwrap().contains("Backend unavailable"));
    }

    #[tokio::test]
    async fn test_diagnostics_with_backend() {
        let dir = workspace();
        let app = dir.path().canonicalize().unwrap().join("app.py");
        let backend = FakeBackend {
            diagnostics: vec![Diagnostic::new(
                crate::lsp::path_to_uri(&app),
                Range::from_coords(1, 0, 1, 5),
                DiagnosticSeverity::Error,
                "undefined name",
            )],
            ..Default::default()
        };
        let router = router(&dir, Some(backend)).await;

        let result = router.handle("any errors in app.py?", None).await;
        assert!(result.success);
        assert!(result.backend_used);
        assert_eq!(result.citations, vec![Citation::new("app.py", 2)]);
    }

    #[tokio::test]
    async fn test_explain_returns_snippet() {
        let dir = workspace();
        let router = router(&dir, None).await;

        let result = router.handle("explain `helper`", None).await;
        assert!(result.success);
        match result.data {
            Some(QueryData::Explanation(explanation)) => {
                assert_eq!(explanation.line, 3);
                assert!(explanation.snippet.starts_with("def helper(x):"));
                assert!(explanation.snippet.contains("return foo(x)"));
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_unsupported_backend_uses_text_search() {
        let dir = workspace();
        let router = router(&dir, Some(FakeBackend::default())).await;

        let result = router.handle("search for \"return foo\"", None).await;
        assert!(result.success);
        assert!(result.fallback_used);
        assert!(!result.backend_used);
        assert_eq!(result.citations, vec![Citation::new("util.py", 4)]);
    }

    #[tokio::test]
    async fn test_unknown_intent_attempts_nothing() {
        let dir = workspace();
        let router = router(&dir, Some(FakeBackend::default())).await;

        let result = router.handle("good morning", None).await;
        assert_eq!(result.intent, QueryIntent::Unknown);
        assert!(!result.success);
        assert!(!result.backend_used);
        assert!(!result.fallback_used);
    }

    #[tokio::test]
    async fn test_targetless_queries_without_backend_use_fallback() {
        let dir = workspace();
        let router = router(&dir, None).await;

        for query in ["list all functions", "go to definition", "find references"] {
            let result = router.handle(query, None).await;
            assert_ne!(result.intent, QueryIntent::Unknown, "{query}");
            assert!(!result.success, "{query}");
            assert!(!result.backend_used, "{query}");
            assert!(result.fallback_used, "{query}");
        }
    }

    #[tokio::test]
    async fn test_targetless_query_with_backend_is_not_fallback() {
        let dir = workspace();
        let router = router(&dir, Some(FakeBackend::default())).await;

        let result = router.handle("list all functions", None).await;
        assert!(!result.success);
        assert!(!result.fallback_used);
    }

    #[tokio::test]
    async fn test_missing_file_reports_error() {
        let dir = workspace();
        let router = router(&dir, None).await;

        let result = router.handle("list all functions in missing.py", None).await;
        assert!(!result.success);
        assert!(result.fallback_used);
        assert!(result.error.unwrap().contains("missing.py"));
    }

    #[tokio::test]
    async fn test_queries_are_traced() {
        let dir = workspace();
        let router = router(&dir, None).await;

        router.handle("list all functions in app.py", None).await;
        router.handle("good morning", None).await;

        let entries = router.supervisor.trace().entries_for(TraceCategory::Router);
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_error());
        assert!(entries[1].is_error());
    }
}
