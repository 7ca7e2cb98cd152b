use crate::error::{Result, SearchError};
use crate::parse::{parse_match_line, parse_search_summary, strip_fuzzy_score};
use crate::scope::{resolve_scope, ScopePlan};
use scour_engine::{classify_failure, files_args, search_args, CaseFlag, CommandRequest, QueryFlags};
use scour_glob::{normalize_path, CompiledGlob, PatternScope};
use scour_indexer::{IndexService, RootInfo};
use scour_protocol::{
    CaseMode, FileMatch, FileSearchMode, FileSearchRequest, FileSearchResponse, SearchMatch,
    TextSearchRequest, TextSearchResponse, DEFAULT_MAX_RESULTS, MAX_RESULTS_CEILING,
};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Queries never mutate index state and may run concurrently; the only
/// wait is a bounded poll for roots that have never been initialized.
#[derive(Clone)]
pub struct QueryEngine {
    service: IndexService,
    init_poll: Duration,
    init_budget: Duration,
}

struct Ceiling {
    applied: usize,
    /// Echoed back only when the caller's value was adjusted.
    requested: Option<usize>,
}

struct RootQueryOutcome {
    matches: Vec<SearchMatch>,
    paths: Vec<String>,
    total: u64,
    engine_capped: bool,
}

impl QueryEngine {
    #[must_use]
    pub fn new(service: IndexService) -> Self {
        Self::with_init_wait(service, Duration::from_millis(500), Duration::from_secs(60))
    }

    /// Same engine with custom auto-init pacing; tests shrink both.
    #[must_use]
    pub fn with_init_wait(service: IndexService, poll: Duration, budget: Duration) -> Self {
        Self {
            service,
            init_poll: poll,
            init_budget: budget,
        }
    }

    pub async fn text_search(&self, request: &TextSearchRequest) -> Result<TextSearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let roots = self.service.root_infos();
        let plan = resolve_scope(request.search_path.as_deref(), &roots)?;
        self.ensure_targets_ready(&plan.targets).await?;

        let ceiling = resolve_ceiling(request.max_results);
        let case_applied = request.case.unwrap_or_else(|| smart_case(query));
        let case_flag = match request.case {
            Some(CaseMode::Sensitive) => CaseFlag::Sensitive,
            Some(CaseMode::Insensitive) => CaseFlag::Insensitive,
            None => CaseFlag::Smart,
        };

        let outcomes = self
            .run_per_root(&plan, ceiling.applied, |target| {
                let flags = QueryFlags {
                    path_filter: plan.filter.clone(),
                    case: case_flag,
                    limit: ceiling.applied,
                };
                search_args(&target.config_path, &flags, query)
            })
            .await?;

        let mut matches = Vec::new();
        let mut total_available = 0u64;
        let mut engine_capped = false;
        for outcome in outcomes {
            total_available += outcome.total;
            engine_capped |= outcome.engine_capped;
            matches.extend(outcome.matches);
        }
        total_available = total_available.max(matches.len() as u64);

        matches.truncate(ceiling.applied);
        let count = matches.len();
        let capped = engine_capped || (count as u64) < total_available;

        Ok(TextSearchResponse {
            matches,
            count,
            total_available: total_available as usize,
            capped,
            case_mode_applied: case_applied,
            max_results_applied: ceiling.applied,
            max_results_requested: ceiling.requested,
        })
    }

    pub async fn file_search(&self, request: &FileSearchRequest) -> Result<FileSearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let roots = self.service.root_infos();
        let plan = resolve_scope(request.search_path.as_deref(), &roots)?;
        self.ensure_targets_ready(&plan.targets).await?;

        let ceiling = resolve_ceiling(request.max_results);
        let mode = request.mode;

        let outcomes = self
            .run_per_root(&plan, ceiling.applied, |target| {
                let flags = QueryFlags {
                    path_filter: plan.filter.clone(),
                    case: CaseFlag::Smart,
                    limit: ceiling.applied,
                };
                files_args(&target.config_path, &flags, mode_token(mode), query)
            })
            .await?;

        // Dedup by normalized absolute path across all targeted roots,
        // before the caller ceiling so `total_available` is honest.
        let mut seen: HashSet<String> = HashSet::new();
        let mut files = Vec::new();
        let mut engine_capped = false;
        for outcome in outcomes {
            engine_capped |= outcome.engine_capped;
            for path in outcome.paths {
                if seen.insert(path.clone()) {
                    files.push(FileMatch { path });
                }
            }
        }
        let total_available = files.len();

        files.truncate(ceiling.applied);
        let count = files.len();
        let capped = engine_capped || count < total_available;

        Ok(FileSearchResponse {
            files,
            count,
            total_available,
            capped,
            max_results_applied: ceiling.applied,
            max_results_requested: ceiling.requested,
        })
    }

    /// Runs the engine once per target root, concurrently, preserving
    /// root order in the collected outcomes.
    async fn run_per_root(
        &self,
        plan: &ScopePlan,
        limit: usize,
        make_args: impl Fn(&RootInfo) -> Vec<String>,
    ) -> Result<Vec<RootQueryOutcome>> {
        let mut handles = Vec::with_capacity(plan.targets.len());
        for target in &plan.targets {
            let service = self.service.clone();
            let target = target.clone();
            let args = make_args(&target);
            let matcher = plan.matcher.clone();
            handles.push(tokio::spawn(async move {
                query_root(&service, &target, &args, limit, matcher.as_ref()).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|err| SearchError::Engine(format!("query task failed: {err}")))??;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Auto-initializes uninitialized targets and polls until ready,
    /// within a bounded budget. On timeout the error names every root
    /// still not ready.
    async fn ensure_targets_ready(&self, targets: &[RootInfo]) -> Result<()> {
        let pending: Vec<RootInfo> = targets
            .iter()
            .filter(|target| !self.service.is_initialized(&target.root))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        for target in &pending {
            log::info!("query triggered init for {}", target.name);
            self.service.request_init(&target.root)?;
        }

        let deadline = Instant::now() + self.init_budget;
        loop {
            let waiting: Vec<String> = pending
                .iter()
                .filter(|target| !self.service.is_initialized(&target.root))
                .map(|target| target.name.clone())
                .collect();
            if waiting.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SearchError::InitTimeout(waiting.join(", ")));
            }
            tokio::time::sleep(self.init_poll).await;
        }
    }
}

async fn query_root(
    service: &IndexService,
    target: &RootInfo,
    args: &[String],
    limit: usize,
    matcher: Option<&CompiledGlob>,
) -> Result<RootQueryOutcome> {
    let purpose = if args.first().map(String::as_str) == Some("files") {
        "file search failed"
    } else {
        "text search failed"
    };

    let output = service
        .runner()
        .run(CommandRequest {
            binary: service.engine_binary(),
            args,
            cwd: &target.root,
            group: None,
            progress: None,
        })
        .await
        .map_err(|err| SearchError::Engine(format!("{purpose}: {err}")))?;

    if output.exit_code != 0 {
        return Err(SearchError::Engine(classify_failure(purpose, &output)));
    }

    if purpose.starts_with("file") {
        parse_files_output(&output.stdout, target, limit, matcher)
    } else {
        parse_search_output(&output.stdout, target, matcher)
    }
}

fn parse_search_output(
    stdout: &str,
    target: &RootInfo,
    matcher: Option<&CompiledGlob>,
) -> Result<RootQueryOutcome> {
    let root_norm = normalize_path(&target.root.display().to_string());
    let mut outcome = RootQueryOutcome {
        matches: Vec::new(),
        paths: Vec::new(),
        total: 0,
        engine_capped: false,
    };
    let mut summary_total = None;

    for line in stdout.lines() {
        if let Some((count, plus)) = parse_search_summary(line) {
            summary_total = Some(count);
            outcome.engine_capped |= plus;
            continue;
        }
        let Some((path, line_no, preview)) = parse_match_line(line) else {
            continue;
        };
        let Some((absolute, relative)) = resolve_within_root(&root_norm, path) else {
            log::debug!("dropping match outside root {root_norm}: {path}");
            continue;
        };
        if !matcher_accepts(matcher, &absolute, &relative) {
            continue;
        }
        outcome.matches.push(SearchMatch {
            path: absolute,
            line: line_no,
            preview: preview.to_string(),
        });
    }

    outcome.total = if matcher.is_some() {
        // Glob filtering happened after the engine; the summary count no
        // longer describes what the caller can get.
        outcome.matches.len() as u64
    } else {
        summary_total
            .unwrap_or(0)
            .max(outcome.matches.len() as u64)
    };
    Ok(outcome)
}

fn parse_files_output(
    stdout: &str,
    target: &RootInfo,
    limit: usize,
    matcher: Option<&CompiledGlob>,
) -> Result<RootQueryOutcome> {
    let root_norm = normalize_path(&target.root.display().to_string());
    let mut outcome = RootQueryOutcome {
        matches: Vec::new(),
        paths: Vec::new(),
        total: 0,
        engine_capped: false,
    };

    let mut emitted_lines = 0usize;
    for line in stdout.lines() {
        let line = line.trim_end();
        if line.is_empty() || parse_search_summary(line).is_some() {
            continue;
        }
        emitted_lines += 1;
        let path = strip_fuzzy_score(line);
        let Some((absolute, relative)) = resolve_within_root(&root_norm, path) else {
            log::debug!("dropping file outside root {root_norm}: {path}");
            continue;
        };
        if !matcher_accepts(matcher, &absolute, &relative) {
            continue;
        }
        outcome.paths.push(absolute);
    }

    // `files` has no summary line; filling the `L` ceiling exactly is the
    // only truncation signal available.
    outcome.engine_capped = limit > 0 && emitted_lines >= limit;
    outcome.total = outcome.paths.len() as u64;
    Ok(outcome)
}

/// Normalizes an engine-reported path and verifies it stays inside the
/// owning root. Returns the absolute and root-relative forms.
fn resolve_within_root(root_norm: &str, path: &str) -> Option<(String, String)> {
    let norm = normalize_path(path);
    if norm.split('/').any(|segment| segment == "..") {
        return None;
    }

    if is_absolute_like(&norm) {
        let rest = norm.strip_prefix(root_norm)?;
        let relative = if rest.is_empty() {
            String::new()
        } else {
            rest.strip_prefix('/')?.to_string()
        };
        Some((norm, relative))
    } else {
        Some((format!("{root_norm}/{norm}"), norm))
    }
}

fn matcher_accepts(matcher: Option<&CompiledGlob>, absolute: &str, relative: &str) -> bool {
    let Some(matcher) = matcher else { return true };
    match matcher.scope() {
        PatternScope::Absolute => matcher.is_match(absolute),
        PatternScope::WorkspaceRelative => matcher.is_match(relative),
    }
}

fn is_absolute_like(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn resolve_ceiling(requested: Option<usize>) -> Ceiling {
    let applied = requested
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_RESULTS_CEILING);
    Ceiling {
        applied,
        requested: requested.filter(|&value| value != applied),
    }
}

/// Smart-case: any uppercase letter in the query forces case-sensitive.
fn smart_case(query: &str) -> CaseMode {
    if query.chars().any(char::is_uppercase) {
        CaseMode::Sensitive
    } else {
        CaseMode::Insensitive
    }
}

fn mode_token(mode: FileSearchMode) -> &'static str {
    match mode {
        FileSearchMode::PathRegex => "path",
        FileSearchMode::NameRegex => "name",
        FileSearchMode::Plain => "plain",
        FileSearchMode::Fuzzy => "fuzzy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scour_protocol::ProgressSnapshot;
    use std::path::Path;

    fn target(root: &str) -> RootInfo {
        RootInfo {
            root: Path::new(root).to_path_buf(),
            name: Path::new(root)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            config_path: Path::new(root).join(".scour/scour.cfg"),
            initialized: true,
            watch_alive: false,
            progress: ProgressSnapshot::default(),
            pending_ops: 0,
        }
    }

    #[test]
    fn smart_case_policy() {
        assert_eq!(smart_case("needle"), CaseMode::Insensitive);
        assert_eq!(smart_case("Needle"), CaseMode::Sensitive);
        assert_eq!(smart_case("nee dle9"), CaseMode::Insensitive);
    }

    #[test]
    fn ceiling_clamps_and_echoes() {
        let unclamped = resolve_ceiling(Some(20));
        assert_eq!(unclamped.applied, 20);
        assert_eq!(unclamped.requested, None);

        let clamped = resolve_ceiling(Some(5000));
        assert_eq!(clamped.applied, MAX_RESULTS_CEILING);
        assert_eq!(clamped.requested, Some(5000));

        let floor = resolve_ceiling(Some(0));
        assert_eq!(floor.applied, 1);
        assert_eq!(floor.requested, Some(0));

        assert_eq!(resolve_ceiling(None).applied, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn search_output_drops_escaping_and_malformed_lines() {
        let stdout = "\
src/main.rs:3:fn main() {}\n\
../outside.rs:4:evil\n\
/elsewhere/other.rs:5:also evil\n\
src/bad.rs:zero:not a number\n\
Search complete, found 4 matches in 0.01 sec\n";
        let outcome = parse_search_output(stdout, &target("/work/alpha"), None).unwrap();
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].path, "/work/alpha/src/main.rs");
        assert_eq!(outcome.matches[0].line, 3);
        // The summary still reports what the engine saw.
        assert_eq!(outcome.total, 4);
        assert!(!outcome.engine_capped);
    }

    #[test]
    fn search_summary_plus_marks_engine_cap() {
        let stdout = "src/a.rs:1:x\nSearch complete, found 1000+ matches in 2 sec\n";
        let outcome = parse_search_output(stdout, &target("/work/alpha"), None).unwrap();
        assert!(outcome.engine_capped);
        assert_eq!(outcome.total, 1000);
    }

    #[test]
    fn files_output_strips_scores_and_dedup_happens_upstream() {
        let stdout = "93\tsrc/main.rs\n0.5 src/lib.rs\nsrc/plain.rs\n";
        let outcome = parse_files_output(stdout, &target("/work/alpha"), 50, None).unwrap();
        assert_eq!(
            outcome.paths,
            vec![
                "/work/alpha/src/main.rs".to_string(),
                "/work/alpha/src/lib.rs".to_string(),
                "/work/alpha/src/plain.rs".to_string(),
            ]
        );
        assert!(!outcome.engine_capped);
    }

    #[test]
    fn files_output_at_the_ceiling_reads_as_engine_capped() {
        let stdout = "src/a.rs\nsrc/b.rs\n";
        let outcome = parse_files_output(stdout, &target("/work/alpha"), 2, None).unwrap();
        assert!(outcome.engine_capped);
    }

    #[test]
    fn glob_matcher_filters_results() {
        let matcher = CompiledGlob::compile("src/**/*.rs", PatternScope::WorkspaceRelative).unwrap();
        let stdout = "\
src/main.rs:1:keep\n\
docs/readme.md:2:drop\n\
Search complete, found 2 matches in 0.01 sec\n";
        let outcome = parse_search_output(stdout, &target("/work/alpha"), Some(&matcher)).unwrap();
        assert_eq!(outcome.matches.len(), 1);
        // Post-filtered totals reflect what survived the matcher.
        assert_eq!(outcome.total, 1);
    }

    #[test]
    fn absolute_engine_paths_are_verified_against_the_root() {
        let stdout = "/work/alpha/src/a.rs:1:ok\n/work/alphabet/src/b.rs:1:escape\n";
        let outcome = parse_search_output(stdout, &target("/work/alpha"), None).unwrap();
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].path, "/work/alpha/src/a.rs");
    }
}
