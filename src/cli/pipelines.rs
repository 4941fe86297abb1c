//! GB-019: CI pipeline and commit statistics reports.

use super::{for_each_project, project_param};
use crate::core::error::{Error, RemoteError};
use crate::core::params::Param;
use crate::core::registry::{Args, Registry};
use crate::core::template::expand;
use crate::core::types::{CommitStats, Entry, Pipeline, Project};
use crate::transport::RemoteService;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

pub(super) fn register(registry: &mut Registry) {
    registry
        .register(
            "get-last-pipeline",
            "Get status of the last pipeline of multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::flag("summary-only", "Print only summaries (ratio of states across projects)."),
            ],
            cmd_get_last_pipeline,
        )
        .register(
            "get-pipeline-at-commit",
            "Get status of the pipeline of a given commit in multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::string("commit")
                    .metavar("COMMIT_SHA_WITH_FORMAT")
                    .help("Commit to look for; the newest pipeline when omitted."),
            ],
            cmd_get_pipeline_at_commit,
        )
        .register(
            "commit-stats",
            "Get basic added/removed lines for projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::string("branch")
                    .metavar("BRANCH_WITH_FORMAT")
                    .help("Branch to walk; the project's default branch when omitted."),
            ],
            cmd_commit_stats,
        );
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct JobReport {
    status: String,
    id: u64,
    name: String,
}

/// One project's entry in the JSON report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PipelineReport {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<Vec<JobReport>>,
}

impl PipelineReport {
    fn none() -> Self {
        Self {
            status: "none".to_string(),
            id: None,
            commit: None,
            jobs: None,
        }
    }
}

fn report(remote: &dyn RemoteService, project: &Project, pipeline: Option<&Pipeline>) -> Result<PipelineReport, RemoteError> {
    let Some(pipeline) = pipeline else {
        return Ok(PipelineReport::none());
    };
    let jobs = remote
        .list_pipeline_jobs(project.id, pipeline.id)?
        .into_iter()
        .map(|j| JobReport {
            status: j.status,
            id: j.id,
            name: j.name,
        })
        .collect();
    Ok(PipelineReport {
        status: pipeline.status.clone(),
        id: Some(pipeline.id),
        commit: Some(pipeline.sha.clone()),
        jobs: Some(jobs),
    })
}

/// Newest non-skipped pipeline at or before `sha` (pipelines are newest first).
fn pipeline_at_commit<'p>(pipelines: &'p [Pipeline], sha: Option<&str>) -> Option<&'p Pipeline> {
    let start = match sha {
        Some(sha) => pipelines.iter().position(|p| p.sha == sha || p.sha.starts_with(sha))?,
        None => 0,
    };
    pipelines[start..].iter().find(|p| p.status != "skipped")
}

/// `state: count (pct%)` lines, most frequent first, then the total.
fn summarize(reports: &IndexMap<String, PipelineReport>) -> String {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for report in reports.values() {
        *counts.entry(report.status.as_str()).or_default() += 1;
    }
    counts.sort_by(|_, a, _, b| b.cmp(a));

    let total = reports.len();
    let mut out = String::new();
    for (status, count) in &counts {
        let pct = if total == 0 { 0.0 } else { *count as f64 * 100.0 / total as f64 };
        out.push_str(&format!("{}: {} ({:.0}%)\n", status, count, pct));
    }
    out.push_str(&format!("total: {}\n", total));
    out
}

fn to_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer).map_err(std::io::Error::from)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn collect_reports<F>(args: &Args<'_>, limit: Option<usize>, mut pick: F) -> Result<IndexMap<String, PipelineReport>, Error>
where
    F: FnMut(&Entry, &[Pipeline]) -> Result<Option<Pipeline>, Error>,
{
    let remote = args.remote()?;
    let mut reports = IndexMap::new();
    for_each_project(args, |entry, project| {
        let pipelines = remote.list_pipelines(project.id, limit)?;
        let chosen = pick(entry, &pipelines)?;
        reports.insert(
            project.path_with_namespace.clone(),
            report(remote, project, chosen.as_ref())?,
        );
        Ok(())
    })?;
    Ok(reports)
}

fn cmd_get_last_pipeline(args: &Args<'_>) -> Result<(), Error> {
    let reports = collect_reports(args, Some(1), |_, pipelines| Ok(pipelines.first().cloned()))?;
    if args.flag("summary-only")? {
        print!("{}", summarize(&reports));
    } else {
        println!("{}", to_json(&reports)?);
    }
    Ok(())
}

fn cmd_get_pipeline_at_commit(args: &Args<'_>) -> Result<(), Error> {
    let commit_template = args.opt_string("commit")?;
    let reports = collect_reports(args, None, |entry, pipelines| {
        let sha = commit_template.map(|t| expand(t, entry)).transpose()?;
        Ok(pipeline_at_commit(pipelines, sha.as_deref()).cloned())
    })?;
    println!("{}", to_json(&reports)?);
    Ok(())
}

/// Per-commit entry of the `commit-stats` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct CommitDetail {
    parents: Vec<String>,
    subject: String,
    line_stats: CommitStats,
    author_email: String,
    author_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ProjectCommits {
    project: String,
    commits: IndexMap<String, CommitDetail>,
}

/// Every commit on `branch`, each looked up on its own for parents and stats.
fn commit_details(
    remote: &dyn RemoteService,
    project: &Project,
    branch: &str,
) -> Result<IndexMap<String, CommitDetail>, RemoteError> {
    let mut details = IndexMap::new();
    for listed in remote.list_commits(project.id, branch, None)? {
        let commit = remote.get_commit(project.id, &listed.id)?;
        let author_date = commit.authored_at();
        details.insert(
            commit.id,
            CommitDetail {
                parents: commit.parent_ids,
                subject: commit.title,
                line_stats: commit.stats.unwrap_or_default(),
                author_email: commit.author_email,
                author_date,
            },
        );
    }
    Ok(details)
}

fn cmd_commit_stats(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let branch_template = args.opt_string("branch")?;
    let mut result = Vec::new();
    for_each_project(args, |entry, project| {
        let branch = match branch_template {
            Some(template) => expand(template, entry)?,
            None => project.default_branch.clone().unwrap_or_else(|| "master".to_string()),
        };
        result.push(ProjectCommits {
            project: project.path_with_namespace.clone(),
            commits: commit_details(remote, project, &branch)?,
        });
        Ok(())
    })?;
    println!("{}", to_json(&result)?);
    Ok(())
}
