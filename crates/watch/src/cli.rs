//! Command-line and environment input.

use quill_core::error::CoreError;
use quill_core::job::Phase;
use quill_core::request::GenerateRequest;
use quill_core::types::JobId;

/// Default page size of `quill-watch jobs`.
pub const DEFAULT_LIST_LIMIT: u32 = 20;

const USAGE: &str = "usage: quill-watch [generate | jobs [STATUS] | delete JOB_ID]";

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a job from the `QUILL_*` request variables and follow it.
    Generate,
    /// List recent jobs, optionally only those in one phase.
    ListJobs { limit: u32, phase: Option<Phase> },
    /// Remove a job from the backend.
    DeleteJob(JobId),
}

/// Parse the arguments that follow the program name.
pub fn parse_command<I>(args: I) -> Result<Command, CoreError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let command = match args.next().as_deref() {
        None | Some("generate") => Command::Generate,
        Some("jobs") => Command::ListJobs {
            limit: DEFAULT_LIST_LIMIT,
            phase: args.next().map(|s| s.parse()).transpose()?,
        },
        Some("delete") => match args.next() {
            Some(job_id) => Command::DeleteJob(JobId::new(job_id)),
            None => return Err(CoreError::Validation(USAGE.to_string())),
        },
        Some(_) => return Err(CoreError::Validation(USAGE.to_string())),
    };

    if args.next().is_some() {
        return Err(CoreError::Validation(USAGE.to_string()));
    }
    Ok(command)
}

/// Build the generation request from the process environment.
///
/// | Env Var            | Required | Default        |
/// |--------------------|----------|----------------|
/// | `QUILL_TOPIC`      | yes      | --             |
/// | `QUILL_LENGTH`     | no       | `medium`       |
/// | `QUILL_STYLE`      | no       | `informative`  |
/// | `QUILL_TONE`       | no       | `professional` |
/// | `QUILL_CATEGORIES` | no       | none           |
/// | `QUILL_TAGS`       | no       | none           |
///
/// Categories and tags are comma-separated.
pub fn request_from_env() -> Result<GenerateRequest, CoreError> {
    request_from(|name| std::env::var(name).ok())
}

/// Same as [`request_from_env`], reading variables through `lookup`.
pub fn request_from(lookup: impl Fn(&str) -> Option<String>) -> Result<GenerateRequest, CoreError> {
    let topic = lookup("QUILL_TOPIC")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoreError::Validation("QUILL_TOPIC is required".to_string()))?;

    let mut request = GenerateRequest::new(topic);
    if let Some(length) = lookup("QUILL_LENGTH") {
        request = request.with_length(length.trim().to_lowercase().parse()?);
    }
    if let Some(style) = lookup("QUILL_STYLE") {
        request = request.with_style(style.trim());
    }
    if let Some(tone) = lookup("QUILL_TONE") {
        request = request.with_tone(tone.trim());
    }
    if let Some(categories) = lookup("QUILL_CATEGORIES") {
        request = request.with_categories(split_list(&categories));
    }
    if let Some(tags) = lookup("QUILL_TAGS") {
        request = request.with_tags(split_list(&tags));
    }

    request.check()?;
    Ok(request)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
