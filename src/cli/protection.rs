//! GB-017: Branch and tag protection, tagging and project settings commands.

use super::{for_each_project, project_param};
use crate::core::error::{Error, RemoteError};
use crate::core::params::Param;
use crate::core::reconcile::reconcile;
use crate::core::registry::{Args, Registry};
use crate::core::template::{expand, expand_with, Extras};
use crate::core::types::AccessLevel;
use crate::resources::branch::{BranchAccess, ProtectedBranchResource};
use crate::resources::settings::{ProjectSettings, ProjectSettingsResource};
use crate::resources::tag::{ProtectedTagResource, TagAccess};

const SQUASH_OPTIONS: [&str; 4] = ["never", "always", "default_on", "default_off"];

fn branch_name() -> Param {
    Param::string("branch")
        .required()
        .metavar("GIT_BRANCH")
        .help("Git branch name to set protection on.")
}

fn tag_pattern() -> Param {
    Param::string("tag")
        .required()
        .metavar("GIT_TAG_PATTERN")
        .help("Git tag name (or wildcard) to set protection on.")
}

pub(super) fn register(registry: &mut Registry) {
    registry
        .register(
            "protect",
            "Set branch protection on multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                branch_name(),
                Param::access("merge-access-level")
                    .default_level(AccessLevel::Maintainer)
                    .help("Access level required to merge to this branch (default MAINTAINER).")
                    .compat(
                        "developers-can-merge",
                        "DEPRECATED: allow developers to merge to this branch.",
                        AccessLevel::Developer,
                    ),
                Param::access("push-access-level")
                    .default_level(AccessLevel::Maintainer)
                    .help("Access level required to push to this branch (default MAINTAINER).")
                    .compat(
                        "developers-can-push",
                        "DEPRECATED: allow developers to push to this branch.",
                        AccessLevel::Developer,
                    ),
                Param::dry_run(),
            ],
            cmd_protect,
        )
        .register(
            "unprotect",
            "Remove branch protection on multiple projects.",
            vec![Param::remote(), Param::entries(), project_param(), branch_name(), Param::dry_run()],
            cmd_unprotect,
        )
        .register(
            "protect-tag",
            "Set tag protection on multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                tag_pattern(),
                Param::access("create-access-level")
                    .default_level(AccessLevel::NoAccess)
                    .help("Access level required to create this tag (default NO_ACCESS).")
                    .compat(
                        "developers-can-create",
                        "DEPRECATED: allow developers to create this tag.",
                        AccessLevel::Developer,
                    )
                    .compat(
                        "maintainers-can-create",
                        "DEPRECATED: allow maintainers to create this tag.",
                        AccessLevel::Maintainer,
                    ),
                Param::dry_run(),
            ],
            cmd_protect_tag,
        )
        .register(
            "unprotect-tag",
            "Remove tag protection on multiple projects.",
            vec![Param::remote(), Param::entries(), project_param(), tag_pattern(), Param::dry_run()],
            cmd_unprotect_tag,
        )
        .register(
            "create-tag",
            "Create a tag in multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::string("tag").required().metavar("TAG_NAME").help("Tag name."),
                Param::string("ref")
                    .required()
                    .metavar("REF_WITH_FORMAT")
                    .help("Commit, branch or tag to tag, formatted from CSV columns."),
                Param::string("message")
                    .metavar("MESSAGE_WITH_FORMAT")
                    .help("Tag message (annotated tag); may use {GL[tag]}."),
            ],
            cmd_create_tag,
        )
        .register(
            "project-settings",
            "Change settings of multiple projects.",
            vec![
                Param::remote(),
                Param::entries(),
                project_param(),
                Param::string("mr-default-target")
                    .metavar("self|upstream")
                    .help("Default target project of merge requests in forks."),
                Param::string("description")
                    .metavar("DESCRIPTION_WITH_FORMAT")
                    .help("Project description, formatted from CSV columns."),
                Param::string("squash-option")
                    .metavar("never|always|default_on|default_off")
                    .help("Squash commits when merging."),
                Param::dry_run(),
            ],
            cmd_project_settings,
        );
}

fn converge_branch(args: &Args<'_>, desired: Option<BranchAccess>) -> Result<(), Error> {
    let remote = args.remote()?;
    let resource = ProtectedBranchResource::new(args.string("branch")?);
    let dry_run = args.flag("dry-run")?;
    for_each_project(args, |_, project| {
        reconcile(remote, project, &resource, desired.as_ref(), dry_run)?;
        Ok(())
    })
}

fn cmd_protect(args: &Args<'_>) -> Result<(), Error> {
    let desired = BranchAccess {
        merge: args.access_level("merge-access-level")?,
        push: args.access_level("push-access-level")?,
    };
    converge_branch(args, Some(desired))
}

fn cmd_unprotect(args: &Args<'_>) -> Result<(), Error> {
    converge_branch(args, None)
}

fn converge_tag(args: &Args<'_>, desired: Option<TagAccess>) -> Result<(), Error> {
    let remote = args.remote()?;
    let resource = ProtectedTagResource::new(args.string("tag")?);
    let dry_run = args.flag("dry-run")?;
    for_each_project(args, |_, project| {
        reconcile(remote, project, &resource, desired.as_ref(), dry_run)?;
        Ok(())
    })
}

fn cmd_protect_tag(args: &Args<'_>) -> Result<(), Error> {
    converge_tag(
        args,
        Some(TagAccess {
            create: args.access_level("create-access-level")?,
        }),
    )
}

fn cmd_unprotect_tag(args: &Args<'_>) -> Result<(), Error> {
    converge_tag(args, None)
}

fn cmd_create_tag(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let tag = args.string("tag")?;
    let ref_template = args.string("ref")?;
    let message_template = args.opt_string("message")?;
    let extras = Extras::new().with("GL", "tag", tag);

    for_each_project(args, |entry, project| {
        let git_ref = expand(ref_template, entry)?;
        let message = message_template
            .map(|t| expand_with(t, entry, &extras))
            .transpose()?;
        tracing::info!("Tagging {} in {} as {}", git_ref, project.path_with_namespace, tag);
        match remote.create_tag(project.id, tag, &git_ref, message.as_deref()) {
            Err(RemoteError::BadRequest(m)) if m.ends_with("already exists") => {
                tracing::debug!("Tag {} already exists in {}", tag, project.path_with_namespace);
                Ok(())
            }
            other => Ok(other?),
        }
    })
}

fn parse_mr_target(value: &str) -> Result<bool, Error> {
    match value {
        "self" => Ok(true),
        "upstream" => Ok(false),
        other => Err(Error::InvalidOption(format!(
            "--mr-default-target must be 'self' or 'upstream', not '{}'",
            other
        ))),
    }
}

fn parse_squash_option(value: &str) -> Result<String, Error> {
    if SQUASH_OPTIONS.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(Error::InvalidOption(format!(
            "--squash-option must be one of {}, not '{}'",
            SQUASH_OPTIONS.join(", "),
            value
        )))
    }
}

fn cmd_project_settings(args: &Args<'_>) -> Result<(), Error> {
    let remote = args.remote()?;
    let mr_default_target_self = args.opt_string("mr-default-target")?.map(parse_mr_target).transpose()?;
    let squash_option = args.opt_string("squash-option")?.map(parse_squash_option).transpose()?;
    let description_template = args.opt_string("description")?;
    let dry_run = args.flag("dry-run")?;
    if mr_default_target_self.is_none() && squash_option.is_none() && description_template.is_none() {
        return Err(Error::InvalidOption(
            "nothing to change (use --mr-default-target, --description or --squash-option)".to_string(),
        ));
    }

    for_each_project(args, |entry, project| {
        let desired = ProjectSettings {
            mr_default_target_self,
            description: description_template.map(|t| expand(t, entry)).transpose()?,
            squash_option: squash_option.clone(),
        };
        let resource = ProjectSettingsResource { desired: &desired };
        reconcile(remote, project, &resource, Some(&desired), dry_run)?;
        Ok(())
    })
}
