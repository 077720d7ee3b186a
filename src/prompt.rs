//! Interactive port implementations backed by `inquire`
//!
//! Both ports are optional: the engine runs without them, failing with a
//! reported conflict (solver) or degrading to skip (conflict resolver)
//! instead of prompting.

use semver::Version;

use crate::conflict::ConflictDecision;
use crate::error::Result;
use crate::options::ConflictStrategy;
use crate::solver::VersionChoice;

/// `inquire`-backed version picker for conflicting ranges
#[derive(Debug, Default)]
pub struct InquireVersionChoice;

impl VersionChoice for InquireVersionChoice {
    fn choose(
        &self,
        package: &str,
        candidates: &[Version],
        reason: &str,
    ) -> Result<Option<Version>> {
        let mut options: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        options.reverse(); // highest first

        let prompt = format!("Select a version for '{package}'");
        match inquire::Select::new(&prompt, options)
            .with_help_message(reason)
            .prompt()
        {
            Ok(choice) => Ok(Version::parse(&choice).ok()),
            Err(inquire::InquireError::OperationCanceled)
            | Err(inquire::InquireError::OperationInterrupted) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// `inquire`-backed decision for conflicting install targets
#[derive(Debug, Default)]
pub struct InquireConflictDecision;

impl ConflictDecision for InquireConflictDecision {
    fn decide(&self, package: &str, conflicts: &[String]) -> Result<ConflictStrategy> {
        let prompt = format!(
            "'{package}' conflicts with existing files ({} path{})",
            conflicts.len(),
            if conflicts.len() == 1 { "" } else { "s" }
        );
        let options = vec!["namespace", "skip", "overwrite"];

        match inquire::Select::new(&prompt, options)
            .with_help_message(&conflicts.join(", "))
            .prompt()
        {
            Ok("namespace") => Ok(ConflictStrategy::Namespace),
            Ok("overwrite") => Ok(ConflictStrategy::Overwrite),
            Ok(_) => Ok(ConflictStrategy::Skip),
            Err(inquire::InquireError::OperationCanceled)
            | Err(inquire::InquireError::OperationInterrupted) => Ok(ConflictStrategy::Skip),
            Err(err) => Err(err.into()),
        }
    }
}
