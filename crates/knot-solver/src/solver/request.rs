use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use knot_semver::{VersionConstraint, VersionParser};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// What a job asks the solver to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobCommand {
    Install,
    Uninstall,
    Update,
    UpdateAll,
}

impl JobCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobCommand::Install => "install",
            JobCommand::Uninstall => "uninstall",
            JobCommand::Update => "update",
            JobCommand::UpdateAll => "update-all",
        }
    }
}

impl FromStr for JobCommand {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "install" => Ok(JobCommand::Install),
            "uninstall" | "remove" => Ok(JobCommand::Uninstall),
            "update" => Ok(JobCommand::Update),
            "update-all" => Ok(JobCommand::UpdateAll),
            other => Err(SolverError::InvalidPackage {
                name: other.to_string(),
                reason: "unknown job command".to_string(),
            }),
        }
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single user request
#[derive(Debug, Clone)]
pub struct Job {
    pub command: JobCommand,
    /// Lowercase package name; empty for `UpdateAll`
    pub package_name: String,
    pub constraint: Option<Arc<dyn VersionConstraint>>,
    /// Keep the installed version if one matches
    pub fixed: bool,
}

impl Job {
    pub fn new(
        command: JobCommand,
        package_name: &str,
        constraint: Option<Box<dyn VersionConstraint>>,
    ) -> Self {
        Self {
            command,
            package_name: package_name.to_lowercase(),
            constraint: constraint.map(Arc::from),
            fixed: false,
        }
    }

    /// Builds a job from a raw constraint string (`None` means any version).
    pub fn parse(command: JobCommand, package_name: &str, constraint: Option<&str>) -> Result<Self> {
        let constraint = constraint
            .map(|c| VersionParser::new().parse_constraints(c))
            .transpose()?;
        Ok(Self::new(command, package_name, constraint))
    }

    pub fn constraint(&self) -> Option<&dyn VersionConstraint> {
        self.constraint.as_deref()
    }

    /// Name plus constraint, e.g. `acme/log ^1.0`
    pub fn target_string(&self) -> String {
        match &self.constraint {
            Some(constraint) => format!("{} {}", self.package_name, constraint.pretty_string()),
            None => self.package_name.clone(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.command == JobCommand::UpdateAll {
            return f.write_str("update-all");
        }
        write!(f, "{} {}", self.command, self.target_string())?;
        if self.fixed {
            f.write_str(" (fixed)")?;
        }
        Ok(())
    }
}

/// Ordered list of jobs
#[derive(Debug, Clone, Default)]
pub struct Request {
    jobs: Vec<Job>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &mut self,
        package_name: &str,
        constraint: Option<Box<dyn VersionConstraint>>,
    ) -> &mut Self {
        self.add_job(Job::new(JobCommand::Install, package_name, constraint))
    }

    /// Install that keeps the currently installed version when it matches
    pub fn install_fixed(
        &mut self,
        package_name: &str,
        constraint: Option<Box<dyn VersionConstraint>>,
    ) -> &mut Self {
        let mut job = Job::new(JobCommand::Install, package_name, constraint);
        job.fixed = true;
        self.add_job(job)
    }

    pub fn uninstall(
        &mut self,
        package_name: &str,
        constraint: Option<Box<dyn VersionConstraint>>,
    ) -> &mut Self {
        self.add_job(Job::new(JobCommand::Uninstall, package_name, constraint))
    }

    pub fn update(
        &mut self,
        package_name: &str,
        constraint: Option<Box<dyn VersionConstraint>>,
    ) -> &mut Self {
        self.add_job(Job::new(JobCommand::Update, package_name, constraint))
    }

    pub fn update_all(&mut self) -> &mut Self {
        self.add_job(Job::new(JobCommand::UpdateAll, "", None))
    }

    pub fn add_job(&mut self, job: Job) -> &mut Self {
        self.jobs.push(job);
        self
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let mut request = Request::new();
        request
            .install("Acme/Log", None)
            .uninstall("acme/old", None)
            .update_all();

        let jobs = request.jobs();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].package_name, "acme/log");
        assert_eq!(jobs[1].command, JobCommand::Uninstall);
        assert_eq!(jobs[2].to_string(), "update-all");
    }

    #[test]
    fn test_job_parse() {
        let job = Job::parse(JobCommand::Install, "acme/log", Some("^1.0")).unwrap();
        assert_eq!(job.target_string(), "acme/log ^1.0");
        assert_eq!(job.to_string(), "install acme/log ^1.0");

        let any = Job::parse(JobCommand::Update, "acme/log", None).unwrap();
        assert!(any.constraint().is_none());
        assert!(Job::parse(JobCommand::Install, "acme/log", Some("~>1.0")).is_err());
    }

    #[test]
    fn test_fixed_job() {
        let mut request = Request::new();
        request.install_fixed("acme/log", None);
        assert!(request.jobs()[0].fixed);
        assert_eq!(request.jobs()[0].to_string(), "install acme/log (fixed)");
    }

    #[test]
    fn test_command_from_str() {
        assert_eq!("remove".parse::<JobCommand>().unwrap(), JobCommand::Uninstall);
        assert_eq!("update-all".parse::<JobCommand>().unwrap(), JobCommand::UpdateAll);
        assert!("frobnicate".parse::<JobCommand>().is_err());
        let json = serde_json::to_string(&JobCommand::UpdateAll).unwrap();
        assert_eq!(json, "\"update-all\"");
    }
}
